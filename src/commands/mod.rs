pub mod anime;
pub mod bounty;
pub mod manga;
pub mod moderation;
pub mod owner;
pub mod qotd;
pub mod suggestions;
pub mod trivia;
pub mod welcome;

use crate::{Data, Error};

pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        moderation::warn(),
        moderation::warnings(),
        moderation::modset(),
        welcome::welcome(),
        suggestions::suggest(),
        suggestions::suggestion(),
        trivia::trivia(),
        qotd::qotd(),
        anime::anime(),
        anime::manga(),
        manga::track(),
        bounty::bounty(),
        owner::cachestats(),
        owner::shutdown(),
    ]
}

/// Shortens `text` to at most `max` characters, ending in an ellipsis.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", kept.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exactly", 7), "exactly");
        assert_eq!(truncate("hello world", 7), "hello…");
        assert_eq!(truncate("ダンジョン飯です", 4), "ダンジ…");
    }

    #[test]
    fn test_command_names_are_unique() {
        let commands = all();
        let mut names: Vec<_> = commands.iter().map(|c| c.name.clone()).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
