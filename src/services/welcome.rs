use crate::db::{Database, Scope};
use serde::{Deserialize, Serialize};

pub const COG: &str = "welcome";
pub const DEFAULT_TEMPLATE: &str = "Welcome to **{server}**, {mention}! You are member #{count}.";
pub const MAX_TEMPLATE_CHARS: usize = 1500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WelcomeSettings {
    pub enabled: bool,
    pub channel_id: Option<u64>,
    pub template: String,
    pub dm: bool,
}

impl Default for WelcomeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            channel_id: None,
            template: DEFAULT_TEMPLATE.to_string(),
            dm: false,
        }
    }
}

/// Values substituted into a welcome template.
pub struct WelcomeVars<'a> {
    pub user_name: &'a str,
    pub user_id: u64,
    pub server: &'a str,
    pub member_count: Option<u64>,
}

/// Fills `{user}`, `{mention}`, `{server}` and `{count}`. Unknown
/// placeholders are left as written.
pub fn render(template: &str, vars: &WelcomeVars<'_>) -> String {
    let count = vars
        .member_count
        .map(|c| c.to_string())
        .unwrap_or_else(|| "?".to_string());
    template
        .replace("{user}", vars.user_name)
        .replace("{mention}", &format!("<@{}>", vars.user_id))
        .replace("{server}", vars.server)
        .replace("{count}", &count)
}

pub struct WelcomeService {
    db: Database,
}

impl WelcomeService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn settings(&self, guild_id: u64) -> anyhow::Result<WelcomeSettings> {
        self.db
            .run_blocking(move |db| db.load(COG, Scope::Guild(guild_id)))
            .await
    }

    pub async fn update<F, R>(&self, guild_id: u64, f: F) -> anyhow::Result<R>
    where
        F: FnOnce(&mut WelcomeSettings) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.db
            .run_blocking(move |db| db.update(COG, Scope::Guild(guild_id), f))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_all_placeholders() {
        let vars = WelcomeVars {
            user_name: "luffy",
            user_id: 42,
            server: "Grand Line",
            member_count: Some(100),
        };
        assert_eq!(
            render(DEFAULT_TEMPLATE, &vars),
            "Welcome to **Grand Line**, <@42>! You are member #100."
        );
        assert_eq!(render("{user} {unknown}", &vars), "luffy {unknown}");
    }

    #[test]
    fn test_render_unknown_count() {
        let vars = WelcomeVars {
            user_name: "zoro",
            user_id: 1,
            server: "East Blue",
            member_count: None,
        };
        assert_eq!(render("#{count}", &vars), "#?");
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let settings: WelcomeSettings = serde_json::from_str(r#"{"enabled": true}"#).unwrap();
        assert!(settings.enabled);
        assert_eq!(settings.template, DEFAULT_TEMPLATE);
    }
}
