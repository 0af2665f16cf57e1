use crate::db::{Database, Scope};
use crate::llm::LlmClient;
use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

pub const COG: &str = "trivia";
pub const DEFAULT_CATEGORY: &str = "general";

const BUILTIN_QUESTIONS: &str = r#"
[[questions]]
category = "general"
question = "What is the largest planet in our solar system?"
answers = ["Jupiter"]

[[questions]]
category = "general"
question = "How many continents are there?"
answers = ["7", "seven"]

[[questions]]
category = "general"
question = "What is the chemical symbol for gold?"
answers = ["Au"]

[[questions]]
category = "anime"
question = "What is the name of Monkey D. Luffy's pirate crew?"
answers = ["Straw Hat Pirates", "Straw Hats", "Straw Hat"]

[[questions]]
category = "anime"
question = "Which studio animated Spirited Away?"
answers = ["Studio Ghibli", "Ghibli"]

[[questions]]
category = "anime"
question = "In Naruto, what is the name of the nine-tailed fox?"
answers = ["Kurama", "Kyuubi"]
"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(default = "default_category")]
    pub category: String,
    pub question: String,
    pub answers: Vec<String>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl Question {
    pub fn is_correct(&self, guess: &str) -> bool {
        let guess = normalize_answer(guess);
        !guess.is_empty() && self.answers.iter().any(|a| normalize_answer(a) == guess)
    }
}

#[derive(Debug, Deserialize)]
struct QuestionFile {
    #[serde(default)]
    questions: Vec<Question>,
}

/// Questions grouped by lower-cased category name.
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    categories: BTreeMap<String, Vec<Question>>,
}

impl QuestionBank {
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let file: QuestionFile = toml::from_str(content)?;
        let mut bank = Self::default();
        for q in file.questions {
            if q.answers.is_empty() || q.question.trim().is_empty() {
                continue;
            }
            bank.categories
                .entry(q.category.trim().to_lowercase())
                .or_default()
                .push(q);
        }
        Ok(bank)
    }

    pub fn builtin() -> Self {
        Self::from_toml(BUILTIN_QUESTIONS).unwrap_or_default()
    }

    /// Loads `path`, falling back to the built-in pack when it is missing.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        if !Path::new(path).exists() {
            warn!("Trivia: {} not found, using built-in questions", path);
            return Ok(Self::builtin());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read trivia questions from {}", path))?;
        let bank = Self::from_toml(&content)
            .with_context(|| format!("Invalid trivia question file {}", path))?;
        info!(
            "Trivia: loaded {} questions in {} categories",
            bank.len(),
            bank.categories.len()
        );
        Ok(bank)
    }

    pub fn categories(&self) -> Vec<(&str, usize)> {
        self.categories
            .iter()
            .map(|(name, qs)| (name.as_str(), qs.len()))
            .collect()
    }

    pub fn questions(&self, category: &str) -> Option<&[Question]> {
        self.categories
            .get(&category.trim().to_lowercase())
            .map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lower-cases, drops punctuation, collapses whitespace and strips a
/// leading article.
pub fn normalize_answer(input: &str) -> String {
    let cleaned: String = input
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    let words = match words.first() {
        Some(&("the" | "a" | "an")) if words.len() > 1 => &words[1..],
        _ => &words[..],
    };
    words.join(" ")
}

/// Pulls a JSON array of questions out of an LLM reply, tolerating code fences.
pub fn parse_generated(raw: &str, category: &str) -> Vec<Question> {
    #[derive(Deserialize)]
    struct Generated {
        question: String,
        answers: Vec<String>,
    }

    let start = raw.find('[');
    let end = raw.rfind(']');
    let (Some(start), Some(end)) = (start, end) else {
        return Vec::new();
    };
    if end < start {
        return Vec::new();
    }

    match serde_json::from_str::<Vec<Generated>>(&raw[start..=end]) {
        Ok(items) => items
            .into_iter()
            .filter(|g| !g.question.trim().is_empty() && !g.answers.is_empty())
            .map(|g| Question {
                category: category.to_string(),
                question: g.question,
                answers: g.answers,
            })
            .collect(),
        Err(e) => {
            warn!("Trivia: could not parse generated questions: {}", e);
            Vec::new()
        }
    }
}

pub async fn generate_questions(
    llm: &LlmClient,
    topic: &str,
    count: usize,
) -> anyhow::Result<Vec<Question>> {
    let system = "You write short trivia questions. Reply with JSON only.";
    let prompt = format!(
        "Write {count} trivia questions about {topic}. Respond with a JSON array of objects \
         with fields \"question\" (string) and \"answers\" (array of accepted short answers, \
         most common form first). Keep answers to a few words."
    );
    let raw = llm.completion(system, &prompt).await?;
    Ok(parse_generated(&raw, topic))
}

/// Channels with a running game, each with its stop flag.
#[derive(Default)]
pub struct TriviaSessions {
    active: Mutex<HashMap<u64, Arc<AtomicBool>>>,
}

impl TriviaSessions {
    /// Registers a session; `None` if the channel already has one.
    pub fn start(&self, channel_id: u64) -> Option<Arc<AtomicBool>> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active.contains_key(&channel_id) {
            return None;
        }
        let flag = Arc::new(AtomicBool::new(false));
        active.insert(channel_id, Arc::clone(&flag));
        Some(flag)
    }

    pub fn stop(&self, channel_id: u64) -> bool {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        match active.get(&channel_id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn finish(&self, channel_id: u64) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&channel_id);
    }

    pub fn is_running(&self, channel_id: u64) -> bool {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.contains_key(&channel_id)
    }
}

/// Per-game scores, keyed by user id.
#[derive(Debug, Default)]
pub struct Scoreboard {
    scores: HashMap<u64, u32>,
}

impl Scoreboard {
    pub fn award(&mut self, user_id: u64) -> u32 {
        let score = self.scores.entry(user_id).or_insert(0);
        *score += 1;
        *score
    }

    /// Highest score first; ties broken by user id for stable output.
    pub fn ranking(&self) -> Vec<(u64, u32)> {
        let mut ranking: Vec<(u64, u32)> = self.scores.iter().map(|(u, s)| (*u, *s)).collect();
        ranking.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranking
    }

    pub fn winners(&self) -> Vec<u64> {
        let ranking = self.ranking();
        let Some(&(_, best)) = ranking.first() else {
            return Vec::new();
        };
        ranking
            .into_iter()
            .take_while(|(_, s)| *s == best)
            .map(|(u, _)| u)
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriviaStats {
    pub points: u64,
    pub wins: u32,
    pub games: u32,
}

pub struct TriviaService {
    db: Database,
}

impl TriviaService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Folds a finished game into every participant's lifetime stats.
    pub async fn record_game(&self, guild_id: u64, scoreboard: &Scoreboard) -> anyhow::Result<()> {
        let ranking = scoreboard.ranking();
        let winners = scoreboard.winners();
        self.db
            .run_blocking(move |db| {
                for (user_id, score) in ranking {
                    let won = winners.contains(&user_id);
                    db.update(COG, Scope::Member(guild_id, user_id), |stats: &mut TriviaStats| {
                        stats.points += score as u64;
                        stats.games += 1;
                        if won {
                            stats.wins += 1;
                        }
                    })?;
                }
                Ok(())
            })
            .await
    }

    pub async fn leaderboard(&self, guild_id: u64, limit: usize) -> anyhow::Result<Vec<(u64, TriviaStats)>> {
        let mut rows: Vec<(u64, TriviaStats)> = self
            .db
            .run_blocking(move |db| db.list_member_documents(COG, guild_id))
            .await?;
        rows.sort_by(|a, b| b.1.points.cmp(&a.1.points).then(b.1.wins.cmp(&a.1.wins)));
        rows.truncate(limit);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_answer() {
        assert_eq!(normalize_answer("  The Straw-Hat   Pirates! "), "straw hat pirates");
        assert_eq!(normalize_answer("An"), "an");
        assert_eq!(normalize_answer("A cat"), "cat");
        assert_eq!(normalize_answer("?!"), "");
    }

    #[test]
    fn test_is_correct() {
        let q = Question {
            category: "anime".into(),
            question: "Crew?".into(),
            answers: vec!["Straw Hat Pirates".into(), "Straw Hats".into()],
        };
        assert!(q.is_correct("the straw hat pirates"));
        assert!(q.is_correct("STRAW HATS."));
        assert!(!q.is_correct("red hair pirates"));
        assert!(!q.is_correct("..."));
    }

    #[test]
    fn test_builtin_bank_and_categories() {
        let bank = QuestionBank::builtin();
        assert_eq!(bank.len(), 6);
        let categories = bank.categories();
        assert_eq!(categories, vec![("anime", 3), ("general", 3)]);
        assert!(bank.questions("ANIME").is_some());
        assert!(bank.questions("sports").is_none());
    }

    #[test]
    fn test_from_toml_skips_incomplete_questions() {
        let bank = QuestionBank::from_toml(
            r#"
            [[questions]]
            question = "No category given"
            answers = ["ok"]

            [[questions]]
            category = "x"
            question = "No answers"
            answers = []
            "#,
        )
        .unwrap();
        assert_eq!(bank.len(), 1);
        assert!(bank.questions(DEFAULT_CATEGORY).is_some());
    }

    #[test]
    fn test_parse_generated() {
        let raw = "Here you go:\n```json\n[{\"question\": \"2+2?\", \"answers\": [\"4\", \"four\"]}, {\"question\": \"\", \"answers\": [\"x\"]}]\n```";
        let qs = parse_generated(raw, "math");
        assert_eq!(qs.len(), 1);
        assert_eq!(qs[0].category, "math");
        assert!(qs[0].is_correct("Four"));
        assert!(parse_generated("no json here", "math").is_empty());
    }

    #[test]
    fn test_sessions_one_per_channel() {
        let sessions = TriviaSessions::default();
        let flag = sessions.start(1).unwrap();
        assert!(sessions.start(1).is_none());
        assert!(sessions.is_running(1));
        assert!(sessions.stop(1));
        assert!(flag.load(Ordering::SeqCst));
        sessions.finish(1);
        assert!(!sessions.stop(1));
        assert!(sessions.start(1).is_some());
    }

    #[test]
    fn test_scoreboard_ranking_and_winners() {
        let mut board = Scoreboard::default();
        board.award(5);
        board.award(3);
        board.award(3);
        board.award(5);
        board.award(9);
        assert_eq!(board.ranking(), vec![(3, 2), (5, 2), (9, 1)]);
        assert_eq!(board.winners(), vec![3, 5]);
        assert!(Scoreboard::default().winners().is_empty());
    }

    #[tokio::test]
    async fn test_record_game_and_leaderboard() {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        let service = TriviaService::new(db);

        let mut game = Scoreboard::default();
        game.award(1);
        game.award(1);
        game.award(2);
        service.record_game(10, &game).await.unwrap();

        let mut game = Scoreboard::default();
        game.award(2);
        service.record_game(10, &game).await.unwrap();

        let board = service.leaderboard(10, 10).await.unwrap();
        assert_eq!(board.len(), 2);
        // Each player won one game and scored two points overall.
        assert!(board.iter().all(|(_, s)| s.points == 2 && s.wins == 1));
        let user2 = board.iter().find(|(u, _)| *u == 2).unwrap();
        assert_eq!(user2.1.games, 2);
    }
}
