use crate::db::{Database, Scope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const COG: &str = "suggestions";
pub const UPVOTE: &str = "👍";
pub const DOWNVOTE: &str = "👎";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuggestionStatus {
    Pending,
    Approved,
    Denied,
}

impl SuggestionStatus {
    pub fn label(self) -> &'static str {
        match self {
            SuggestionStatus::Pending => "Pending",
            SuggestionStatus::Approved => "Approved",
            SuggestionStatus::Denied => "Denied",
        }
    }

    pub fn color(self) -> u32 {
        match self {
            SuggestionStatus::Pending => 0x5865F2,
            SuggestionStatus::Approved => 0x57F287,
            SuggestionStatus::Denied => 0xED4245,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: u32,
    pub author_id: u64,
    pub content: String,
    pub channel_id: u64,
    pub message_id: Option<u64>,
    pub status: SuggestionStatus,
    pub reason: Option<String>,
    pub decided_by: Option<u64>,
    pub votes_up: u64,
    pub votes_down: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecisionError {
    #[error("suggestion #{0} does not exist")]
    NotFound(u32),
    #[error("suggestion #{0} was already {1}")]
    AlreadyDecided(u32, &'static str),
    #[error("a suggestion can only be approved or denied")]
    InvalidStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionBoard {
    pub channel_id: Option<u64>,
    pub next_id: u32,
    pub suggestions: BTreeMap<u32, Suggestion>,
}

impl SuggestionBoard {
    pub fn submit(
        &mut self,
        author_id: u64,
        content: &str,
        channel_id: u64,
        now: DateTime<Utc>,
    ) -> Suggestion {
        self.next_id += 1;
        let suggestion = Suggestion {
            id: self.next_id,
            author_id,
            content: content.to_string(),
            channel_id,
            message_id: None,
            status: SuggestionStatus::Pending,
            reason: None,
            decided_by: None,
            votes_up: 0,
            votes_down: 0,
            created_at: now,
        };
        self.suggestions.insert(suggestion.id, suggestion.clone());
        suggestion
    }

    pub fn attach_message(&mut self, id: u32, message_id: u64) -> bool {
        match self.suggestions.get_mut(&id) {
            Some(s) => {
                s.message_id = Some(message_id);
                true
            }
            None => false,
        }
    }

    /// Moves a pending suggestion to Approved or Denied with a final tally.
    pub fn decide(
        &mut self,
        id: u32,
        status: SuggestionStatus,
        reason: Option<String>,
        moderator_id: u64,
        votes: (u64, u64),
    ) -> Result<Suggestion, DecisionError> {
        if status == SuggestionStatus::Pending {
            return Err(DecisionError::InvalidStatus);
        }
        let suggestion = self
            .suggestions
            .get_mut(&id)
            .ok_or(DecisionError::NotFound(id))?;
        if suggestion.status != SuggestionStatus::Pending {
            return Err(DecisionError::AlreadyDecided(
                id,
                suggestion.status.label(),
            ));
        }
        suggestion.status = status;
        suggestion.reason = reason;
        suggestion.decided_by = Some(moderator_id);
        suggestion.votes_up = votes.0;
        suggestion.votes_down = votes.1;
        Ok(suggestion.clone())
    }

    pub fn find_by_message(&self, message_id: u64) -> Option<&Suggestion> {
        self.suggestions
            .values()
            .find(|s| s.message_id == Some(message_id))
    }

    /// True when `user_id` reacted to their own pending suggestion.
    pub fn is_self_vote(&self, message_id: u64, user_id: u64) -> bool {
        self.find_by_message(message_id)
            .map(|s| s.status == SuggestionStatus::Pending && s.author_id == user_id)
            .unwrap_or(false)
    }

    pub fn pending(&self) -> impl Iterator<Item = &Suggestion> {
        self.suggestions
            .values()
            .filter(|s| s.status == SuggestionStatus::Pending)
    }
}

pub fn is_vote_emoji(emoji: &str) -> bool {
    emoji == UPVOTE || emoji == DOWNVOTE
}

/// Reaction count with the bot's own seed reaction removed.
pub fn vote_count(count: u64, includes_bot: bool) -> u64 {
    if includes_bot {
        count.saturating_sub(1)
    } else {
        count
    }
}

pub struct SuggestionService {
    db: Database,
}

impl SuggestionService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn board(&self, guild_id: u64) -> anyhow::Result<SuggestionBoard> {
        self.db
            .run_blocking(move |db| db.load(COG, Scope::Guild(guild_id)))
            .await
    }

    pub async fn update<F, R>(&self, guild_id: u64, f: F) -> anyhow::Result<R>
    where
        F: FnOnce(&mut SuggestionBoard) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.db
            .run_blocking(move |db| db.update(COG, Scope::Guild(guild_id), f))
            .await
    }

    /// Links a posted suggestion to its message so votes on it are tracked.
    pub async fn attach_message(
        &self,
        guild_id: u64,
        id: u32,
        message_id: u64,
    ) -> anyhow::Result<bool> {
        self.update(guild_id, move |b| b.attach_message(id, message_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_votes_only_on_pending() {
        let mut board = SuggestionBoard::default();
        board.submit(7, "More emotes", 100, Utc::now());
        board.attach_message(1, 555);
        assert!(board.is_self_vote(555, 7));
        assert!(!board.is_self_vote(555, 8));
        assert!(!board.is_self_vote(556, 7));

        board
            .decide(1, SuggestionStatus::Denied, None, 9, (0, 0))
            .unwrap();
        assert!(!board.is_self_vote(555, 7));
        assert!(is_vote_emoji("👍"));
        assert!(!is_vote_emoji("🔥"));
    }

    #[test]
    fn test_submit_and_decide() {
        let mut board = SuggestionBoard::default();
        let s = board.submit(7, "Add a music channel", 100, Utc::now());
        assert_eq!(s.id, 1);
        assert!(board.attach_message(1, 555));
        assert_eq!(board.find_by_message(555).unwrap().author_id, 7);

        let decided = board
            .decide(1, SuggestionStatus::Approved, Some("Good idea".into()), 9, (5, 1))
            .unwrap();
        assert_eq!(decided.status, SuggestionStatus::Approved);
        assert_eq!(decided.votes_up, 5);
        assert_eq!(board.pending().count(), 0);
    }

    #[test]
    fn test_decide_errors() {
        let mut board = SuggestionBoard::default();
        board.submit(7, "x", 100, Utc::now());
        assert_eq!(
            board.decide(2, SuggestionStatus::Denied, None, 9, (0, 0)),
            Err(DecisionError::NotFound(2))
        );
        assert_eq!(
            board.decide(1, SuggestionStatus::Pending, None, 9, (0, 0)),
            Err(DecisionError::InvalidStatus)
        );
        board.decide(1, SuggestionStatus::Denied, None, 9, (0, 0)).unwrap();
        assert_eq!(
            board.decide(1, SuggestionStatus::Approved, None, 9, (0, 0)),
            Err(DecisionError::AlreadyDecided(1, "Denied"))
        );
    }

    #[test]
    fn test_board_survives_json_roundtrip_keys() {
        let mut board = SuggestionBoard::default();
        board.submit(1, "a", 2, Utc::now());
        board.submit(1, "b", 2, Utc::now());
        let json = serde_json::to_string(&board).unwrap();
        let back: SuggestionBoard = serde_json::from_str(&json).unwrap();
        assert_eq!(back.suggestions.len(), 2);
        assert_eq!(back.next_id, 2);
    }

    #[tokio::test]
    async fn test_posted_suggestion_is_linked_before_any_reaction() {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        let service = SuggestionService::new(db);

        let id = service
            .update(3, |b| b.submit(7, "Weekly movie night", 100, Utc::now()).id)
            .await
            .unwrap();
        assert!(service.attach_message(3, id, 555).await.unwrap());
        assert!(!service.attach_message(3, id + 1, 556).await.unwrap());

        let board = service.board(3).await.unwrap();
        assert_eq!(board.suggestions[&id].message_id, Some(555));
        assert!(board.is_self_vote(555, 7));
    }

    #[test]
    fn test_vote_count_excludes_bot() {
        assert_eq!(vote_count(3, true), 2);
        assert_eq!(vote_count(0, true), 0);
        assert_eq!(vote_count(3, false), 3);
    }
}
