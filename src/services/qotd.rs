use crate::db::{Database, Scope};
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const COG: &str = "qotd";
pub const MAX_QUESTION_CHARS: usize = 500;
const DEFAULT_POST_HOUR: u32 = 12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QotdSettings {
    pub channel_id: Option<u64>,
    /// Hour of day (UTC) from which the daily question may go out.
    pub post_hour: u32,
    pub questions: VecDeque<String>,
    pub posted: u32,
    pub last_posted: Option<NaiveDate>,
}

impl Default for QotdSettings {
    fn default() -> Self {
        Self {
            channel_id: None,
            post_hour: DEFAULT_POST_HOUR,
            questions: VecDeque::new(),
            posted: 0,
            last_posted: None,
        }
    }
}

/// A question taken off the queue, with what is needed to undo it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledQuestion {
    pub channel_id: u64,
    pub number: u32,
    pub question: String,
    previous_last_posted: Option<NaiveDate>,
}

impl QotdSettings {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.channel_id.is_some()
            && !self.questions.is_empty()
            && now.hour() >= self.post_hour
            && self.last_posted != Some(now.date_naive())
    }

    /// Pops the next question and marks today as posted.
    pub fn take_next(&mut self, now: DateTime<Utc>) -> Option<ScheduledQuestion> {
        let channel_id = self.channel_id?;
        let question = self.questions.pop_front()?;
        let previous_last_posted = self.last_posted.replace(now.date_naive());
        self.posted += 1;
        Some(ScheduledQuestion {
            channel_id,
            number: self.posted,
            question,
            previous_last_posted,
        })
    }

    /// Puts a question back after a failed post.
    pub fn restore(&mut self, scheduled: ScheduledQuestion) {
        self.questions.push_front(scheduled.question);
        self.posted = self.posted.saturating_sub(1);
        self.last_posted = scheduled.previous_last_posted;
    }

    pub fn remove(&mut self, position: usize) -> Option<String> {
        if position == 0 {
            return None;
        }
        self.questions.remove(position - 1)
    }
}

pub struct QotdService {
    db: Database,
}

impl QotdService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn settings(&self, guild_id: u64) -> anyhow::Result<QotdSettings> {
        self.db
            .run_blocking(move |db| db.load(COG, Scope::Guild(guild_id)))
            .await
    }

    pub async fn update<F, R>(&self, guild_id: u64, f: F) -> anyhow::Result<R>
    where
        F: FnOnce(&mut QotdSettings) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.db
            .run_blocking(move |db| db.update(COG, Scope::Guild(guild_id), f))
            .await
    }

    /// Guild ids whose question is due at `now`.
    pub async fn due_guilds(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<u64>> {
        let all: Vec<(u64, QotdSettings)> = self
            .db
            .run_blocking(|db| db.list_guild_documents(COG))
            .await?;
        Ok(all
            .into_iter()
            .filter(|(_, s)| s.is_due(now))
            .map(|(id, _)| id)
            .collect())
    }

    /// Takes the next question if the guild is still due; re-checked under
    /// the write so a manual post and a tick cannot both fire.
    pub async fn take_due(
        &self,
        guild_id: u64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<ScheduledQuestion>> {
        self.update(guild_id, move |s| {
            if s.is_due(now) {
                s.take_next(now)
            } else {
                None
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn configured() -> QotdSettings {
        QotdSettings {
            channel_id: Some(5),
            post_hour: 9,
            questions: VecDeque::from(vec!["First?".to_string(), "Second?".to_string()]),
            ..QotdSettings::default()
        }
    }

    #[test]
    fn test_is_due_rules() {
        let morning = Utc.with_ymd_and_hms(2024, 3, 1, 8, 59, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let mut s = configured();
        assert!(!s.is_due(morning));
        assert!(s.is_due(later));

        s.take_next(later).unwrap();
        assert!(!s.is_due(later));
        let next_day = Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap();
        assert!(s.is_due(next_day));

        let unconfigured = QotdSettings::default();
        assert!(!unconfigured.is_due(next_day));
    }

    #[test]
    fn test_take_next_is_fifo_and_restorable() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut s = configured();
        let q = s.take_next(now).unwrap();
        assert_eq!(q.question, "First?");
        assert_eq!(q.number, 1);
        assert_eq!(s.questions.len(), 1);

        s.restore(q);
        assert_eq!(s.questions.front().map(String::as_str), Some("First?"));
        assert_eq!(s.posted, 0);
        assert_eq!(s.last_posted, None);
    }

    #[test]
    fn test_remove_is_one_based() {
        let mut s = configured();
        assert_eq!(s.remove(0), None);
        assert_eq!(s.remove(2).as_deref(), Some("Second?"));
        assert_eq!(s.remove(2), None);
    }

    #[tokio::test]
    async fn test_take_due_only_once_per_day() {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        let service = QotdService::new(db);
        service.update(1, |s| *s = configured()).await.unwrap();

        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(service.due_guilds(now).await.unwrap(), vec![1]);
        assert!(service.take_due(1, now).await.unwrap().is_some());
        assert!(service.take_due(1, now).await.unwrap().is_none());
        assert!(service.due_guilds(now).await.unwrap().is_empty());
    }
}
