use crate::db::{Database, Scope};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

pub const COG: &str = "moderation";

/// Longest timeout Discord accepts.
pub const MAX_TIMEOUT_MINUTES: u64 = 28 * 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModAction {
    Timeout { minutes: u64 },
    Kick,
    Ban,
}

impl ModAction {
    pub fn describe(&self) -> String {
        match self {
            ModAction::Timeout { minutes } => {
                let duration = std::time::Duration::from_secs(minutes * 60);
                format!("timeout for {}", humantime::format_duration(duration))
            }
            ModAction::Kick => "kick".to_string(),
            ModAction::Ban => "ban".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threshold {
    pub points: u32,
    pub action: ModAction,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationSettings {
    pub thresholds: Vec<Threshold>,
    pub expiry_days: Option<u32>,
    pub log_channel: Option<u64>,
}

impl ModerationSettings {
    /// Adds or replaces the threshold at `points`, keeping them sorted.
    pub fn set_threshold(&mut self, threshold: Threshold) {
        self.thresholds.retain(|t| t.points != threshold.points);
        self.thresholds.push(threshold);
        self.thresholds.sort_by_key(|t| t.points);
    }

    pub fn remove_threshold(&mut self, points: u32) -> bool {
        let before = self.thresholds.len();
        self.thresholds.retain(|t| t.points != points);
        self.thresholds.len() != before
    }

    /// The threshold to enforce when a member goes from `before` to `after`
    /// points: the highest one crossed by this step, if any.
    pub fn triggered(&self, before: u32, after: u32) -> Option<Threshold> {
        self.thresholds
            .iter()
            .filter(|t| before < t.points && t.points <= after)
            .max_by_key(|t| t.points)
            .copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub id: u32,
    pub points: u32,
    pub reason: String,
    pub moderator_id: u64,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberWarnings {
    pub warnings: Vec<Warning>,
    pub next_id: u32,
}

impl MemberWarnings {
    /// `expiry_days == 0` means warnings never expire.
    pub fn is_active(warning: &Warning, now: DateTime<Utc>, expiry_days: u32) -> bool {
        expiry_days == 0 || now - warning.issued_at < Duration::days(expiry_days as i64)
    }

    pub fn active_points(&self, now: DateTime<Utc>, expiry_days: u32) -> u32 {
        self.warnings
            .iter()
            .filter(|w| Self::is_active(w, now, expiry_days))
            .map(|w| w.points)
            .sum()
    }

    pub fn add(
        &mut self,
        points: u32,
        reason: &str,
        moderator_id: u64,
        now: DateTime<Utc>,
    ) -> Warning {
        self.next_id += 1;
        let warning = Warning {
            id: self.next_id,
            points,
            reason: reason.to_string(),
            moderator_id,
            issued_at: now,
        };
        self.warnings.push(warning.clone());
        warning
    }

    pub fn remove(&mut self, id: u32) -> Option<Warning> {
        let idx = self.warnings.iter().position(|w| w.id == id)?;
        Some(self.warnings.remove(idx))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WarnOutcome {
    pub warning: Warning,
    pub previous_points: u32,
    pub total_points: u32,
    pub action: Option<Threshold>,
    pub log_channel: Option<u64>,
}

pub struct ModerationService {
    db: Database,
    default_expiry_days: u32,
}

impl ModerationService {
    pub fn new(db: Database, default_expiry_days: u32) -> Self {
        Self {
            db,
            default_expiry_days,
        }
    }

    pub async fn settings(&self, guild_id: u64) -> anyhow::Result<ModerationSettings> {
        self.db
            .run_blocking(move |db| db.load(COG, Scope::Guild(guild_id)))
            .await
    }

    pub async fn update_settings<F, R>(&self, guild_id: u64, f: F) -> anyhow::Result<R>
    where
        F: FnOnce(&mut ModerationSettings) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.db
            .run_blocking(move |db| db.update(COG, Scope::Guild(guild_id), f))
            .await
    }

    pub fn expiry_days(&self, settings: &ModerationSettings) -> u32 {
        settings.expiry_days.unwrap_or(self.default_expiry_days)
    }

    pub async fn warn(
        &self,
        guild_id: u64,
        user_id: u64,
        moderator_id: u64,
        points: u32,
        reason: &str,
    ) -> anyhow::Result<WarnOutcome> {
        let settings = self.settings(guild_id).await?;
        let expiry_days = self.expiry_days(&settings);
        let reason = reason.to_string();
        let now = Utc::now();

        let (warning, previous_points, total_points) = self
            .db
            .run_blocking(move |db| {
                db.update(COG, Scope::Member(guild_id, user_id), |doc: &mut MemberWarnings| {
                    let previous = doc.active_points(now, expiry_days);
                    let warning = doc.add(points, &reason, moderator_id, now);
                    (warning, previous, doc.active_points(now, expiry_days))
                })
            })
            .await?;

        Ok(WarnOutcome {
            action: settings.triggered(previous_points, total_points),
            log_channel: settings.log_channel,
            warning,
            previous_points,
            total_points,
        })
    }

    pub async fn warnings(&self, guild_id: u64, user_id: u64) -> anyhow::Result<MemberWarnings> {
        self.db
            .run_blocking(move |db| db.load(COG, Scope::Member(guild_id, user_id)))
            .await
    }

    pub async fn remove_warning(
        &self,
        guild_id: u64,
        user_id: u64,
        warning_id: u32,
    ) -> anyhow::Result<Option<Warning>> {
        self.db
            .run_blocking(move |db| {
                db.update(COG, Scope::Member(guild_id, user_id), |doc: &mut MemberWarnings| {
                    doc.remove(warning_id)
                })
            })
            .await
    }

    pub async fn clear_warnings(&self, guild_id: u64, user_id: u64) -> anyhow::Result<usize> {
        self.db
            .run_blocking(move |db| {
                db.update(COG, Scope::Member(guild_id, user_id), |doc: &mut MemberWarnings| {
                    let count = doc.warnings.len();
                    doc.warnings.clear();
                    count
                })
            })
            .await
    }
}

/// Plain-text warning history for the paste upload.
pub fn export_text(
    member_label: &str,
    warnings: &MemberWarnings,
    now: DateTime<Utc>,
    expiry_days: u32,
) -> String {
    let mut out = format!("Warning history for {}\n", member_label);
    let _ = writeln!(
        out,
        "Active points: {}\n",
        warnings.active_points(now, expiry_days)
    );
    for w in &warnings.warnings {
        let state = if MemberWarnings::is_active(w, now, expiry_days) {
            "active"
        } else {
            "expired"
        };
        let _ = writeln!(
            out,
            "#{} [{}] {} point(s) by {} on {}: {}",
            w.id,
            state,
            w.points,
            w.moderator_id,
            w.issued_at.format("%Y-%m-%d %H:%M UTC"),
            w.reason
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn settings() -> ModerationSettings {
        let mut s = ModerationSettings::default();
        s.set_threshold(Threshold { points: 10, action: ModAction::Ban });
        s.set_threshold(Threshold { points: 3, action: ModAction::Timeout { minutes: 60 } });
        s.set_threshold(Threshold { points: 6, action: ModAction::Kick });
        s
    }

    #[test]
    fn test_thresholds_sorted_and_replaced() {
        let mut s = settings();
        let points: Vec<_> = s.thresholds.iter().map(|t| t.points).collect();
        assert_eq!(points, vec![3, 6, 10]);

        s.set_threshold(Threshold { points: 6, action: ModAction::Ban });
        assert_eq!(s.thresholds.len(), 3);
        assert_eq!(s.thresholds[1].action, ModAction::Ban);
        assert!(s.remove_threshold(6));
        assert!(!s.remove_threshold(6));
    }

    #[test]
    fn test_triggered_picks_highest_newly_crossed() {
        let s = settings();
        assert_eq!(s.triggered(0, 2), None);
        assert_eq!(s.triggered(0, 3).unwrap().points, 3);
        assert_eq!(s.triggered(2, 7).unwrap().action, ModAction::Kick);
        assert_eq!(s.triggered(0, 12).unwrap().action, ModAction::Ban);
        // Already past 3 and 6, not yet 10.
        assert_eq!(s.triggered(6, 9), None);
    }

    #[test]
    fn test_active_points_respect_expiry() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut doc = MemberWarnings::default();
        doc.add(2, "old", 1, now - Duration::days(40));
        doc.add(3, "recent", 1, now - Duration::days(2));
        assert_eq!(doc.active_points(now, 30), 3);
        assert_eq!(doc.active_points(now, 0), 5);
        assert_eq!(doc.next_id, 2);

        assert_eq!(doc.remove(1).unwrap().reason, "old");
        assert!(doc.remove(1).is_none());
    }

    #[test]
    fn test_export_text_marks_expired() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut doc = MemberWarnings::default();
        doc.add(2, "spam", 7, now - Duration::days(40));
        doc.add(1, "rude", 7, now);
        let text = export_text("user#1", &doc, now, 30);
        assert!(text.contains("Active points: 1"));
        assert!(text.contains("#1 [expired] 2 point(s) by 7"));
        assert!(text.contains("#2 [active] 1 point(s)"));
    }

    #[test]
    fn test_action_describe() {
        assert_eq!(ModAction::Timeout { minutes: 90 }.describe(), "timeout for 1h 30m");
        assert_eq!(ModAction::Ban.describe(), "ban");
    }

    #[tokio::test]
    async fn test_warn_flow_applies_threshold() {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        let service = ModerationService::new(db, 30);
        service
            .update_settings(1, |s| {
                s.set_threshold(Threshold { points: 3, action: ModAction::Kick });
                s.log_channel = Some(99);
            })
            .await
            .unwrap();

        let first = service.warn(1, 2, 3, 2, "spam").await.unwrap();
        assert_eq!(first.total_points, 2);
        assert!(first.action.is_none());

        let second = service.warn(1, 2, 3, 2, "more spam").await.unwrap();
        assert_eq!(second.previous_points, 2);
        assert_eq!(second.total_points, 4);
        assert_eq!(second.action.unwrap().action, ModAction::Kick);
        assert_eq!(second.log_channel, Some(99));
        assert_eq!(second.warning.id, 2);

        assert_eq!(service.clear_warnings(1, 2).await.unwrap(), 2);
        assert!(service.warnings(1, 2).await.unwrap().warnings.is_empty());
    }
}
