use crate::db::{Database, Scope};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const COG: &str = "bounty";

const BASE_REWARD_MIN: u64 = 1_000_000;
const BASE_REWARD_SPREAD: u64 = 9_000_000;
/// Each full step of this much bounty adds one to the reward multiplier.
const RANK_STEP: u64 = 100_000_000;
const MAX_MULTIPLIER: u64 = 5;

const TITLES: [(u64, &str); 6] = [
    (1_000_000_000, "Emperor of the Sea"),
    (500_000_000, "Emperor Commander"),
    (300_000_000, "Supernova"),
    (100_000_000, "Notorious Pirate"),
    (10_000_000, "Rookie Pirate"),
    (0, "Civilian"),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BountyProfile {
    pub bounty: u64,
    pub last_hunt: Option<DateTime<Utc>>,
    pub hunts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HuntOutcome {
    Success { gained: u64, total: u64 },
    Cooldown { remaining: Duration },
}

pub fn title_for(bounty: u64) -> &'static str {
    TITLES
        .iter()
        .find(|(min, _)| bounty >= *min)
        .map(|(_, title)| *title)
        .unwrap_or("Civilian")
}

/// Reward for a hunt. `roll` is uniform in `[0, 1)`; bigger bounties earn
/// proportionally more, up to a cap.
pub fn hunt_reward(current: u64, roll: f64) -> u64 {
    let roll = roll.clamp(0.0, 1.0);
    let base = BASE_REWARD_MIN + (BASE_REWARD_SPREAD as f64 * roll) as u64;
    let multiplier = (1 + current / RANK_STEP).min(MAX_MULTIPLIER);
    base * multiplier
}

impl BountyProfile {
    pub fn hunt(&mut self, now: DateTime<Utc>, cooldown: Duration, roll: f64) -> HuntOutcome {
        if let Some(last) = self.last_hunt {
            let ready_at = last + cooldown;
            if now < ready_at {
                return HuntOutcome::Cooldown {
                    remaining: ready_at - now,
                };
            }
        }
        let gained = hunt_reward(self.bounty, roll);
        self.bounty = self.bounty.saturating_add(gained);
        self.last_hunt = Some(now);
        self.hunts += 1;
        HuntOutcome::Success {
            gained,
            total: self.bounty,
        }
    }
}

/// Formats berries with thousands separators, e.g. `1,500,000`.
pub fn format_berries(amount: u64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub struct BountyService {
    db: Database,
    cooldown: Duration,
}

impl BountyService {
    pub fn new(db: Database, cooldown: std::time::Duration) -> Self {
        let cooldown = Duration::from_std(cooldown).unwrap_or_else(|_| Duration::hours(6));
        Self { db, cooldown }
    }

    pub async fn profile(&self, guild_id: u64, user_id: u64) -> anyhow::Result<BountyProfile> {
        self.db
            .run_blocking(move |db| db.load(COG, Scope::Member(guild_id, user_id)))
            .await
    }

    pub async fn hunt(&self, guild_id: u64, user_id: u64, roll: f64) -> anyhow::Result<HuntOutcome> {
        let cooldown = self.cooldown;
        let now = Utc::now();
        self.db
            .run_blocking(move |db| {
                db.update(COG, Scope::Member(guild_id, user_id), |p: &mut BountyProfile| {
                    p.hunt(now, cooldown, roll)
                })
            })
            .await
    }

    pub async fn set_bounty(&self, guild_id: u64, user_id: u64, bounty: u64) -> anyhow::Result<()> {
        self.db
            .run_blocking(move |db| {
                db.update(COG, Scope::Member(guild_id, user_id), |p: &mut BountyProfile| {
                    p.bounty = bounty;
                })
            })
            .await
    }

    pub async fn leaderboard(&self, guild_id: u64, limit: usize) -> anyhow::Result<Vec<(u64, BountyProfile)>> {
        let mut rows: Vec<(u64, BountyProfile)> = self
            .db
            .run_blocking(move |db| db.list_member_documents(COG, guild_id))
            .await?;
        rows.retain(|(_, p)| p.bounty > 0);
        rows.sort_by(|a, b| b.1.bounty.cmp(&a.1.bounty).then(a.0.cmp(&b.0)));
        rows.truncate(limit);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_titles() {
        assert_eq!(title_for(0), "Civilian");
        assert_eq!(title_for(9_999_999), "Civilian");
        assert_eq!(title_for(10_000_000), "Rookie Pirate");
        assert_eq!(title_for(3_000_000_000), "Emperor of the Sea");
    }

    #[test]
    fn test_hunt_reward_scaling() {
        assert_eq!(hunt_reward(0, 0.0), 1_000_000);
        assert_eq!(hunt_reward(0, 0.5), 5_500_000);
        assert_eq!(hunt_reward(250_000_000, 0.0), 3_000_000);
        assert_eq!(hunt_reward(u64::MAX / 2, 0.0), 5_000_000);
    }

    #[test]
    fn test_hunt_cooldown() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut p = BountyProfile::default();
        let cooldown = Duration::hours(6);

        assert_eq!(
            p.hunt(start, cooldown, 0.0),
            HuntOutcome::Success { gained: 1_000_000, total: 1_000_000 }
        );
        match p.hunt(start + Duration::hours(2), cooldown, 0.0) {
            HuntOutcome::Cooldown { remaining } => assert_eq!(remaining, Duration::hours(4)),
            other => panic!("expected cooldown, got {:?}", other),
        }
        assert!(matches!(
            p.hunt(start + Duration::hours(6), cooldown, 0.0),
            HuntOutcome::Success { total: 2_000_000, .. }
        ));
        assert_eq!(p.hunts, 2);
    }

    #[test]
    fn test_format_berries() {
        assert_eq!(format_berries(0), "0");
        assert_eq!(format_berries(999), "999");
        assert_eq!(format_berries(1_500_000), "1,500,000");
        assert_eq!(format_berries(12_345), "12,345");
    }

    #[tokio::test]
    async fn test_leaderboard_orders_by_bounty() {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        let service = BountyService::new(db, std::time::Duration::from_secs(60));
        service.set_bounty(1, 10, 500).await.unwrap();
        service.set_bounty(1, 11, 900).await.unwrap();
        service.set_bounty(1, 12, 0).await.unwrap();
        service.set_bounty(2, 13, 10_000).await.unwrap();

        let board = service.leaderboard(1, 10).await.unwrap();
        let ids: Vec<_> = board.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![11, 10]);

        let outcome = service.hunt(1, 10, 0.0).await.unwrap();
        assert_eq!(outcome, HuntOutcome::Success { gained: 1_000_000, total: 1_000_500 });
        assert!(matches!(
            service.hunt(1, 10, 0.0).await.unwrap(),
            HuntOutcome::Cooldown { .. }
        ));
    }
}
