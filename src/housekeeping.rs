use crate::api::jikan::JikanEntry;
use crate::api::Chapter;
use crate::cache::{CacheStats, SharedCache};
use tokio::time::{interval, Duration};
use tracing::{debug, info};

/// Every response cache the bot keeps, by name.
#[derive(Clone)]
pub struct ApiCaches {
    pub jikan: SharedCache<Vec<JikanEntry>>,
    pub chapters: SharedCache<Vec<Chapter>>,
}

impl ApiCaches {
    pub fn new(max_size: usize, default_ttl: std::time::Duration) -> Self {
        Self {
            jikan: SharedCache::new(max_size, default_ttl),
            chapters: SharedCache::new(max_size, default_ttl),
        }
    }

    pub fn stats(&self) -> Vec<(&'static str, CacheStats)> {
        vec![
            ("jikan", self.jikan.stats()),
            ("chapters", self.chapters.stats()),
        ]
    }

    pub fn clean_expired(&self) -> usize {
        self.jikan.clean_expired() + self.chapters.clean_expired()
    }
}

/// Period for a background loop. `interval` rejects zero, so 0 means 1s.
pub fn tick_period(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1))
}

pub async fn start_cache_cleanup_task(caches: ApiCaches, interval_secs: u64) {
    info!("Starting cache cleanup task (every {}s)", interval_secs);
    let mut ticker = interval(tick_period(interval_secs));
    loop {
        ticker.tick().await;
        let removed = caches.clean_expired();
        if removed > 0 {
            debug!("Cache cleanup evicted {} expired entries", removed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_clean_expired_sweeps_every_cache() {
        let caches = ApiCaches::new(10, Duration::from_secs(60));
        caches.jikan.set("anime:berserk", Vec::new());
        caches.chapters.set("tcb:5/op", Vec::new());
        caches
            .chapters
            .set_with_ttl("mangadex:feed:x", Vec::new(), Duration::from_secs(600));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(caches.clean_expired(), 2);

        let stats = caches.stats();
        assert_eq!(stats[0].1.size, 0);
        assert_eq!(stats[1].1.size, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_still_ticks() {
        assert_eq!(tick_period(0), Duration::from_secs(1));
        assert_eq!(tick_period(300), Duration::from_secs(300));

        let mut ticker = interval(tick_period(0));
        ticker.tick().await;
        let start = tokio::time::Instant::now();
        ticker.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }
}
