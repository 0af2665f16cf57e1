use super::tracker::{SeriesUpdate, TrackerService};
use crate::api::Chapter;
use crate::housekeeping::tick_period;
use chrono::Utc;
use serenity::all::{ChannelId, CreateEmbed, CreateMessage};
use serenity::http::Http;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};

const EMBED_COLOR: u32 = 0xF47FFF;

/// Polls tracked series and announces new chapters.
pub struct MangaChecker {
    service: TrackerService,
    http: Arc<Http>,
    poll_interval: Duration,
}

impl MangaChecker {
    pub fn new(service: TrackerService, http: Arc<Http>, poll_interval_secs: u64) -> Self {
        Self {
            service,
            http,
            poll_interval: tick_period(poll_interval_secs),
        }
    }

    pub async fn run(self) {
        info!(
            "Manga checker started (every {}s)",
            self.poll_interval.as_secs()
        );
        let mut ticker = interval(self.poll_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.check_all().await {
                error!("Manga check cycle failed: {}", e);
            }
        }
    }

    async fn check_all(&self) -> anyhow::Result<()> {
        let now = Utc::now();
        for (guild_id, doc) in self.service.guilds().await? {
            let Some(channel_id) = doc.channel_id else {
                continue;
            };
            if doc.series.is_empty() {
                continue;
            }

            let updates = match self.service.check_guild(guild_id, now, false).await {
                Ok(updates) => updates,
                Err(e) => {
                    error!("Manga check for guild {} failed: {}", guild_id, e);
                    continue;
                }
            };

            for update in updates {
                debug!(
                    "Announcing {} chapter(s) of {} in guild {}",
                    update.chapters.len(),
                    update.title,
                    guild_id
                );
                if let Err(e) = announce(&self.http, channel_id, &update).await {
                    error!(
                        "Failed to announce {} in channel {}: {}",
                        update.title, channel_id, e
                    );
                }
            }
        }
        Ok(())
    }
}

pub fn chapter_embed(title: &str, chapter: &Chapter) -> CreateEmbed {
    let mut heading = format!("📖 {} · Chapter {}", title, chapter.number);
    if let Some(name) = chapter.title.as_deref().filter(|t| !t.is_empty()) {
        heading.push_str(&format!(": {}", name));
    }
    let mut embed = CreateEmbed::new()
        .title(heading)
        .url(&chapter.url)
        .color(EMBED_COLOR);
    if let Some(at) = chapter.published_at {
        embed = embed.description(format!("Released <t:{}:R>", at.timestamp()));
    }
    embed
}

/// Discord allows ten embeds per message.
const MAX_EMBEDS: usize = 10;

/// Splits new chapters into per-message batches, oldest first.
pub fn announcement_batches(chapters: &[Chapter]) -> std::slice::Chunks<'_, Chapter> {
    chapters.chunks(MAX_EMBEDS)
}

pub async fn announce(http: &Http, channel_id: u64, update: &SeriesUpdate) -> anyhow::Result<()> {
    for batch in announcement_batches(&update.chapters) {
        let embeds = batch
            .iter()
            .map(|c| chapter_embed(&update.title, c))
            .collect::<Vec<_>>();
        ChannelId::new(channel_id)
            .send_message(http, CreateMessage::new().embeds(embeds))
            .await?;
    }
    Ok(())
}
