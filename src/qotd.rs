use crate::housekeeping::tick_period;
use crate::services::qotd::{QotdService, ScheduledQuestion};
use chrono::{DateTime, Utc};
use serenity::all::{ChannelId, CreateEmbed, CreateMessage};
use serenity::http::Http;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};

/// Posts each guild's question of the day once its hour comes round.
pub struct QotdDispatcher {
    service: QotdService,
    http: Arc<Http>,
    poll_interval: Duration,
}

impl QotdDispatcher {
    pub fn new(service: QotdService, http: Arc<Http>, poll_interval_secs: u64) -> Self {
        Self {
            service,
            http,
            poll_interval: tick_period(poll_interval_secs),
        }
    }

    pub async fn run(self) {
        let mut ticker = interval(self.poll_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.dispatch_due(Utc::now()).await {
                error!("QOTD dispatch cycle failed: {}", e);
            }
        }
    }

    async fn dispatch_due(&self, now: DateTime<Utc>) -> anyhow::Result<()> {
        for guild_id in self.service.due_guilds(now).await? {
            let Some(scheduled) = self.service.take_due(guild_id, now).await? else {
                continue;
            };
            if let Err(e) = post_question(&self.http, &scheduled).await {
                error!(
                    "Failed to post QOTD #{} for guild {}: {}",
                    scheduled.number, guild_id, e
                );
                self.service
                    .update(guild_id, move |s| s.restore(scheduled))
                    .await?;
            } else {
                info!("Posted QOTD #{} for guild {}", scheduled.number, guild_id);
            }
        }
        Ok(())
    }
}

pub fn question_embed(scheduled: &ScheduledQuestion) -> CreateEmbed {
    CreateEmbed::new()
        .title(format!("❓ Question of the Day #{}", scheduled.number))
        .description(&scheduled.question)
        .color(0x5865F2)
}

pub async fn post_question(http: &Http, scheduled: &ScheduledQuestion) -> anyhow::Result<()> {
    debug!("Posting QOTD #{} to channel {}", scheduled.number, scheduled.channel_id);
    ChannelId::new(scheduled.channel_id)
        .send_message(http, CreateMessage::new().embed(question_embed(scheduled)))
        .await?;
    Ok(())
}
