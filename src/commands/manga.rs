use super::truncate;
use crate::config::DISCORD_EMBED_LIMIT;
use crate::manga::checker::announce;
use crate::manga::tracker::{find_key, TrackedSeries, TrackerService};
use crate::{Context, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;
use serenity::{CreateEmbed, CreateEmbedFooter};
use tracing::{error, info};

fn service(ctx: Context<'_>) -> TrackerService {
    TrackerService::new(ctx.data().db.clone(), ctx.data().sources.clone())
}

/// Track manga releases
#[poise::command(
    slash_command,
    subcommands("add", "remove", "list", "channel", "pattern", "check"),
    required_permissions = "MANAGE_GUILD",
    guild_only
)]
pub async fn track(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Track a series (MangaDex title, id or URL, or tcb:<slug>)
#[poise::command(slash_command)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "MangaDex title/id/URL, or tcb:<id>/<slug>"] series: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    ctx.defer().await?;

    match service(ctx)
        .add(guild_id.get(), &series, ctx.author().id.get())
        .await
    {
        Ok(tracked) => {
            let latest = tracked
                .last_chapter
                .as_deref()
                .map(|c| format!(" Latest chapter: **{}**.", c))
                .unwrap_or_default();
            ctx.say(format!(
                "✅ Now tracking **{}** from {}.{}",
                tracked.title,
                tracked.source.label(),
                latest
            ))
            .await?;
        }
        Err(e) => {
            ctx.say(format!("❌ {}", e)).await?;
        }
    }
    Ok(())
}

/// Stop tracking a series
#[poise::command(slash_command)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Series title or key (see /track list)"] series: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    match service(ctx).remove(guild_id.get(), &series).await? {
        Some(removed) => {
            info!("Stopped tracking {} in guild {}", removed.title, guild_id);
            ctx.say(format!("✅ Stopped tracking **{}**.", removed.title))
                .await?
        }
        None => ctx.say("❌ That series is not tracked here.").await?,
    };
    Ok(())
}

fn series_line(key: &str, series: &TrackedSeries) -> String {
    let now = Utc::now();
    let latest = series.last_chapter.as_deref().unwrap_or("?");
    format!(
        "**{}** · ch. {} · {} · checked {}\n`{}`",
        series.title,
        latest,
        series.source.label(),
        series.pattern.check_frequency(now).label(),
        key
    )
}

/// List tracked series
#[poise::command(slash_command)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let doc = service(ctx).guild(guild_id.get()).await?;
    if doc.series.is_empty() {
        ctx.say("📭 No series tracked. Add one with `/track add`.").await?;
        return Ok(());
    }

    let lines = doc
        .series
        .iter()
        .map(|(key, s)| series_line(key, s))
        .collect::<Vec<_>>()
        .join("\n");
    let channel = doc
        .channel_id
        .map(|c| format!("Announcing in <#{}>", c))
        .unwrap_or_else(|| "No announcement channel set".to_string());
    let embed = CreateEmbed::new()
        .title(format!("📚 Tracked series ({})", doc.series.len()))
        .description(truncate(&lines, DISCORD_EMBED_LIMIT))
        .footer(CreateEmbedFooter::new(channel))
        .color(0xF47FFF);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Set the channel new chapters are announced in
#[poise::command(slash_command)]
pub async fn channel(
    ctx: Context<'_>,
    #[description = "Announcement channel"] channel: serenity::GuildChannel,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let channel_id = channel.id.get();
    service(ctx)
        .update(guild_id.get(), move |doc| doc.channel_id = Some(channel_id))
        .await?;
    ctx.say(format!("✅ New chapters will be announced in <#{}>.", channel_id))
        .await?;
    Ok(())
}

/// Show the release pattern of a tracked series
#[poise::command(slash_command)]
pub async fn pattern(
    ctx: Context<'_>,
    #[description = "Series title or key"] series: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let doc = service(ctx).guild(guild_id.get()).await?;
    let Some(tracked) = find_key(&doc, series.trim()).and_then(|k| doc.series.get(&k)) else {
        ctx.say("❌ That series is not tracked here.").await?;
        return Ok(());
    };

    let now = Utc::now();
    let history = tracked.pattern.releases().len();
    let mut embed = CreateEmbed::new()
        .title(format!("📈 {}", tracked.title))
        .field("Releases seen", history.to_string(), true)
        .field(
            "Check frequency",
            tracked.pattern.check_frequency(now).label(),
            true,
        )
        .color(0xF47FFF);

    match tracked.pattern.estimate(now) {
        Some(estimate) => {
            embed = embed.field(
                "Usual day",
                format!(
                    "{} ({:.0}% of releases)",
                    estimate.pattern_day,
                    estimate.confidence * 100.0
                ),
                true,
            );
            if let Some(days) = estimate.average_interval_days {
                embed = embed.field("Average gap", format!("{:.1} days", days), true);
            }
            if let Some(next) = estimate.next_release {
                embed = embed.field(
                    "Next release",
                    format!("<t:{}:D> (<t:{}:R>)", next.timestamp(), next.timestamp()),
                    true,
                );
            }
        }
        None => {
            embed = embed.description("Not enough release history for an estimate yet.");
        }
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Check every tracked series for new chapters now
#[poise::command(slash_command)]
pub async fn check(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    ctx.defer().await?;

    let service = service(ctx);
    let doc = service.guild(guild_id.get()).await?;
    if doc.series.is_empty() {
        ctx.say("📭 No series tracked.").await?;
        return Ok(());
    }

    let updates = service.check_guild(guild_id.get(), Utc::now(), true).await?;
    if updates.is_empty() {
        ctx.say("✅ No new chapters.").await?;
        return Ok(());
    }

    let target = doc.channel_id.unwrap_or_else(|| ctx.channel_id().get());
    let mut found = 0;
    for update in &updates {
        found += update.chapters.len();
        if let Err(e) = announce(ctx.http(), target, update).await {
            error!("Failed to announce {}: {}", update.title, e);
        }
    }
    ctx.say(format!(
        "✅ Found {} new chapter(s) across {} series.",
        found,
        updates.len()
    ))
    .await?;
    Ok(())
}
