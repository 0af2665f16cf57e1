use super::truncate;
use crate::qotd::post_question;
use crate::services::qotd::{QotdService, MAX_QUESTION_CHARS};
use crate::{Context, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;
use tracing::{error, info};

const MAX_LISTED: usize = 20;

/// Question of the day
#[poise::command(
    slash_command,
    subcommands("add", "remove", "list", "channel", "time", "post"),
    required_permissions = "MANAGE_GUILD",
    guild_only
)]
pub async fn qotd(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Queue a question
#[poise::command(slash_command)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "Question text"] question: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let question = question.trim().to_string();
    if question.is_empty() || question.chars().count() > MAX_QUESTION_CHARS {
        ctx.say(format!(
            "❌ Questions must be 1-{} characters.",
            MAX_QUESTION_CHARS
        ))
        .await?;
        return Ok(());
    }
    let queued = QotdService::new(ctx.data().db.clone())
        .update(guild_id.get(), move |s| {
            s.questions.push_back(question);
            s.questions.len()
        })
        .await?;
    ctx.say(format!("✅ Question queued at position **{}**.", queued))
        .await?;
    Ok(())
}

/// Remove a queued question by position
#[poise::command(slash_command)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Position in the queue (see /qotd list)"]
    #[min = 1]
    position: usize,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    match QotdService::new(ctx.data().db.clone())
        .update(guild_id.get(), move |s| s.remove(position))
        .await?
    {
        Some(q) => ctx.say(format!("✅ Removed: {}", truncate(&q, 100))).await?,
        None => ctx.say(format!("❌ No question at position {}.", position)).await?,
    };
    Ok(())
}

/// Show the question queue
#[poise::command(slash_command)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let settings = QotdService::new(ctx.data().db.clone())
        .settings(guild_id.get())
        .await?;

    let queue = if settings.questions.is_empty() {
        "📭 The queue is empty.".to_string()
    } else {
        let mut lines: Vec<String> = settings
            .questions
            .iter()
            .take(MAX_LISTED)
            .enumerate()
            .map(|(i, q)| format!("**{}.** {}", i + 1, truncate(q, 100)))
            .collect();
        if settings.questions.len() > MAX_LISTED {
            lines.push(format!("…and {} more", settings.questions.len() - MAX_LISTED));
        }
        lines.join("\n")
    };

    let embed = serenity::CreateEmbed::new()
        .title("❓ Question of the Day")
        .description(queue)
        .field(
            "Channel",
            settings
                .channel_id
                .map(|c| format!("<#{}>", c))
                .unwrap_or_else(|| "not set".to_string()),
            true,
        )
        .field("Posts at", format!("{:02}:00 UTC", settings.post_hour), true)
        .field("Posted so far", settings.posted.to_string(), true)
        .color(0x5865F2);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Set the channel questions are posted in
#[poise::command(slash_command)]
pub async fn channel(
    ctx: Context<'_>,
    #[description = "Channel"] channel: serenity::GuildChannel,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let channel_id = channel.id.get();
    QotdService::new(ctx.data().db.clone())
        .update(guild_id.get(), move |s| s.channel_id = Some(channel_id))
        .await?;
    ctx.say(format!("✅ Questions will be posted in <#{}>.", channel_id))
        .await?;
    Ok(())
}

/// Set the hour (UTC) the daily question goes out
#[poise::command(slash_command)]
pub async fn time(
    ctx: Context<'_>,
    #[description = "Hour of day, 0-23 UTC"]
    #[min = 0]
    #[max = 23]
    hour: u32,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    if hour > 23 {
        ctx.say("❌ The hour must be between 0 and 23.").await?;
        return Ok(());
    }
    QotdService::new(ctx.data().db.clone())
        .update(guild_id.get(), move |s| s.post_hour = hour)
        .await?;
    ctx.say(format!("✅ Questions will post daily at **{:02}:00 UTC**.", hour))
        .await?;
    Ok(())
}

/// Post the next question right now
#[poise::command(slash_command)]
pub async fn post(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let service = QotdService::new(ctx.data().db.clone());
    let now = Utc::now();
    let Some(scheduled) = service
        .update(guild_id.get(), move |s| s.take_next(now))
        .await?
    else {
        ctx.say("❌ Set a channel and queue at least one question first.")
            .await?;
        return Ok(());
    };

    if let Err(e) = post_question(ctx.http(), &scheduled).await {
        error!("Manual QOTD post failed in guild {}: {}", guild_id, e);
        service
            .update(guild_id.get(), move |s| s.restore(scheduled))
            .await?;
        ctx.say("❌ Could not post the question; it is back in the queue.")
            .await?;
        return Ok(());
    }

    info!("Posted QOTD #{} manually in guild {}", scheduled.number, guild_id);
    ctx.say(format!(
        "✅ Posted question #{} in <#{}>.",
        scheduled.number, scheduled.channel_id
    ))
    .await?;
    Ok(())
}
