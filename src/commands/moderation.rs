use super::truncate;
use crate::config::DISCORD_EMBED_LIMIT;
use crate::services::moderation::{
    export_text, MemberWarnings, ModAction, ModerationService, Threshold, WarnOutcome,
    MAX_TIMEOUT_MINUTES,
};
use crate::{Context, Error};
use chrono::Utc;
use humantime::parse_duration;
use poise::serenity_prelude as serenity;
use serenity::{ChannelId, CreateEmbed, CreateMessage, EditMember, GuildId, Timestamp, User};
use tracing::{error, info, warn};

const MAX_REASON_CHARS: usize = 500;
const MAX_LISTED_WARNINGS: usize = 15;

fn service(ctx: Context<'_>) -> ModerationService {
    ModerationService::new(
        ctx.data().db.clone(),
        ctx.data().config.warning_expiry_days,
    )
}

/// Warn a member and apply any point threshold they cross
#[poise::command(slash_command, guild_only, required_permissions = "MODERATE_MEMBERS")]
pub async fn warn(
    ctx: Context<'_>,
    #[description = "Member to warn"] member: User,
    #[description = "Points for this warning"]
    #[min = 1]
    #[max = 100]
    points: u32,
    #[description = "Reason"] reason: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let reason = reason.trim();
    if reason.is_empty() || reason.chars().count() > MAX_REASON_CHARS {
        ctx.say(format!(
            "❌ A reason is required (max {} characters).",
            MAX_REASON_CHARS
        ))
        .await?;
        return Ok(());
    }
    if member.bot {
        ctx.say("❌ Bots cannot be warned.").await?;
        return Ok(());
    }

    ctx.defer().await?;

    let outcome = service(ctx)
        .warn(guild_id.get(), member.id.get(), ctx.author().id.get(), points, reason)
        .await?;

    info!(
        "Warning #{} for {} in guild {}: {} -> {} points",
        outcome.warning.id, member.id, guild_id, outcome.previous_points, outcome.total_points
    );

    let mut reply = format!(
        "⚠️ Warned **{}** (+{} points, {} active).",
        member.name, points, outcome.total_points
    );

    let action_note = match outcome.action {
        Some(threshold) => match apply_action(ctx, guild_id, &member, threshold.action, reason).await {
            Ok(()) => {
                let note = format!("Reached {} points: applied {}.", threshold.points, threshold.action.describe());
                reply.push_str(&format!("\n🔨 {}", note));
                Some(note)
            }
            Err(e) => {
                warn!("Failed to apply {} to {}: {}", threshold.action.describe(), member.id, e);
                let note = format!(
                    "Reached {} points but the {} failed: {}",
                    threshold.points,
                    threshold.action.describe(),
                    e
                );
                reply.push_str(&format!("\n❌ {}", note));
                Some(note)
            }
        },
        None => None,
    };

    ctx.say(reply).await?;
    log_warning(ctx, &member, &outcome, action_note).await;
    Ok(())
}

async fn apply_action(
    ctx: Context<'_>,
    guild_id: GuildId,
    member: &User,
    action: ModAction,
    reason: &str,
) -> Result<(), Error> {
    match action {
        ModAction::Timeout { minutes } => {
            let minutes = minutes.min(MAX_TIMEOUT_MINUTES) as i64;
            let until = Utc::now() + chrono::Duration::minutes(minutes);
            let until = Timestamp::from_unix_timestamp(until.timestamp())?;
            guild_id
                .edit_member(
                    ctx.http(),
                    member.id,
                    EditMember::new()
                        .disable_communication_until_datetime(until)
                        .audit_log_reason(reason),
                )
                .await?;
        }
        ModAction::Kick => guild_id.kick_with_reason(ctx.http(), member.id, reason).await?,
        ModAction::Ban => {
            guild_id
                .ban_with_reason(ctx.http(), member.id, 0, reason)
                .await?
        }
    }
    Ok(())
}

async fn log_warning(ctx: Context<'_>, member: &User, outcome: &WarnOutcome, action_note: Option<String>) {
    let Some(channel_id) = outcome.log_channel else {
        return;
    };
    let mut embed = CreateEmbed::new()
        .title(format!("⚠️ Warning #{}", outcome.warning.id))
        .field("Member", format!("<@{}>", member.id), true)
        .field("Moderator", format!("<@{}>", ctx.author().id), true)
        .field(
            "Points",
            format!("+{} ({} active)", outcome.warning.points, outcome.total_points),
            true,
        )
        .field("Reason", &outcome.warning.reason, false)
        .color(0xFEE75C);
    if let Some(note) = action_note {
        embed = embed.field("Action", note, false);
    }

    if let Err(e) = ChannelId::new(channel_id)
        .send_message(ctx.http(), CreateMessage::new().embed(embed))
        .await
    {
        error!("Failed to write moderation log to {}: {}", channel_id, e);
    }
}

/// Review a member's warnings
#[poise::command(
    slash_command,
    subcommands("list", "remove", "clear", "export"),
    required_permissions = "MODERATE_MEMBERS",
    guild_only
)]
pub async fn warnings(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

fn format_warnings(doc: &MemberWarnings, expiry_days: u32) -> String {
    let now = Utc::now();
    doc.warnings
        .iter()
        .rev()
        .take(MAX_LISTED_WARNINGS)
        .map(|w| {
            let state = if MemberWarnings::is_active(w, now, expiry_days) {
                ""
            } else {
                " *(expired)*"
            };
            format!(
                "`#{}` **{}** pt(s) <t:{}:d> by <@{}>{}\n> {}",
                w.id,
                w.points,
                w.issued_at.timestamp(),
                w.moderator_id,
                state,
                w.reason
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// List a member's warnings
#[poise::command(slash_command)]
pub async fn list(
    ctx: Context<'_>,
    #[description = "Member"] member: User,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let service = service(ctx);
    let settings = service.settings(guild_id.get()).await?;
    let expiry_days = service.expiry_days(&settings);
    let doc = service.warnings(guild_id.get(), member.id.get()).await?;

    if doc.warnings.is_empty() {
        ctx.say(format!("📭 **{}** has no warnings.", member.name)).await?;
        return Ok(());
    }

    let expiry = if expiry_days == 0 {
        "Warnings never expire".to_string()
    } else {
        format!("Warnings expire after {} days", expiry_days)
    };
    let embed = CreateEmbed::new()
        .title(format!("⚠️ Warnings for {}", member.name))
        .description(truncate(&format_warnings(&doc, expiry_days), DISCORD_EMBED_LIMIT))
        .field(
            "Active points",
            doc.active_points(Utc::now(), expiry_days).to_string(),
            true,
        )
        .footer(serenity::CreateEmbedFooter::new(expiry))
        .color(0xFEE75C);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Remove a single warning by id
#[poise::command(slash_command)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Member"] member: User,
    #[description = "Warning id"] id: u32,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    match service(ctx)
        .remove_warning(guild_id.get(), member.id.get(), id)
        .await?
    {
        Some(w) => {
            info!("Removed warning #{} from {} in guild {}", w.id, member.id, guild_id);
            ctx.say(format!("✅ Removed warning `#{}` ({} points).", w.id, w.points))
                .await?;
        }
        None => {
            ctx.say(format!("❌ Warning `#{}` not found.", id)).await?;
        }
    }
    Ok(())
}

/// Clear all of a member's warnings
#[poise::command(slash_command)]
pub async fn clear(
    ctx: Context<'_>,
    #[description = "Member"] member: User,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let count = service(ctx)
        .clear_warnings(guild_id.get(), member.id.get())
        .await?;
    info!("Cleared {} warnings for {} in guild {}", count, member.id, guild_id);
    ctx.say(format!("✅ Cleared {} warning(s) for **{}**.", count, member.name))
        .await?;
    Ok(())
}

/// Upload a member's full warning history to a paste
#[poise::command(slash_command)]
pub async fn export(
    ctx: Context<'_>,
    #[description = "Member"] member: User,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    ctx.defer_ephemeral().await?;

    let service = service(ctx);
    let settings = service.settings(guild_id.get()).await?;
    let doc = service.warnings(guild_id.get(), member.id.get()).await?;
    if doc.warnings.is_empty() {
        ctx.say(format!("📭 **{}** has no warnings.", member.name)).await?;
        return Ok(());
    }

    let label = format!("{} ({})", member.name, member.id);
    let text = export_text(&label, &doc, Utc::now(), service.expiry_days(&settings));
    let url = ctx.data().paste.upload(&text).await?;
    ctx.say(format!("📄 Warning history: {}", url)).await?;
    Ok(())
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum ActionChoice {
    Timeout,
    Kick,
    Ban,
}

/// Configure moderation
#[poise::command(
    slash_command,
    subcommands("threshold", "expiry", "logchannel"),
    required_permissions = "MANAGE_GUILD",
    guild_only
)]
pub async fn modset(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Manage point thresholds
#[poise::command(slash_command, subcommands("threshold_add", "threshold_remove", "threshold_list"))]
pub async fn threshold(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Add or replace a threshold
#[poise::command(slash_command, rename = "add")]
pub async fn threshold_add(
    ctx: Context<'_>,
    #[description = "Active points that trigger the action"]
    #[min = 1]
    points: u32,
    #[description = "Action to take"] action: ActionChoice,
    #[description = "Timeout length (e.g. 1h, 1d); timeouts only"] duration: Option<String>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;

    let action = match action {
        ActionChoice::Kick => ModAction::Kick,
        ActionChoice::Ban => ModAction::Ban,
        ActionChoice::Timeout => {
            let raw = duration.as_deref().unwrap_or("1h");
            let minutes = match parse_duration(raw.trim()) {
                Ok(d) if d.as_secs() >= 60 => d.as_secs() / 60,
                _ => {
                    ctx.say("❌ Invalid timeout. Examples: `10m`, `1h`, `2d`.").await?;
                    return Ok(());
                }
            };
            if minutes > MAX_TIMEOUT_MINUTES {
                ctx.say("❌ Timeouts cannot exceed 28 days.").await?;
                return Ok(());
            }
            ModAction::Timeout { minutes }
        }
    };

    service(ctx)
        .update_settings(guild_id.get(), move |s| {
            s.set_threshold(Threshold { points, action })
        })
        .await?;
    ctx.say(format!(
        "✅ At **{}** points members will receive a {}.",
        points,
        action.describe()
    ))
    .await?;
    Ok(())
}

/// Remove a threshold
#[poise::command(slash_command, rename = "remove")]
pub async fn threshold_remove(
    ctx: Context<'_>,
    #[description = "Threshold points"] points: u32,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let removed = service(ctx)
        .update_settings(guild_id.get(), move |s| s.remove_threshold(points))
        .await?;
    if removed {
        ctx.say(format!("✅ Removed the {} point threshold.", points)).await?;
    } else {
        ctx.say(format!("❌ No threshold at {} points.", points)).await?;
    }
    Ok(())
}

/// List thresholds
#[poise::command(slash_command, rename = "list")]
pub async fn threshold_list(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let service = service(ctx);
    let settings = service.settings(guild_id.get()).await?;
    if settings.thresholds.is_empty() {
        ctx.say("📭 No thresholds configured.").await?;
        return Ok(());
    }

    let lines = settings
        .thresholds
        .iter()
        .map(|t| format!("**{}** points → {}", t.points, t.action.describe()))
        .collect::<Vec<_>>()
        .join("\n");
    let embed = CreateEmbed::new()
        .title("🔨 Warning thresholds")
        .description(lines)
        .field(
            "Expiry",
            match service.expiry_days(&settings) {
                0 => "never".to_string(),
                d => format!("{} days", d),
            },
            true,
        )
        .field(
            "Log channel",
            settings
                .log_channel
                .map(|c| format!("<#{}>", c))
                .unwrap_or_else(|| "not set".to_string()),
            true,
        )
        .color(0x5865F2);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Set how many days warnings count towards thresholds (0 = forever)
#[poise::command(slash_command)]
pub async fn expiry(
    ctx: Context<'_>,
    #[description = "Days"]
    #[max = 3650]
    days: u32,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    service(ctx)
        .update_settings(guild_id.get(), move |s| s.expiry_days = Some(days))
        .await?;
    if days == 0 {
        ctx.say("✅ Warnings will never expire.").await?;
    } else {
        ctx.say(format!("✅ Warnings now expire after **{}** days.", days))
            .await?;
    }
    Ok(())
}

/// Set or clear the moderation log channel
#[poise::command(slash_command)]
pub async fn logchannel(
    ctx: Context<'_>,
    #[description = "Channel (omit to disable logging)"] channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let channel_id = channel.as_ref().map(|c| c.id.get());
    service(ctx)
        .update_settings(guild_id.get(), move |s| s.log_channel = channel_id)
        .await?;
    match channel_id {
        Some(id) => ctx.say(format!("✅ Moderation log set to <#{}>.", id)).await?,
        None => ctx.say("✅ Moderation logging disabled.").await?,
    };
    Ok(())
}
