use super::truncate;
use crate::config::DISCORD_EMBED_LIMIT;
use crate::services::suggestions::{
    vote_count, Suggestion, SuggestionService, SuggestionStatus, DOWNVOTE, UPVOTE,
};
use crate::{Context, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;
use serenity::{
    ChannelId, CreateEmbed, CreateEmbedFooter, CreateMessage, EditMessage, MessageId,
    ReactionType, UserId,
};
use tracing::{info, warn};

const MAX_SUGGESTION_CHARS: usize = 1500;
const MAX_LISTED: usize = 15;

fn suggestion_embed(s: &Suggestion) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(format!("💡 Suggestion #{}", s.id))
        .description(&s.content)
        .field("Submitted by", format!("<@{}>", s.author_id), true)
        .field("Status", s.status.label(), true)
        .color(s.status.color())
        .timestamp(serenity::Timestamp::from(s.created_at));

    if s.status != SuggestionStatus::Pending {
        embed = embed.field(
            "Votes",
            format!("{} {} · {} {}", UPVOTE, s.votes_up, DOWNVOTE, s.votes_down),
            true,
        );
        if let Some(reason) = &s.reason {
            embed = embed.field("Reason", reason, false);
        }
        if let Some(moderator) = s.decided_by {
            embed = embed.footer(CreateEmbedFooter::new(format!(
                "{} by moderator {}",
                s.status.label(),
                moderator
            )));
        }
    }
    embed
}

/// Submit a suggestion for the server
#[poise::command(slash_command, guild_only)]
pub async fn suggest(
    ctx: Context<'_>,
    #[description = "Your suggestion"] text: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let content = text.trim().to_string();
    if content.is_empty() || content.chars().count() > MAX_SUGGESTION_CHARS {
        ctx.say(format!(
            "❌ Suggestions must be 1-{} characters.",
            MAX_SUGGESTION_CHARS
        ))
        .await?;
        return Ok(());
    }

    let service = SuggestionService::new(ctx.data().db.clone());
    let Some(channel_id) = service.board(guild_id.get()).await?.channel_id else {
        ctx.say("❌ This server has no suggestion channel yet.").await?;
        return Ok(());
    };

    let author_id = ctx.author().id.get();
    let now = Utc::now();
    let suggestion = service
        .update(guild_id.get(), move |b| {
            b.submit(author_id, &content, channel_id, now)
        })
        .await?;
    let id = suggestion.id;

    let posted = ChannelId::new(channel_id)
        .send_message(
            ctx.http(),
            CreateMessage::new().embed(suggestion_embed(&suggestion)),
        )
        .await;
    let message = match posted {
        Ok(message) => message,
        Err(e) => {
            service
                .update(guild_id.get(), move |b| b.suggestions.remove(&id))
                .await?;
            return Err(e.into());
        }
    };

    service
        .attach_message(guild_id.get(), id, message.id.get())
        .await?;
    for emoji in [UPVOTE, DOWNVOTE] {
        if let Err(e) = message
            .react(ctx.http(), ReactionType::Unicode(emoji.to_string()))
            .await
        {
            warn!("Could not add {} to suggestion #{}: {}", emoji, id, e);
        }
    }

    info!("Suggestion #{} submitted in guild {}", id, guild_id);
    ctx.send(
        poise::CreateReply::default()
            .content(format!("✅ Suggestion #{} posted in <#{}>.", id, channel_id))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Manage suggestions
#[poise::command(
    slash_command,
    subcommands("approve", "deny", "list", "channel"),
    required_permissions = "MANAGE_GUILD",
    guild_only
)]
pub async fn suggestion(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Approve a suggestion
#[poise::command(slash_command)]
pub async fn approve(
    ctx: Context<'_>,
    #[description = "Suggestion number"] id: u32,
    #[description = "Reason"] reason: Option<String>,
) -> Result<(), Error> {
    decide(ctx, id, SuggestionStatus::Approved, reason).await
}

/// Deny a suggestion
#[poise::command(slash_command)]
pub async fn deny(
    ctx: Context<'_>,
    #[description = "Suggestion number"] id: u32,
    #[description = "Reason"] reason: Option<String>,
) -> Result<(), Error> {
    decide(ctx, id, SuggestionStatus::Denied, reason).await
}

/// Reads the 👍/👎 counts off the posted message, minus the bot's own.
async fn tally(ctx: Context<'_>, channel_id: u64, message_id: u64) -> Result<(u64, u64), Error> {
    let message = ChannelId::new(channel_id)
        .message(ctx.http(), MessageId::new(message_id))
        .await?;
    let mut votes = (0, 0);
    for reaction in &message.reactions {
        let ReactionType::Unicode(emoji) = &reaction.reaction_type else {
            continue;
        };
        if emoji == UPVOTE {
            votes.0 = vote_count(reaction.count, reaction.me);
        } else if emoji == DOWNVOTE {
            votes.1 = vote_count(reaction.count, reaction.me);
        }
    }
    Ok(votes)
}

async fn decide(
    ctx: Context<'_>,
    id: u32,
    status: SuggestionStatus,
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    ctx.defer().await?;

    let service = SuggestionService::new(ctx.data().db.clone());
    let board = service.board(guild_id.get()).await?;
    let Some(existing) = board.suggestions.get(&id).cloned() else {
        ctx.say(format!("❌ Suggestion #{} does not exist.", id)).await?;
        return Ok(());
    };
    if existing.status != SuggestionStatus::Pending {
        ctx.say(format!(
            "❌ Suggestion #{} was already {}.",
            id,
            existing.status.label().to_lowercase()
        ))
        .await?;
        return Ok(());
    }

    let votes = match existing.message_id {
        Some(message_id) => match tally(ctx, existing.channel_id, message_id).await {
            Ok(votes) => votes,
            Err(e) => {
                warn!("Could not tally suggestion #{}: {}", id, e);
                (0, 0)
            }
        },
        None => (0, 0),
    };

    let moderator_id = ctx.author().id.get();
    let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
    let decided = match service
        .update(guild_id.get(), move |b| {
            b.decide(id, status, reason, moderator_id, votes)
        })
        .await?
    {
        Ok(s) => s,
        Err(e) => {
            ctx.say(format!("❌ {}", e)).await?;
            return Ok(());
        }
    };

    if let Some(message_id) = decided.message_id {
        if let Err(e) = ChannelId::new(decided.channel_id)
            .edit_message(
                ctx.http(),
                MessageId::new(message_id),
                EditMessage::new().embed(suggestion_embed(&decided)),
            )
            .await
        {
            warn!("Could not update suggestion #{} message: {}", id, e);
        }
    }

    let server = ctx
        .guild()
        .map(|g| g.name.clone())
        .unwrap_or_else(|| "the server".to_string());
    let notice = CreateMessage::new().content(format!(
        "Your suggestion #{} in **{}** was {}.",
        id,
        server,
        decided.status.label().to_lowercase()
    ));
    if let Err(e) = UserId::new(decided.author_id)
        .direct_message(ctx.http(), notice)
        .await
    {
        warn!("Could not notify author of suggestion #{}: {}", id, e);
    }

    info!(
        "Suggestion #{} {} in guild {} ({} up / {} down)",
        id,
        decided.status.label(),
        guild_id,
        decided.votes_up,
        decided.votes_down
    );
    ctx.say(format!(
        "✅ Suggestion #{} {} ({} {} · {} {}).",
        id,
        decided.status.label().to_lowercase(),
        UPVOTE,
        decided.votes_up,
        DOWNVOTE,
        decided.votes_down
    ))
    .await?;
    Ok(())
}

/// List pending suggestions
#[poise::command(slash_command)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let board = SuggestionService::new(ctx.data().db.clone())
        .board(guild_id.get())
        .await?;

    let pending: Vec<_> = board.pending().collect();
    if pending.is_empty() {
        ctx.say("📭 No pending suggestions.").await?;
        return Ok(());
    }

    let lines = pending
        .iter()
        .take(MAX_LISTED)
        .map(|s| {
            let link = s
                .message_id
                .map(|m| {
                    format!(
                        " [jump](https://discord.com/channels/{}/{}/{})",
                        guild_id, s.channel_id, m
                    )
                })
                .unwrap_or_default();
            format!("`#{}` {} by <@{}>{}", s.id, truncate(&s.content, 80), s.author_id, link)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let embed = CreateEmbed::new()
        .title(format!("💡 Pending suggestions ({})", pending.len()))
        .description(truncate(&lines, DISCORD_EMBED_LIMIT))
        .color(SuggestionStatus::Pending.color());
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Set the suggestion channel
#[poise::command(slash_command)]
pub async fn channel(
    ctx: Context<'_>,
    #[description = "Channel for new suggestions"] channel: serenity::GuildChannel,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let channel_id = channel.id.get();
    SuggestionService::new(ctx.data().db.clone())
        .update(guild_id.get(), move |b| b.channel_id = Some(channel_id))
        .await?;
    ctx.say(format!("✅ Suggestions will be posted in <#{}>.", channel_id))
        .await?;
    Ok(())
}
