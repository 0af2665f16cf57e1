use crate::services::suggestions::{is_vote_emoji, SuggestionService};
use crate::services::welcome::{render, WelcomeService, WelcomeSettings, WelcomeVars};
use crate::Data;
use poise::serenity_prelude as serenity;
use serenity::{
    ChannelId, CreateAllowedMentions, CreateMessage, FullEvent, GuildId, Member, Reaction,
    ReactionType, User,
};
use tracing::{debug, error, info};

pub async fn handle(ctx: &serenity::Context, event: &FullEvent, data: &Data) {
    let result = match event {
        FullEvent::Ready { data_about_bot } => {
            info!("Connected as {}", data_about_bot.user.name);
            Ok(())
        }
        FullEvent::GuildMemberAddition { new_member } => {
            on_member_join(ctx, data, new_member).await
        }
        FullEvent::ReactionAdd { add_reaction } => on_reaction_add(ctx, data, add_reaction).await,
        _ => Ok(()),
    };

    if let Err(e) = result {
        error!("Event handler for {} failed: {}", event.snake_case_name(), e);
    }
}

/// Guild name and member count from the cache, when the guild is cached.
pub fn guild_summary(ctx: &serenity::Context, guild_id: GuildId) -> (String, Option<u64>) {
    guild_id
        .to_guild_cached(&ctx.cache)
        .map(|g| (g.name.clone(), Some(g.member_count)))
        .unwrap_or_else(|| ("the server".to_string(), None))
}

async fn on_member_join(
    ctx: &serenity::Context,
    data: &Data,
    member: &Member,
) -> anyhow::Result<()> {
    if member.user.bot {
        return Ok(());
    }
    let guild_id = member.guild_id;
    let settings = WelcomeService::new(data.db.clone())
        .settings(guild_id.get())
        .await?;
    if !settings.enabled {
        return Ok(());
    }

    let (server, member_count) = guild_summary(ctx, guild_id);
    let text = render(
        &settings.template,
        &WelcomeVars {
            user_name: &member.user.name,
            user_id: member.user.id.get(),
            server: &server,
            member_count,
        },
    );
    send_welcome(ctx, &settings, &member.user, text).await
}

/// Delivers a rendered welcome by DM or to the welcome channel.
pub async fn send_welcome(
    ctx: &serenity::Context,
    settings: &WelcomeSettings,
    user: &User,
    text: String,
) -> anyhow::Result<()> {
    let builder = CreateMessage::new()
        .content(text)
        .allowed_mentions(CreateAllowedMentions::new().users(vec![user.id]));

    if settings.dm {
        user.direct_message(ctx, builder).await?;
        debug!("Sent welcome DM to {}", user.id);
        return Ok(());
    }

    match settings.channel_id {
        Some(channel_id) => {
            ChannelId::new(channel_id)
                .send_message(&ctx.http, builder)
                .await?;
            debug!("Welcomed {} in channel {}", user.id, channel_id);
        }
        None => debug!("Welcome enabled without a channel; skipping {}", user.id),
    }
    Ok(())
}

async fn on_reaction_add(
    ctx: &serenity::Context,
    data: &Data,
    reaction: &Reaction,
) -> anyhow::Result<()> {
    let (Some(guild_id), Some(user_id)) = (reaction.guild_id, reaction.user_id) else {
        return Ok(());
    };
    if user_id == ctx.cache.current_user().id {
        return Ok(());
    }
    let ReactionType::Unicode(emoji) = &reaction.emoji else {
        return Ok(());
    };
    if !is_vote_emoji(emoji) {
        return Ok(());
    }

    let board = SuggestionService::new(data.db.clone())
        .board(guild_id.get())
        .await?;
    if board.is_self_vote(reaction.message_id.get(), user_id.get()) {
        reaction.delete(ctx).await?;
        debug!(
            "Removed self-vote by {} on message {}",
            user_id, reaction.message_id
        );
    }
    Ok(())
}
