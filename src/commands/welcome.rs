use crate::events::{guild_summary, send_welcome};
use crate::services::welcome::{render, WelcomeService, WelcomeVars, MAX_TEMPLATE_CHARS};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;

/// Configure welcome messages
#[poise::command(
    slash_command,
    subcommands("channel", "message", "toggle", "dm", "test", "show"),
    required_permissions = "MANAGE_GUILD",
    guild_only
)]
pub async fn welcome(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Set the channel welcome messages are posted in
#[poise::command(slash_command)]
pub async fn channel(
    ctx: Context<'_>,
    #[description = "Welcome channel"] channel: serenity::GuildChannel,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let channel_id = channel.id.get();
    WelcomeService::new(ctx.data().db.clone())
        .update(guild_id.get(), move |s| s.channel_id = Some(channel_id))
        .await?;
    ctx.say(format!("✅ Welcome messages will be posted in <#{}>.", channel_id))
        .await?;
    Ok(())
}

/// Set the welcome template ({user}, {mention}, {server}, {count})
#[poise::command(slash_command)]
pub async fn message(
    ctx: Context<'_>,
    #[description = "Template text"] template: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let template = template.trim().to_string();
    if template.is_empty() || template.chars().count() > MAX_TEMPLATE_CHARS {
        ctx.say(format!(
            "❌ The template must be 1-{} characters.",
            MAX_TEMPLATE_CHARS
        ))
        .await?;
        return Ok(());
    }
    WelcomeService::new(ctx.data().db.clone())
        .update(guild_id.get(), move |s| s.template = template)
        .await?;
    ctx.say("✅ Welcome message updated.").await?;
    Ok(())
}

/// Turn welcome messages on or off
#[poise::command(slash_command)]
pub async fn toggle(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let enabled = WelcomeService::new(ctx.data().db.clone())
        .update(guild_id.get(), |s| {
            s.enabled = !s.enabled;
            s.enabled
        })
        .await?;
    if enabled {
        ctx.say("✅ Welcome messages enabled.").await?;
    } else {
        ctx.say("✅ Welcome messages disabled.").await?;
    }
    Ok(())
}

/// Send welcomes by direct message instead of in the channel
#[poise::command(slash_command)]
pub async fn dm(
    ctx: Context<'_>,
    #[description = "Send by DM"] enabled: bool,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    WelcomeService::new(ctx.data().db.clone())
        .update(guild_id.get(), move |s| s.dm = enabled)
        .await?;
    let target = if enabled { "by DM" } else { "in the welcome channel" };
    ctx.say(format!("✅ Welcomes will be sent {}.", target)).await?;
    Ok(())
}

/// Send the welcome message for yourself
#[poise::command(slash_command)]
pub async fn test(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let settings = WelcomeService::new(ctx.data().db.clone())
        .settings(guild_id.get())
        .await?;
    if !settings.dm && settings.channel_id.is_none() {
        ctx.say("❌ Set a welcome channel first.").await?;
        return Ok(());
    }

    let (server, member_count) = guild_summary(ctx.serenity_context(), guild_id);
    let author = ctx.author();
    let text = render(
        &settings.template,
        &WelcomeVars {
            user_name: &author.name,
            user_id: author.id.get(),
            server: &server,
            member_count,
        },
    );
    send_welcome(ctx.serenity_context(), &settings, author, text).await?;
    ctx.say("✅ Test welcome sent.").await?;
    Ok(())
}

/// Show the current welcome settings
#[poise::command(slash_command)]
pub async fn show(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let settings = WelcomeService::new(ctx.data().db.clone())
        .settings(guild_id.get())
        .await?;

    let embed = serenity::CreateEmbed::new()
        .title("👋 Welcome Settings")
        .field("Enabled", if settings.enabled { "yes" } else { "no" }, true)
        .field(
            "Channel",
            settings
                .channel_id
                .map(|c| format!("<#{}>", c))
                .unwrap_or_else(|| "not set".to_string()),
            true,
        )
        .field("Delivery", if settings.dm { "DM" } else { "channel" }, true)
        .field("Template", format!("```\n{}\n```", settings.template), false)
        .color(0x57F287);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}
