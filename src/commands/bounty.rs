use crate::services::bounty::{format_berries, title_for, BountyService, HuntOutcome};
use crate::{Context, Error};
use poise::serenity_prelude::{CreateEmbed, User};
use rand::Rng;
use tracing::info;

fn service(ctx: Context<'_>) -> BountyService {
    BountyService::new(
        ctx.data().db.clone(),
        ctx.data().config.bounty_hunt_cooldown,
    )
}

/// Pirate bounties
#[poise::command(
    slash_command,
    subcommands("show", "hunt", "leaderboard", "set"),
    guild_only
)]
pub async fn bounty(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show a bounty poster
#[poise::command(slash_command)]
pub async fn show(
    ctx: Context<'_>,
    #[description = "Pirate (defaults to you)"] member: Option<User>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let user = member.as_ref().unwrap_or_else(|| ctx.author());
    let profile = service(ctx).profile(guild_id.get(), user.id.get()).await?;

    let mut embed = CreateEmbed::new()
        .title("WANTED")
        .description(format!("**{}**\n*{}*", user.name, title_for(profile.bounty)))
        .field("Bounty", format!("฿{}", format_berries(profile.bounty)), true)
        .field("Hunts", profile.hunts.to_string(), true)
        .color(0xC27C0E);
    if let Some(avatar) = user.avatar_url() {
        embed = embed.thumbnail(avatar);
    }
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Go hunting to raise your bounty
#[poise::command(slash_command)]
pub async fn hunt(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let roll: f64 = rand::thread_rng().gen();
    let outcome = service(ctx)
        .hunt(guild_id.get(), ctx.author().id.get(), roll)
        .await?;

    match outcome {
        HuntOutcome::Success { gained, total } => {
            info!("{} hunted for {} berries in guild {}", ctx.author().id, gained, guild_id);
            ctx.say(format!(
                "🏴‍☠️ Your exploits raised your bounty by **฿{}**! It now stands at **฿{}** ({}).",
                format_berries(gained),
                format_berries(total),
                title_for(total)
            ))
            .await?;
        }
        HuntOutcome::Cooldown { remaining } => {
            let secs = remaining.num_seconds().max(1) as u64;
            ctx.say(format!(
                "⏳ The Marines are still on your trail. Try again in **{}**.",
                humantime::format_duration(std::time::Duration::from_secs(secs))
            ))
            .await?;
        }
    }
    Ok(())
}

/// Most wanted pirates
#[poise::command(slash_command)]
pub async fn leaderboard(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let rows = service(ctx).leaderboard(guild_id.get(), 10).await?;
    if rows.is_empty() {
        ctx.say("📭 No bounties yet. Try `/bounty hunt`.").await?;
        return Ok(());
    }

    let lines = rows
        .iter()
        .enumerate()
        .map(|(i, (user, p))| {
            format!(
                "**{}.** <@{}>: ฿{} · {}",
                i + 1,
                user,
                format_berries(p.bounty),
                title_for(p.bounty)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let embed = CreateEmbed::new()
        .title("🏴‍☠️ Most Wanted")
        .description(lines)
        .color(0xC27C0E);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Set a member's bounty (Admin)
#[poise::command(slash_command, required_permissions = "MANAGE_GUILD")]
pub async fn set(
    ctx: Context<'_>,
    #[description = "Pirate"] member: User,
    #[description = "New bounty in berries"] amount: u64,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    service(ctx)
        .set_bounty(guild_id.get(), member.id.get(), amount)
        .await?;
    info!(
        "{} set bounty of {} to {} in guild {}",
        ctx.author().id,
        member.id,
        amount,
        guild_id
    );
    ctx.say(format!(
        "✅ **{}** now has a bounty of **฿{}**.",
        member.name,
        format_berries(amount)
    ))
    .await?;
    Ok(())
}
