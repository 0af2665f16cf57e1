use crate::{Context, Error};
use poise::serenity_prelude::CreateEmbed;
use tracing::info;

/// Sweep expired cache entries and show cache usage (Owner only)
#[poise::command(slash_command, owners_only, hide_in_help)]
pub async fn cachestats(ctx: Context<'_>) -> Result<(), Error> {
    let caches = &ctx.data().caches;
    let removed = caches.clean_expired();

    let mut embed = CreateEmbed::new()
        .title("🗄️ Cache statistics")
        .description(format!("Evicted {} expired entries.", removed))
        .color(0x5865F2);
    for (name, stats) in caches.stats() {
        let lookups = stats.hits + stats.misses;
        let hit_rate = if lookups == 0 {
            "n/a".to_string()
        } else {
            format!("{:.0}%", stats.hits as f64 * 100.0 / lookups as f64)
        };
        embed = embed.field(
            name,
            format!(
                "{}/{} entries\n{} hits · {} misses ({})",
                stats.size, stats.capacity, stats.hits, stats.misses, hit_rate
            ),
            true,
        );
    }

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Shut down the bot (Owner only)
#[poise::command(slash_command, owners_only, hide_in_help)]
pub async fn shutdown(ctx: Context<'_>) -> Result<(), Error> {
    info!("Shutdown command received from owner: {}", ctx.author().name);
    ctx.say("👋 Shutting down...").await?;
    ctx.framework().shard_manager().shutdown_all().await;
    Ok(())
}
