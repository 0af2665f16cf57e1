use super::truncate;
use crate::api::jikan::{JikanEntry, MediaKind};
use crate::api::ApiError;
use crate::config::DISCORD_MESSAGE_LIMIT;
use crate::{Context, Error};
use poise::serenity_prelude::{CreateEmbed, CreateEmbedFooter};
use tracing::debug;

const SYNOPSIS_CHARS: usize = 700;

/// Look up anime on MyAnimeList
#[poise::command(slash_command, subcommands("anime_search"))]
pub async fn anime(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Look up manga on MyAnimeList
#[poise::command(slash_command, subcommands("manga_search"))]
pub async fn manga(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Search anime by title
#[poise::command(slash_command, rename = "search")]
pub async fn anime_search(
    ctx: Context<'_>,
    #[description = "Title to search for"] query: String,
) -> Result<(), Error> {
    search(ctx, MediaKind::Anime, query).await
}

/// Search manga by title
#[poise::command(slash_command, rename = "search")]
pub async fn manga_search(
    ctx: Context<'_>,
    #[description = "Title to search for"] query: String,
) -> Result<(), Error> {
    search(ctx, MediaKind::Manga, query).await
}

async fn search(ctx: Context<'_>, kind: MediaKind, query: String) -> Result<(), Error> {
    let query = query.trim();
    if query.is_empty() {
        ctx.say("❌ Give me a title to search for.").await?;
        return Ok(());
    }
    ctx.defer().await?;

    let results = match ctx.data().jikan.search(kind, query).await {
        Ok(results) => results,
        Err(ApiError::NotFound(_)) => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    debug!("Jikan returned {} results for {:?}", results.len(), query);

    let Some(entry) = results.first() else {
        ctx.say(format!("📭 Nothing found for **{}**.", query)).await?;
        return Ok(());
    };

    let mut reply = poise::CreateReply::default().embed(entry_embed(kind, entry));
    if results.len() > 1 {
        let others = results[1..]
            .iter()
            .map(|e| format!("[{}]({})", e.title, e.url))
            .collect::<Vec<_>>()
            .join(" · ");
        reply = reply.content(truncate(&format!("Also: {}", others), DISCORD_MESSAGE_LIMIT));
    }
    ctx.send(reply).await?;
    Ok(())
}

fn entry_embed(kind: MediaKind, entry: &JikanEntry) -> CreateEmbed {
    let synopsis = entry
        .synopsis
        .as_deref()
        .map(|s| truncate(s, SYNOPSIS_CHARS))
        .unwrap_or_else(|| "No synopsis available.".to_string());

    let mut embed = CreateEmbed::new()
        .title(&entry.title)
        .url(&entry.url)
        .description(synopsis)
        .color(0x2E51A2)
        .footer(CreateEmbedFooter::new(format!("MyAnimeList #{}", entry.mal_id)));

    if let Some(english) = entry.title_english.as_deref().filter(|t| *t != entry.title) {
        embed = embed.field("English title", english, false);
    }
    if let Some(score) = entry.score {
        embed = embed.field("Score", format!("{:.2}", score), true);
    }
    if let Some(status) = &entry.status {
        embed = embed.field("Status", status, true);
    }
    match kind {
        MediaKind::Anime => {
            if let Some(episodes) = entry.episodes {
                embed = embed.field("Episodes", episodes.to_string(), true);
            }
        }
        MediaKind::Manga => {
            if let Some(chapters) = entry.chapters {
                embed = embed.field("Chapters", chapters.to_string(), true);
            }
            if let Some(volumes) = entry.volumes {
                embed = embed.field("Volumes", volumes.to_string(), true);
            }
        }
    }
    if let Some(image) = entry.image_url() {
        embed = embed.thumbnail(image);
    }
    embed
}
