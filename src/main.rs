use cogbot::commands::{self, truncate};
use cogbot::config::{Config, DISCORD_MESSAGE_LIMIT};
use cogbot::manga::{MangaChecker, TrackerService};
use cogbot::qotd::QotdDispatcher;
use cogbot::services::qotd::QotdService;
use cogbot::{events, housekeeping, Data, Error};
use poise::serenity_prelude as serenity;
use std::collections::HashSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            error!("Failed to start bot: {}", error);
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!("Command /{} failed: {}", ctx.command().qualified_name, error);
            let message = truncate(&format!("❌ Something went wrong: {}", error), DISCORD_MESSAGE_LIMIT);
            if let Err(e) = ctx.say(message).await {
                warn!("Could not report command error: {}", e);
            }
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration: {:?}", config);
    let discord_token = config.discord_token.clone();
    let owners: HashSet<serenity::UserId> =
        config.owner_id.map(serenity::UserId::new).into_iter().collect();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            owners,
            on_error: |error| Box::pin(on_error(error)),
            event_handler: |ctx, event, _framework, data| {
                Box::pin(async move {
                    events::handle(ctx, event, data).await;
                    Ok(())
                })
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                info!("Bot is ready!");
                let commands = &framework.options().commands;
                match config.dev_guild_id {
                    Some(guild_id) => {
                        poise::builtins::register_in_guild(
                            ctx,
                            commands,
                            serenity::GuildId::new(guild_id),
                        )
                        .await?;
                        info!("Registered commands in dev guild {}", guild_id);
                    }
                    None if config.register_commands => {
                        poise::builtins::register_globally(ctx, commands).await?;
                        info!("Registered commands globally");
                    }
                    None => {}
                }

                ctx.set_activity(Some(serenity::ActivityData::custom(&config.status_message)));

                let data = Data::new(config)?;

                let tracker = TrackerService::new(data.db.clone(), data.sources.clone());
                tokio::spawn(
                    MangaChecker::new(
                        tracker,
                        ctx.http.clone(),
                        data.config.manga_check_interval_secs,
                    )
                    .run(),
                );
                tokio::spawn(
                    QotdDispatcher::new(
                        QotdService::new(data.db.clone()),
                        ctx.http.clone(),
                        data.config.qotd_tick_secs,
                    )
                    .run(),
                );
                tokio::spawn(housekeeping::start_cache_cleanup_task(
                    data.caches.clone(),
                    data.config.cache_cleanup_interval_secs,
                ));

                Ok(data)
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MESSAGE_REACTIONS;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
