use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Deserialize)]
pub struct Config {
    pub discord_token: String,
    pub owner_id: Option<u64>,
    pub database_url: String,
    pub status_message: String,
    pub dev_guild_id: Option<u64>,
    pub register_commands: bool,

    // OpenAI-compatible completion endpoint (trivia generation)
    pub openai_api_key: Option<String>,
    pub openai_url: String,
    pub openai_model: String,

    // Outbound APIs
    pub jikan_url: String,
    pub mangadex_url: String,
    pub tcb_url: String,
    pub paste_url: String,
    pub http_timeout_secs: u64,
    pub http_retry_attempts: u32,

    // Response memoization
    pub api_cache_ttl_secs: u64,
    pub api_cache_max_size: usize,
    pub cache_cleanup_interval_secs: u64,

    // Background tasks
    pub manga_check_interval_secs: u64,
    pub qotd_tick_secs: u64,

    // Cog defaults
    pub trivia_questions_path: String,
    pub trivia_question_timeout_secs: u64,
    pub warning_expiry_days: u32,
    pub bounty_hunt_cooldown: Duration,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        let bounty_hunt_cooldown = match env::var("BOUNTY_HUNT_COOLDOWN") {
            Ok(raw) => humantime::parse_duration(raw.trim()).map_err(|e| {
                anyhow::anyhow!("BOUNTY_HUNT_COOLDOWN must be a duration like 6h: {}", e)
            })?,
            Err(_) => Duration::from_secs(6 * 3600),
        };

        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            owner_id: env::var("OWNER_ID").ok().and_then(|id| id.parse().ok()),
            database_url: env_string("DATABASE_URL", "data/cogbot.db"),
            status_message: env_string("STATUS_MESSAGE", "Watching the seas"),
            dev_guild_id: env::var("DEV_GUILD_ID").ok().and_then(|id| id.parse().ok()),
            register_commands: env_or("REGISTER_COMMANDS", false),

            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            openai_url: env_string("OPENAI_URL", "https://api.openai.com/v1"),
            openai_model: env_string("OPENAI_MODEL", "gpt-4o-mini"),

            jikan_url: env_string("JIKAN_URL", "https://api.jikan.moe/v4"),
            mangadex_url: env_string("MANGADEX_URL", "https://api.mangadex.org"),
            tcb_url: env_string("TCB_URL", "https://tcbscans.me"),
            paste_url: env_string("PASTE_URL", "https://paste.rs"),
            http_timeout_secs: env_or("HTTP_TIMEOUT_SECS", 30),
            http_retry_attempts: env_or("HTTP_RETRY_ATTEMPTS", 3),

            api_cache_ttl_secs: env_or("API_CACHE_TTL_SECS", 3600),
            api_cache_max_size: env_or("API_CACHE_MAX_SIZE", 500),
            cache_cleanup_interval_secs: env_or("CACHE_CLEANUP_INTERVAL_SECS", 600),

            manga_check_interval_secs: env_or("MANGA_CHECK_INTERVAL_SECS", 900),
            qotd_tick_secs: env_or("QOTD_TICK_SECS", 60),

            trivia_questions_path: env_string("TRIVIA_QUESTIONS_PATH", "trivia.toml"),
            trivia_question_timeout_secs: env_or("TRIVIA_QUESTION_TIMEOUT_SECS", 20),
            warning_expiry_days: env_or("WARNING_EXPIRY_DAYS", 30),
            bounty_hunt_cooldown,
        })
    }

    pub fn api_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.api_cache_ttl_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("owner_id", &self.owner_id)
            .field("database_url", &self.database_url)
            .field("status_message", &self.status_message)
            .field("dev_guild_id", &self.dev_guild_id)
            .field("register_commands", &self.register_commands)
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("openai_url", &self.openai_url)
            .field("openai_model", &self.openai_model)
            .field("jikan_url", &self.jikan_url)
            .field("mangadex_url", &self.mangadex_url)
            .field("tcb_url", &self.tcb_url)
            .field("paste_url", &self.paste_url)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("http_retry_attempts", &self.http_retry_attempts)
            .field("api_cache_ttl_secs", &self.api_cache_ttl_secs)
            .field("api_cache_max_size", &self.api_cache_max_size)
            .field(
                "cache_cleanup_interval_secs",
                &self.cache_cleanup_interval_secs,
            )
            .field("manga_check_interval_secs", &self.manga_check_interval_secs)
            .field("qotd_tick_secs", &self.qotd_tick_secs)
            .field("trivia_questions_path", &self.trivia_questions_path)
            .field(
                "trivia_question_timeout_secs",
                &self.trivia_question_timeout_secs,
            )
            .field("warning_expiry_days", &self.warning_expiry_days)
            .field("bounty_hunt_cooldown", &self.bounty_hunt_cooldown)
            .finish()
    }
}

/// Discord message limit is 2000 characters
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;
/// Embed description limit is 4096 characters
pub const DISCORD_EMBED_LIMIT: usize = 4096;

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_config_logic() {
        // 1. Missing token
        env::remove_var("DISCORD_TOKEN");
        assert!(Config::build().is_err(), "Should fail without DISCORD_TOKEN");

        // 2. Defaults
        env::set_var("DISCORD_TOKEN", "test_token");
        let config = Config::build().unwrap();
        assert_eq!(config.discord_token, "test_token");
        assert_eq!(config.api_cache_max_size, 500);
        assert_eq!(config.bounty_hunt_cooldown, Duration::from_secs(6 * 3600));

        // 3. Overrides, including humantime durations
        env::set_var("BOUNTY_HUNT_COOLDOWN", "90m");
        env::set_var("API_CACHE_MAX_SIZE", "not a number");
        let config = Config::build().unwrap();
        assert_eq!(config.bounty_hunt_cooldown, Duration::from_secs(90 * 60));
        assert_eq!(config.api_cache_max_size, 500);

        env::set_var("BOUNTY_HUNT_COOLDOWN", "soon");
        assert!(Config::build().is_err());
        env::remove_var("BOUNTY_HUNT_COOLDOWN");

        // 4. Debug redaction
        env::set_var("OPENAI_API_KEY", "secret_api_key");
        let debug_output = format!("{:?}", Config::build().unwrap());
        assert!(!debug_output.contains("test_token"));
        assert!(!debug_output.contains("secret_api_key"));
        assert!(debug_output.contains("[REDACTED]"));

        // Cleanup
        env::remove_var("DISCORD_TOKEN");
        env::remove_var("API_CACHE_MAX_SIZE");
        env::remove_var("OPENAI_API_KEY");
    }
}
