pub mod api;
pub mod cache;
pub mod commands;
pub mod config;
pub mod db;
pub mod events;
pub mod housekeeping;
pub mod llm;
pub mod manga;
pub mod qotd;
pub mod services;

use api::jikan::JikanClient;
use api::mangadex::MangaDexClient;
use api::paste::PasteClient;
use api::tcb::TcbScraper;
use housekeeping::ApiCaches;
use manga::source::ChapterSources;
use services::trivia::{QuestionBank, TriviaSessions};
use tracing::info;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub db: db::Database,
    pub caches: ApiCaches,
    pub jikan: JikanClient,
    pub sources: ChapterSources,
    pub paste: PasteClient,
    /// Present only when an API key is configured
    pub llm: Option<llm::LlmClient>,
    pub trivia: TriviaSessions,
    pub questions: QuestionBank,
}

impl Data {
    pub fn new(config: config::Config) -> anyhow::Result<Self> {
        let db = db::Database::new(&config)?;
        db.execute_init()?;

        let http = api::build_http_client(&config)?;
        let attempts = config.http_retry_attempts;
        let caches = ApiCaches::new(config.api_cache_max_size, config.api_cache_ttl());

        let jikan = JikanClient::new(http.clone(), &config.jikan_url, attempts, caches.jikan.clone());
        let sources = ChapterSources {
            mangadex: MangaDexClient::new(
                http.clone(),
                &config.mangadex_url,
                attempts,
                caches.chapters.clone(),
            ),
            tcb: TcbScraper::new(http.clone(), &config.tcb_url, attempts, caches.chapters.clone()),
        };
        let paste = PasteClient::new(http, &config.paste_url, attempts);

        let llm = llm::LlmClient::from_config(&config);
        if llm.is_none() {
            info!("OPENAI_API_KEY not set; trivia question generation disabled");
        }
        let questions = QuestionBank::load(&config.trivia_questions_path)?;

        Ok(Self {
            config,
            db,
            caches,
            jikan,
            sources,
            paste,
            llm,
            trivia: TriviaSessions::default(),
            questions,
        })
    }
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
