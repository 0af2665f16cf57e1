//! Minimal Jikan (MyAnimeList) search client.

use super::{send_with_retry, ApiError};
use crate::cache::SharedCache;
use serde::Deserialize;
use tracing::debug;

const SERVICE: &str = "Jikan";
const SEARCH_LIMIT: &str = "5";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Anime,
    Manga,
}

impl MediaKind {
    fn path(self) -> &'static str {
        match self {
            MediaKind::Anime => "anime",
            MediaKind::Manga => "manga",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JikanImage {
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JikanImages {
    pub jpg: Option<JikanImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JikanEntry {
    pub mal_id: u64,
    pub url: String,
    pub title: String,
    pub title_english: Option<String>,
    pub synopsis: Option<String>,
    pub score: Option<f64>,
    pub status: Option<String>,
    pub episodes: Option<u32>,
    pub chapters: Option<u32>,
    pub volumes: Option<u32>,
    pub images: Option<JikanImages>,
}

impl JikanEntry {
    pub fn image_url(&self) -> Option<&str> {
        self.images
            .as_ref()
            .and_then(|i| i.jpg.as_ref())
            .and_then(|j| j.image_url.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    data: Vec<JikanEntry>,
}

#[derive(Clone)]
pub struct JikanClient {
    http: reqwest::Client,
    base_url: String,
    attempts: u32,
    cache: SharedCache<Vec<JikanEntry>>,
}

impl JikanClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        attempts: u32,
        cache: SharedCache<Vec<JikanEntry>>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            attempts,
            cache,
        }
    }

    pub fn cache(&self) -> &SharedCache<Vec<JikanEntry>> {
        &self.cache
    }

    pub async fn search(&self, kind: MediaKind, query: &str) -> Result<Vec<JikanEntry>, ApiError> {
        let key = cache_key(kind, query);
        if let Some(hit) = self.cache.get(&key) {
            debug!("Jikan: cache hit for {}", key);
            return Ok(hit);
        }

        let url = format!("{}/{}", self.base_url, kind.path());
        let response = send_with_retry(SERVICE, self.attempts, || {
            self.http
                .get(&url)
                .query(&[("q", query), ("limit", SEARCH_LIMIT), ("sfw", "true")])
        })
        .await?;

        let body: SearchResponse = response.json().await?;
        self.cache.set(key, body.data.clone());
        Ok(body.data)
    }
}

fn cache_key(kind: MediaKind, query: &str) -> String {
    let normalized = query.split_whitespace().collect::<Vec<_>>().join(" ");
    format!("{}:{}", kind.path(), normalized.to_lowercase())
}
