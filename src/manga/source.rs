use crate::api::mangadex::MangaDexClient;
use crate::api::tcb::TcbScraper;
use crate::api::{ApiError, Chapter};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeriesSource {
    MangaDex,
    Tcb,
}

impl SeriesSource {
    pub fn label(self) -> &'static str {
        match self {
            SeriesSource::MangaDex => "MangaDex",
            SeriesSource::Tcb => "TCB Scans",
        }
    }
}

/// Anything that can list the newest chapters of a series.
#[async_trait]
pub trait ChapterSource: Send + Sync {
    async fn series_title(&self, series_id: &str) -> Result<String, ApiError>;

    /// Newest chapters first.
    async fn latest_chapters(&self, series_id: &str) -> Result<Vec<Chapter>, ApiError>;
}

#[async_trait]
impl ChapterSource for MangaDexClient {
    async fn series_title(&self, series_id: &str) -> Result<String, ApiError> {
        Ok(self.get_manga(series_id).await?.title)
    }

    async fn latest_chapters(&self, series_id: &str) -> Result<Vec<Chapter>, ApiError> {
        MangaDexClient::latest_chapters(self, series_id).await
    }
}

#[async_trait]
impl ChapterSource for TcbScraper {
    async fn series_title(&self, series_id: &str) -> Result<String, ApiError> {
        Ok(self.fetch_series(series_id).await?.title)
    }

    async fn latest_chapters(&self, series_id: &str) -> Result<Vec<Chapter>, ApiError> {
        TcbScraper::latest_chapters(self, series_id).await
    }
}

#[derive(Clone)]
pub struct ChapterSources {
    pub mangadex: MangaDexClient,
    pub tcb: TcbScraper,
}

impl ChapterSources {
    pub fn get(&self, source: SeriesSource) -> &dyn ChapterSource {
        match source {
            SeriesSource::MangaDex => &self.mangadex,
            SeriesSource::Tcb => &self.tcb,
        }
    }
}
