//! MangaDex lookups: series metadata and the English chapter feed.

use super::{send_with_retry, ApiError, Chapter};
use crate::cache::SharedCache;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::time::Duration;
use tracing::debug;

const SERVICE: &str = "MangaDex";
const FEED_LIMIT: &str = "20";
/// Feeds go stale faster than search results.
const FEED_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct MangaInfo {
    pub id: String,
    pub title: String,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MangaAttributes {
    title: HashMap<String, String>,
    #[serde(rename = "altTitles", default)]
    alt_titles: Vec<HashMap<String, String>>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MangaData {
    id: String,
    attributes: MangaAttributes,
}

#[derive(Debug, Deserialize)]
struct MangaResponse {
    data: MangaData,
}

#[derive(Debug, Deserialize)]
struct MangaListResponse {
    data: Vec<MangaData>,
}

#[derive(Debug, Deserialize)]
struct ChapterAttributes {
    chapter: Option<String>,
    title: Option<String>,
    #[serde(rename = "publishAt")]
    publish_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ChapterData {
    id: String,
    attributes: ChapterAttributes,
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    data: Vec<ChapterData>,
}

impl From<MangaData> for MangaInfo {
    fn from(data: MangaData) -> Self {
        let attrs = data.attributes;
        let title = attrs
            .title
            .get("en")
            .or_else(|| attrs.alt_titles.iter().find_map(|t| t.get("en")))
            .or_else(|| attrs.title.values().next())
            .cloned()
            .unwrap_or_else(|| data.id.clone());
        MangaInfo {
            id: data.id,
            title,
            status: attrs.status,
        }
    }
}

fn feed_into_chapters(feed: FeedResponse) -> Vec<Chapter> {
    feed.data
        .into_iter()
        .filter_map(|c| {
            // Oneshots have no chapter number and are not tracked.
            let number = c.attributes.chapter?;
            Some(Chapter {
                url: format!("https://mangadex.org/chapter/{}", c.id),
                number,
                title: c.attributes.title.filter(|t| !t.trim().is_empty()),
                published_at: c.attributes.publish_at,
            })
        })
        .collect()
}

#[derive(Clone)]
pub struct MangaDexClient {
    http: reqwest::Client,
    base_url: String,
    attempts: u32,
    cache: SharedCache<Vec<Chapter>>,
}

impl MangaDexClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        attempts: u32,
        cache: SharedCache<Vec<Chapter>>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            attempts,
            cache,
        }
    }

    pub fn cache(&self) -> &SharedCache<Vec<Chapter>> {
        &self.cache
    }

    pub async fn get_manga(&self, id: &str) -> Result<MangaInfo, ApiError> {
        let url = format!("{}/manga/{}", self.base_url, id);
        let response = send_with_retry(SERVICE, self.attempts, || self.http.get(&url))
            .await
            .map_err(|e| match e {
                ApiError::NotFound(_) => ApiError::NotFound(format!("MangaDex series {}", id)),
                other => other,
            })?;
        let body: MangaResponse = response.json().await?;
        Ok(body.data.into())
    }

    pub async fn search(&self, title: &str) -> Result<Vec<MangaInfo>, ApiError> {
        let url = format!("{}/manga", self.base_url);
        let response = send_with_retry(SERVICE, self.attempts, || {
            self.http
                .get(&url)
                .query(&[("title", title), ("limit", "5")])
        })
        .await?;
        let body: MangaListResponse = response.json().await?;
        Ok(body.data.into_iter().map(MangaInfo::from).collect())
    }

    /// Newest English chapters first.
    pub async fn latest_chapters(&self, id: &str) -> Result<Vec<Chapter>, ApiError> {
        let key = format!("mangadex:feed:{}", id);
        if let Some(hit) = self.cache.get(&key) {
            debug!("MangaDex: cache hit for {}", key);
            return Ok(hit);
        }

        let url = format!("{}/manga/{}/feed", self.base_url, id);
        let response = send_with_retry(SERVICE, self.attempts, || {
            self.http.get(&url).query(&[
                ("translatedLanguage[]", "en"),
                ("order[publishAt]", "desc"),
                ("limit", FEED_LIMIT),
            ])
        })
        .await?;

        let feed: FeedResponse = response.json().await?;
        let chapters = feed_into_chapters(feed);
        self.cache.set_with_ttl(key, chapters.clone(), FEED_TTL);
        Ok(chapters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manga_title_prefers_english() {
        let json = r#"{"data": {
            "id": "a1c7c817-4e59-43b7-9365-09675a149a6f",
            "attributes": {
                "title": {"ja-ro": "Wan Pisu"},
                "altTitles": [{"ja": "ワンピース"}, {"en": "One Piece"}],
                "status": "ongoing"
            }
        }}"#;
        let parsed: MangaResponse = serde_json::from_str(json).unwrap();
        let info = MangaInfo::from(parsed.data);
        assert_eq!(info.title, "One Piece");
        assert_eq!(info.status.as_deref(), Some("ongoing"));
    }

    #[test]
    fn test_feed_skips_oneshots() {
        let json = r#"{"data": [
            {"id": "c1", "attributes": {"chapter": "1101", "title": "", "publishAt": "2024-01-05T15:00:00+00:00"}},
            {"id": "c2", "attributes": {"chapter": null, "title": "Extra", "publishAt": "2024-01-04T15:00:00+00:00"}}
        ]}"#;
        let feed: FeedResponse = serde_json::from_str(json).unwrap();
        let chapters = feed_into_chapters(feed);
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].number, "1101");
        assert_eq!(chapters[0].title, None);
        assert_eq!(chapters[0].url, "https://mangadex.org/chapter/c1");
        assert!(chapters[0].published_at.is_some());
    }

    fn client(server: &mockito::Server) -> MangaDexClient {
        let cache = SharedCache::new(10, Duration::from_secs(60));
        MangaDexClient::new(reqwest::Client::new(), &server.url(), 1, cache)
    }

    #[tokio::test]
    async fn test_feed_is_cached_between_checks() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/manga/op/feed")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data": [{"id": "c1", "attributes": {"chapter": "1101", "title": null, "publishAt": "2024-01-05T15:00:00+00:00"}}]}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let client = client(&server);
        let first = client.latest_chapters("op").await.unwrap();
        let second = client.latest_chapters("op").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second[0].number, "1101");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_series_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/manga/nope")
            .with_status(404)
            .create_async()
            .await;

        let err = client(&server).get_manga("nope").await.unwrap_err();
        match err {
            ApiError::NotFound(what) => assert_eq!(what, "MangaDex series nope"),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }
}
