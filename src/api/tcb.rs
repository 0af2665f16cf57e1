//! TCB Scans has no API; chapters are scraped from the series page.

use super::{send_with_retry, ApiError, Chapter};
use crate::cache::SharedCache;
use scraper::{ElementRef, Html, Selector};
use tokio::time::Duration;
use tracing::debug;

const SERVICE: &str = "TCB Scans";
const PAGE_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct TcbSeries {
    pub title: String,
    pub chapters: Vec<Chapter>,
}

#[derive(Clone)]
pub struct TcbScraper {
    http: reqwest::Client,
    base_url: String,
    attempts: u32,
    cache: SharedCache<Vec<Chapter>>,
}

fn selector(css: &str) -> Result<Selector, ApiError> {
    Selector::parse(css).map_err(|e| ApiError::Parse {
        service: SERVICE,
        reason: format!("bad selector {}: {:?}", css, e),
    })
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Pulls the chapter number out of labels like "One Piece Chapter 1100".
fn chapter_number(label: &str) -> Option<String> {
    let lower = label.to_ascii_lowercase();
    let idx = lower.rfind("chapter")?;
    let rest = label[idx + "chapter".len()..].trim_start();
    let number: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let number = number.trim_end_matches('.');
    if number.is_empty() {
        None
    } else {
        Some(number.to_string())
    }
}

/// Parses a series page. Chapters come back in page order, newest first.
pub fn parse_series_page(html: &str, base_url: &str) -> Result<TcbSeries, ApiError> {
    let document = Html::parse_document(html);
    let title_sel = selector("h1")?;
    let link_sel = selector("a[href*=\"/chapters/\"]")?;
    let div_sel = selector("div")?;

    let title = document
        .select(&title_sel)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Parse {
            service: SERVICE,
            reason: "series page has no title".to_string(),
        })?;

    let mut chapters: Vec<Chapter> = Vec::new();
    for link in document.select(&link_sel) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let divs: Vec<String> = link.select(&div_sel).map(element_text).collect();
        let label = divs.first().cloned().unwrap_or_else(|| element_text(link));
        let Some(number) = chapter_number(&label) else {
            continue;
        };
        if chapters.iter().any(|c| c.number == number) {
            continue;
        }
        let url = if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{}{}", base_url.trim_end_matches('/'), href)
        };
        chapters.push(Chapter {
            number,
            title: divs.get(1).cloned().filter(|t| !t.is_empty()),
            url,
            published_at: None,
        });
    }

    Ok(TcbSeries { title, chapters })
}

impl TcbScraper {
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

    /// `slug` is the part after `/mangas/`, e.g. `5/one-piece`.
    pub async fn fetch_series(&self, slug: &str) -> Result<TcbSeries, ApiError> {
        let url = format!("{}/mangas/{}", self.base_url, slug.trim_matches('/'));
        let response = send_with_retry(SERVICE, self.attempts, || self.http.get(&url)).await?;
        let body = response.text().await?;
        parse_series_page(&body, &self.base_url)
    }

    pub async fn latest_chapters(&self, slug: &str) -> Result<Vec<Chapter>, ApiError> {
        let key = format!("tcb:{}", slug);
        if let Some(hit) = self.cache.get(&key) {
            debug!("TCB: cache hit for {}", key);
            return Ok(hit);
        }
        let series = self.fetch_series(slug).await?;
        self.cache.set_with_ttl(key, series.chapters.clone(), PAGE_TTL);
        Ok(series.chapters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <h1 class="my-3 font-bold text-3xl">One Piece</h1>
          <div class="grid">
            <a href="/chapters/7740/one-piece-chapter-1101" class="block border">
              <div class="text-lg font-bold">One Piece Chapter 1101</div>
              <div class="text-gray-500">Bonney's Journey</div>
            </a>
            <a href="/chapters/7733/one-piece-chapter-1100" class="block border">
              <div class="text-lg font-bold">One Piece Chapter 1100</div>
              <div class="text-gray-500"></div>
            </a>
            <a href="https://tcbscans.me/chapters/7700/one-piece-chapter-1099.5">
              <div>One Piece Chapter 1099.5</div>
            </a>
            <a href="/about">About</a>
          </div>
        </body></html>
    "#;

    #[test]
    fn test_chapter_number() {
        assert_eq!(chapter_number("One Piece Chapter 1100"), Some("1100".to_string()));
        assert_eq!(chapter_number("Jujutsu Kaisen chapter 250.5 "), Some("250.5".to_string()));
        assert_eq!(chapter_number("Chapter."), None);
        assert_eq!(chapter_number("Volume 3"), None);
    }

    #[test]
    fn test_parse_series_page() {
        let series = parse_series_page(PAGE, "https://tcbscans.me/").unwrap();
        assert_eq!(series.title, "One Piece");
        let numbers: Vec<_> = series.chapters.iter().map(|c| c.number.as_str()).collect();
        assert_eq!(numbers, vec!["1101", "1100", "1099.5"]);
        assert_eq!(series.chapters[0].title.as_deref(), Some("Bonney's Journey"));
        assert_eq!(series.chapters[1].title, None);
        assert_eq!(
            series.chapters[0].url,
            "https://tcbscans.me/chapters/7740/one-piece-chapter-1101"
        );
        assert_eq!(
            series.chapters[2].url,
            "https://tcbscans.me/chapters/7700/one-piece-chapter-1099.5"
        );
    }

    #[test]
    fn test_page_without_title_is_an_error() {
        assert!(parse_series_page("<html><body></body></html>", "https://x").is_err());
    }
}
