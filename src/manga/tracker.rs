use super::pattern::ReleasePattern;
use super::source::{ChapterSources, SeriesSource};
use crate::api::Chapter;
use crate::db::{Database, Scope};
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub const COG: &str = "manga";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedSeries {
    pub title: String,
    pub source: SeriesSource,
    pub series_id: String,
    pub last_chapter: Option<String>,
    pub pattern: ReleasePattern,
    pub last_checked: Option<DateTime<Utc>>,
    pub added_by: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MangaGuild {
    pub channel_id: Option<u64>,
    pub series: BTreeMap<String, TrackedSeries>,
}

pub fn series_key(source: SeriesSource, series_id: &str) -> String {
    match source {
        SeriesSource::MangaDex => series_id.to_string(),
        SeriesSource::Tcb => format!("tcb:{}", series_id),
    }
}

fn is_uuid(s: &str) -> bool {
    s.len() == 36
        && s.chars().enumerate().all(|(i, c)| match i {
            8 | 13 | 18 | 23 => c == '-',
            _ => c.is_ascii_hexdigit(),
        })
}

/// Recognizes `tcb:<slug>`, TCB and MangaDex URLs, and bare MangaDex ids.
/// Anything else is a title to search for.
pub fn parse_series_ref(input: &str) -> Option<(SeriesSource, String)> {
    let input = input.trim();
    if let Some(slug) = input.strip_prefix("tcb:") {
        let slug = slug.trim().trim_matches('/');
        return (!slug.is_empty()).then(|| (SeriesSource::Tcb, slug.to_string()));
    }
    if let Some((_, rest)) = input.split_once("/mangas/") {
        let slug = rest.trim_matches('/');
        return (!slug.is_empty()).then(|| (SeriesSource::Tcb, slug.to_string()));
    }
    if let Some((_, rest)) = input.split_once("mangadex.org/title/") {
        let id = rest.split('/').next().unwrap_or_default();
        return is_uuid(id).then(|| (SeriesSource::MangaDex, id.to_lowercase()));
    }
    is_uuid(input).then(|| (SeriesSource::MangaDex, input.to_lowercase()))
}

fn chapter_value(number: &str) -> Option<f64> {
    number.trim().parse::<f64>().ok()
}

impl TrackedSeries {
    pub fn new(title: String, source: SeriesSource, series_id: String, added_by: u64) -> Self {
        Self {
            title,
            source,
            series_id,
            last_chapter: None,
            pattern: ReleasePattern::default(),
            last_checked: None,
            added_by,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_checked {
            Some(last) => now - last >= self.pattern.check_frequency(now).interval(),
            None => true,
        }
    }

    /// Folds a fetched chapter list (newest first) into the history and
    /// returns the chapters worth announcing, oldest first. The first fetch
    /// only seeds history.
    pub fn apply_chapters(&mut self, chapters: &[Chapter], now: DateTime<Utc>) -> Vec<Chapter> {
        let seeding = self.last_chapter.is_none();
        let last_value = self.last_chapter.as_deref().and_then(chapter_value);
        let mut fresh = Vec::new();

        for chapter in chapters.iter().rev() {
            let newer = match (last_value, chapter_value(&chapter.number)) {
                (Some(last), Some(value)) => value > last,
                _ => !self
                    .pattern
                    .releases()
                    .iter()
                    .any(|r| r.chapter == chapter.number),
            };
            if !newer {
                continue;
            }

            if seeding {
                // Without a publish date the fetch time says nothing about
                // the schedule.
                if let Some(at) = chapter.published_at {
                    self.pattern.record(&chapter.number, at);
                }
                continue;
            }

            let released_at = chapter.published_at.unwrap_or(now);
            if self.pattern.record(&chapter.number, released_at) {
                fresh.push(chapter.clone());
            }
        }

        let newest = chapters
            .iter()
            .filter_map(|c| chapter_value(&c.number).map(|v| (v, c)))
            .max_by(|a, b| a.0.total_cmp(&b.0));
        match (newest, last_value) {
            (Some((value, chapter)), Some(last)) if value > last => {
                self.last_chapter = Some(chapter.number.clone());
            }
            (Some((_, chapter)), None) => {
                self.last_chapter = Some(chapter.number.clone());
            }
            (None, None) => {
                self.last_chapter = chapters.first().map(|c| c.number.clone());
            }
            _ => {}
        }

        self.last_checked = Some(now);
        fresh
    }
}

/// New chapters found for one series during a check.
#[derive(Debug, Clone)]
pub struct SeriesUpdate {
    pub key: String,
    pub title: String,
    pub chapters: Vec<Chapter>,
}

#[derive(Clone)]
pub struct TrackerService {
    db: Database,
    sources: ChapterSources,
}

impl TrackerService {
    pub fn new(db: Database, sources: ChapterSources) -> Self {
        Self { db, sources }
    }

    pub fn sources(&self) -> &ChapterSources {
        &self.sources
    }

    pub async fn guild(&self, guild_id: u64) -> anyhow::Result<MangaGuild> {
        self.db
            .run_blocking(move |db| db.load(COG, Scope::Guild(guild_id)))
            .await
    }

    pub async fn update<F, R>(&self, guild_id: u64, f: F) -> anyhow::Result<R>
    where
        F: FnOnce(&mut MangaGuild) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.db
            .run_blocking(move |db| db.update(COG, Scope::Guild(guild_id), f))
            .await
    }

    pub async fn guilds(&self) -> anyhow::Result<Vec<(u64, MangaGuild)>> {
        self.db
            .run_blocking(|db| db.list_guild_documents(COG))
            .await
    }

    /// Resolves `input` to a series, seeds its history and starts tracking it.
    pub async fn add(
        &self,
        guild_id: u64,
        input: &str,
        added_by: u64,
    ) -> anyhow::Result<TrackedSeries> {
        let (source, series_id) = match parse_series_ref(input) {
            Some(found) => found,
            None => {
                let results = self.sources.mangadex.search(input).await?;
                let first = results
                    .into_iter()
                    .next()
                    .ok_or_else(|| anyhow!("No MangaDex series matches \"{}\"", input))?;
                (SeriesSource::MangaDex, first.id)
            }
        };

        let key = series_key(source, &series_id);
        if self.guild(guild_id).await?.series.contains_key(&key) {
            return Err(anyhow!("That series is already tracked here"));
        }

        let client = self.sources.get(source);
        let title = client.series_title(&series_id).await?;
        let chapters = client.latest_chapters(&series_id).await?;

        let mut series = TrackedSeries::new(title, source, series_id, added_by);
        series.apply_chapters(&chapters, Utc::now());

        let stored = series.clone();
        self.update(guild_id, move |doc| {
            doc.series.insert(key, stored);
        })
        .await?;

        info!(
            "Tracking {} ({}) in guild {}",
            series.title,
            source.label(),
            guild_id
        );
        Ok(series)
    }

    /// Removes by key or case-insensitive title.
    pub async fn remove(&self, guild_id: u64, query: &str) -> anyhow::Result<Option<TrackedSeries>> {
        let query = query.trim().to_string();
        self.update(guild_id, move |doc| {
            let key = find_key(doc, &query)?;
            doc.series.remove(&key)
        })
        .await
    }

    /// Checks every due series of a guild (all of them when `force`).
    pub async fn check_guild(
        &self,
        guild_id: u64,
        now: DateTime<Utc>,
        force: bool,
    ) -> anyhow::Result<Vec<SeriesUpdate>> {
        let doc = self.guild(guild_id).await?;
        let mut updates = Vec::new();

        for (key, series) in doc.series {
            if !force && !series.is_due(now) {
                continue;
            }
            let chapters = match self
                .sources
                .get(series.source)
                .latest_chapters(&series.series_id)
                .await
            {
                Ok(chapters) => chapters,
                Err(e) => {
                    warn!("Manga: failed to fetch {} ({}): {}", series.title, key, e);
                    continue;
                }
            };

            let update_key = key.clone();
            let fresh = self
                .update(guild_id, move |doc| {
                    doc.series
                        .get_mut(&update_key)
                        .map(|s| s.apply_chapters(&chapters, now))
                        .unwrap_or_default()
                })
                .await?;

            debug!("Manga: {} has {} new chapter(s)", series.title, fresh.len());
            if !fresh.is_empty() {
                updates.push(SeriesUpdate {
                    key,
                    title: series.title,
                    chapters: fresh,
                });
            }
        }

        Ok(updates)
    }
}

pub fn find_key(doc: &MangaGuild, query: &str) -> Option<String> {
    if doc.series.contains_key(query) {
        return Some(query.to_string());
    }
    let lowered = query.to_lowercase();
    doc.series
        .iter()
        .find(|(_, s)| s.title.to_lowercase() == lowered)
        .map(|(k, _)| k.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn chapter(number: &str, published: Option<DateTime<Utc>>) -> Chapter {
        Chapter {
            number: number.to_string(),
            title: None,
            url: format!("https://example.org/{}", number),
            published_at: published,
        }
    }

    fn at(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 15, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_series_ref() {
        let id = "a1c7c817-4e59-43b7-9365-09675a149a6f";
        assert_eq!(
            parse_series_ref(id),
            Some((SeriesSource::MangaDex, id.to_string()))
        );
        assert_eq!(
            parse_series_ref(&format!("https://mangadex.org/title/{}/one-piece", id)),
            Some((SeriesSource::MangaDex, id.to_string()))
        );
        assert_eq!(
            parse_series_ref("tcb:5/one-piece"),
            Some((SeriesSource::Tcb, "5/one-piece".to_string()))
        );
        assert_eq!(
            parse_series_ref("https://tcbscans.me/mangas/5/one-piece/"),
            Some((SeriesSource::Tcb, "5/one-piece".to_string()))
        );
        assert_eq!(parse_series_ref("one piece"), None);
        assert_eq!(parse_series_ref("tcb:"), None);
    }

    #[test]
    fn test_first_fetch_seeds_without_announcing() {
        let mut series = TrackedSeries::new("OP".into(), SeriesSource::MangaDex, "x".into(), 1);
        let fresh = series.apply_chapters(
            &[chapter("3", Some(at(19))), chapter("2", Some(at(12))), chapter("1", Some(at(5)))],
            at(20),
        );
        assert!(fresh.is_empty());
        assert_eq!(series.last_chapter.as_deref(), Some("3"));
        assert_eq!(series.pattern.releases().len(), 3);
        assert_eq!(series.last_checked, Some(at(20)));
    }

    #[test]
    fn test_seeding_ignores_undated_chapters() {
        let mut series = TrackedSeries::new("OP".into(), SeriesSource::Tcb, "5/op".into(), 1);
        series.apply_chapters(&[chapter("1100", None), chapter("1099", None)], at(20));
        assert!(series.pattern.releases().is_empty());
        assert_eq!(series.last_chapter.as_deref(), Some("1100"));
    }

    #[test]
    fn test_new_chapters_are_announced_oldest_first() {
        let mut series = TrackedSeries::new("OP".into(), SeriesSource::MangaDex, "x".into(), 1);
        series.apply_chapters(&[chapter("2", Some(at(12))), chapter("1", Some(at(5)))], at(13));

        let fresh = series.apply_chapters(
            &[
                chapter("4", Some(at(26))),
                chapter("3", Some(at(19))),
                chapter("2", Some(at(12))),
            ],
            at(27),
        );
        let numbers: Vec<_> = fresh.iter().map(|c| c.number.as_str()).collect();
        assert_eq!(numbers, vec!["3", "4"]);
        assert_eq!(series.last_chapter.as_deref(), Some("4"));

        // Refetching the same list finds nothing new.
        let again = series.apply_chapters(&[chapter("4", Some(at(26)))], at(28));
        assert!(again.is_empty());
    }

    #[test]
    fn test_undated_new_chapter_uses_fetch_time() {
        let mut series = TrackedSeries::new("OP".into(), SeriesSource::Tcb, "5/op".into(), 1);
        series.apply_chapters(&[chapter("1100", None)], at(5));
        let fresh = series.apply_chapters(&[chapter("1101", None), chapter("1100", None)], at(12));
        assert_eq!(fresh.len(), 1);
        assert_eq!(series.pattern.last_release().unwrap().released_at, at(12));
    }

    #[test]
    fn test_is_due_follows_check_frequency() {
        let mut series = TrackedSeries::new("OP".into(), SeriesSource::MangaDex, "x".into(), 1);
        let now = at(10);
        assert!(series.is_due(now));
        series.last_checked = Some(now - Duration::hours(1));
        // No history: standard six hour cadence.
        assert!(!series.is_due(now));
        series.last_checked = Some(now - Duration::hours(6));
        assert!(series.is_due(now));
    }

    #[test]
    fn test_find_key_by_title() {
        let mut doc = MangaGuild::default();
        doc.series.insert(
            "tcb:5/op".into(),
            TrackedSeries::new("One Piece".into(), SeriesSource::Tcb, "5/op".into(), 1),
        );
        assert_eq!(find_key(&doc, "tcb:5/op").as_deref(), Some("tcb:5/op"));
        assert_eq!(find_key(&doc, "one piece").as_deref(), Some("tcb:5/op"));
        assert_eq!(find_key(&doc, "bleach"), None);
    }
}
