//! Release-day heuristics for tracked series.
//!
//! Builds a weekday histogram and an average interval from past chapter
//! releases and uses them to guess when the next chapter lands and how
//! often the checker should poll the source.

use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Deltas at or beyond this many days are hiatuses, not a schedule.
const MAX_INTERVAL_DAYS: i64 = 90;
const MAX_HISTORY: usize = 50;
const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub chapter: String,
    pub released_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckFrequency {
    Priority,
    Frequent,
    Standard,
    Slow,
}

impl CheckFrequency {
    pub fn interval(self) -> Duration {
        match self {
            CheckFrequency::Priority => Duration::minutes(15),
            CheckFrequency::Frequent => Duration::hours(1),
            CheckFrequency::Standard => Duration::hours(6),
            CheckFrequency::Slow => Duration::hours(24),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CheckFrequency::Priority => "priority (every 15 minutes)",
            CheckFrequency::Frequent => "frequent (hourly)",
            CheckFrequency::Standard => "standard (every 6 hours)",
            CheckFrequency::Slow => "slow (daily)",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseEstimate {
    pub pattern_day: Weekday,
    pub confidence: f64,
    pub average_interval_days: Option<f64>,
    pub next_release: Option<DateTime<Utc>>,
}

/// Chronological release history for one series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleasePattern {
    releases: Vec<Release>,
}

impl ReleasePattern {
    pub fn new(mut releases: Vec<Release>) -> Self {
        releases.sort_by_key(|r| r.released_at);
        let mut pattern = Self { releases };
        pattern.trim();
        pattern
    }

    pub fn releases(&self) -> &[Release] {
        &self.releases
    }

    pub fn last_release(&self) -> Option<&Release> {
        self.releases.last()
    }

    /// Records a release, keeping history sorted. Returns false if the
    /// chapter was already known.
    pub fn record(&mut self, chapter: &str, released_at: DateTime<Utc>) -> bool {
        if self.releases.iter().any(|r| r.chapter == chapter) {
            return false;
        }
        let idx = self
            .releases
            .partition_point(|r| r.released_at <= released_at);
        self.releases.insert(
            idx,
            Release {
                chapter: chapter.to_string(),
                released_at,
            },
        );
        self.trim();
        true
    }

    fn trim(&mut self) {
        if self.releases.len() > MAX_HISTORY {
            let excess = self.releases.len() - MAX_HISTORY;
            self.releases.drain(..excess);
        }
    }

    /// Most common release weekday and the share of releases on it.
    pub fn weekday_confidence(&self) -> Option<(Weekday, f64)> {
        if self.releases.is_empty() {
            return None;
        }
        let mut counts = [0usize; 7];
        for release in &self.releases {
            counts[release.released_at.weekday().num_days_from_monday() as usize] += 1;
        }
        let mut best = 0;
        for (idx, count) in counts.iter().enumerate() {
            if *count > counts[best] {
                best = idx;
            }
        }
        let confidence = counts[best] as f64 / self.releases.len() as f64;
        Some((WEEKDAYS[best], confidence))
    }

    /// Mean of the whole-day gaps between consecutive releases. Same-day
    /// releases and hiatuses are left out.
    pub fn average_interval_days(&self) -> Option<f64> {
        let intervals: Vec<i64> = self
            .releases
            .windows(2)
            .map(|pair| (pair[1].released_at - pair[0].released_at).num_days())
            .filter(|days| *days > 0 && *days < MAX_INTERVAL_DAYS)
            .collect();
        if intervals.is_empty() {
            return None;
        }
        Some(intervals.iter().sum::<i64>() as f64 / intervals.len() as f64)
    }

    /// Returns `None` when the history is too thin to say anything.
    pub fn estimate(&self, now: DateTime<Utc>) -> Option<ReleaseEstimate> {
        if self.releases.len() < 2 {
            return None;
        }
        let (pattern_day, confidence) = self.weekday_confidence()?;
        let average_interval_days = self.average_interval_days();
        let last = self.releases.last()?.released_at;

        let next_release = if confidence > 0.5 {
            Some(next_weekday_after(last, pattern_day, now))
        } else {
            average_interval_days.map(|avg| last + Duration::days(avg.round() as i64))
        };

        if next_release.is_none() && average_interval_days.is_none() {
            return None;
        }

        Some(ReleaseEstimate {
            pattern_day,
            confidence,
            average_interval_days,
            next_release,
        })
    }

    pub fn check_frequency(&self, now: DateTime<Utc>) -> CheckFrequency {
        let Some(estimate) = self.estimate(now) else {
            return CheckFrequency::Standard;
        };

        if let Some(next) = estimate.next_release {
            if next > now && next - now <= Duration::hours(24) {
                return CheckFrequency::Priority;
            }
        }

        match estimate.average_interval_days {
            Some(avg) if avg <= 7.0 => CheckFrequency::Frequent,
            Some(avg) if avg <= 14.0 => CheckFrequency::Standard,
            Some(_) => CheckFrequency::Slow,
            None => CheckFrequency::Standard,
        }
    }
}

/// First occurrence of `day` strictly after `last`, pushed forward by whole
/// weeks until it is after `now`.
fn next_weekday_after(last: DateTime<Utc>, day: Weekday, now: DateTime<Utc>) -> DateTime<Utc> {
    let current = last.weekday().num_days_from_monday() as i64;
    let target = day.num_days_from_monday() as i64;
    let mut ahead = (target - current).rem_euclid(7);
    if ahead == 0 {
        ahead = 7;
    }
    let mut next = last + Duration::days(ahead);
    while next <= now {
        next += Duration::weeks(1);
    }
    next
}
