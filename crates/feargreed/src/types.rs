//! Core data types for sentiment readings and the persisted history log.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of readings retained in [`HistoryLog::history`].
pub const HISTORY_LIMIT: usize = 30;

/// Inclusive upper bound of a valid score.
pub const MAX_SCORE: u8 = 100;

/// A single extracted `(score, mood, timestamp)` tuple.
///
/// Field order is part of the on-disk format and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    /// Sentiment magnitude, canonical decimal text in `0..=100`.
    pub score: String,
    /// Lowercased mood label, `null` on disk when the page had none.
    pub mood: Option<String>,
    /// Extraction instant, `YYYY-MM-DDTHH:MM:SSZ`.
    pub timestamp: String,
}

impl Reading {
    /// Build a reading stamped at `at`, truncated to whole seconds.
    pub fn new(score: u8, mood: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            score: score.to_string(),
            mood,
            timestamp: format_timestamp(at),
        }
    }

    /// Numeric score, or `None` when the stored text is not a valid score.
    pub fn score_value(&self) -> Option<u8> {
        parse_score(&self.score)
    }

    /// A reading is valid iff its score parses into range. Mood is optional.
    pub fn is_valid(&self) -> bool {
        self.score_value().is_some()
    }

    /// Mood family of this reading, if it has a recognizable label.
    pub fn mood_family(&self) -> Option<MoodFamily> {
        self.mood.as_deref().and_then(MoodFamily::classify)
    }
}

/// Format an instant the way readings store it.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a score candidate.
///
/// The whole trimmed text must be an optionally `+`-signed run of ASCII
/// digits whose value lies in `0..=100`. Anything else (fractions, units,
/// dates, negative numbers) is rejected.
pub fn parse_score(text: &str) -> Option<u8> {
    let t = text.trim();
    let digits = t.strip_prefix('+').unwrap_or(t);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Strip leading zeros so long zero-padded runs don't overflow.
    let significant = digits.trim_start_matches('0');
    if significant.len() > 3 {
        return None;
    }
    let value: u16 = if significant.is_empty() {
        0
    } else {
        significant.parse().ok()?
    };
    if value <= MAX_SCORE as u16 {
        Some(value as u8)
    } else {
        None
    }
}

/// Broad category of a mood label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoodFamily {
    Fear,
    Greed,
    Neutral,
}

impl MoodFamily {
    /// Classify free text by lowercased substring match.
    pub fn classify(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        if lower.contains("fear") {
            Some(Self::Fear)
        } else if lower.contains("greed") {
            Some(Self::Greed)
        } else if lower.contains("neutral") {
            Some(Self::Neutral)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fear => "fear",
            Self::Greed => "greed",
            Self::Neutral => "neutral",
        }
    }
}

/// The persisted `{ current, history }` aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryLog {
    /// Most recently accepted reading.
    pub current: Option<Reading>,
    /// Oldest first, at most [`HISTORY_LIMIT`] entries.
    #[serde(default)]
    pub history: Vec<Reading>,
}

impl HistoryLog {
    /// The documented initial state: no current reading, empty history.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Record `reading` as current and append it, keeping the newest
    /// [`HISTORY_LIMIT`] entries.
    pub fn append(&mut self, reading: Reading) {
        self.append_with_limit(reading, HISTORY_LIMIT);
    }

    /// Same as [`append`](Self::append) with an explicit retention bound.
    pub fn append_with_limit(&mut self, reading: Reading, limit: usize) {
        self.current = Some(reading.clone());
        self.history.push(reading);
        self.truncate_to(limit);
    }

    /// Drop the oldest entries until at most `limit` remain.
    pub fn truncate_to(&mut self, limit: usize) {
        if self.history.len() > limit {
            let excess = self.history.len() - limit;
            self.history.drain(..excess);
        }
    }

    /// Number of readings in the history.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Bound respected and `current` mirrors the last history entry.
    pub fn is_consistent(&self) -> bool {
        if self.history.len() > HISTORY_LIMIT {
            return false;
        }
        match (&self.current, self.history.last()) {
            (Some(current), Some(last)) => current == last,
            _ => true,
        }
    }
}

/// Errors raised while persisting the history log.
///
/// Reading an existing log never produces one of these; see
/// [`HistoryStore::load`](crate::storage::HistoryStore::load).
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Could not lock {path}: {source}")]
    Lock {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Verification read failed: {0}")]
    VerifyRead(String),

    #[error("Verification mismatch: expected score {expected:?}, found {found:?}")]
    VerifyMismatch {
        expected: Option<String>,
        found: Option<String>,
    },
}

/// Convenience result type.
pub type StoreResult<T> = Result<T, StoreError>;
