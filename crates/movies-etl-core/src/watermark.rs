//! Watermarks and page cursors.
//!
//! A [`Watermark`] is the latest source modification timestamp known to be
//! fully reflected in the search index for one table. It is persisted as an
//! RFC 3339 string with microsecond precision, matching PostgreSQL
//! `timestamptz` resolution so that a value read back compares equal to the
//! column it came from.
//!
//! A [`PageCursor`] is the keyset position `(modified, id)` used to walk one
//! table inside a single tick. Keyset paging never skips rows that share a
//! timestamp, even when more of them exist than fit in one page.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::source::ChangedRow;

/// Seconds from the Unix epoch to `0001-01-01T00:00:00Z`.
const ORIGIN_UNIX_SECS: i64 = -62_135_596_800;

/// Timestamp-valued high-water mark for one tracked table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark(DateTime<Utc>);

impl Watermark {
    /// Wrap a timestamp, truncating it to microseconds.
    pub fn new(ts: DateTime<Utc>) -> Self {
        let micros = ts.nanosecond() / 1_000 * 1_000;
        Self(ts.with_nanosecond(micros).unwrap_or(ts))
    }

    /// The "beginning of time" used when a table has no checkpoint yet.
    pub fn origin() -> Self {
        Self(DateTime::from_timestamp(ORIGIN_UNIX_SECS, 0).unwrap_or(DateTime::<Utc>::MIN_UTC))
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for Watermark {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::new(ts)
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::Micros, true))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid watermark '{0}': expected an RFC 3339 timestamp")]
pub struct WatermarkParseError(String);

impl FromStr for Watermark {
    type Err = WatermarkParseError;

    /// Accepts RFC 3339, plus the `YYYY-MM-DD HH:MM:SS[.ffffff][+HH:MM]`
    /// form written by older state files. A value without an offset is UTC.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self::new(ts.with_timezone(&Utc)));
        }
        if let Ok(ts) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
            return Ok(Self::new(ts.with_timezone(&Utc)));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
            return Ok(Self::new(naive.and_utc()));
        }
        Err(WatermarkParseError(s.to_string()))
    }
}

impl Serialize for Watermark {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Watermark {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Keyset position inside one table walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub modified: Watermark,
    pub id: Uuid,
}

impl PageCursor {
    /// Cursor positioned after every row with `modified <= watermark`.
    pub fn after(watermark: Watermark) -> Self {
        Self {
            modified: watermark,
            id: Uuid::max(),
        }
    }

    /// Cursor positioned on the last row of a page.
    pub fn at(row: &ChangedRow) -> Self {
        Self {
            modified: row.modified,
            id: row.id,
        }
    }

    /// True when `row` sorts strictly after this cursor.
    pub fn precedes(&self, row: &ChangedRow) -> bool {
        (row.modified, row.id) > (self.modified, self.id)
    }
}

/// Watermark that may be committed once every row of `page` is indexed.
///
/// `page` must be sorted by `(modified, id)`. A short page is the tail of
/// the table, so its maximum is safe. A full page may end in the middle of a
/// run of equal timestamps, so only values strictly below its last timestamp
/// are safe; `None` means the page cannot advance the watermark at all.
pub fn committable_watermark(page: &[ChangedRow], page_size: usize) -> Option<Watermark> {
    let last = page.last()?.modified;
    if page.len() < page_size {
        return Some(last);
    }
    page.iter()
        .rev()
        .map(|row| row.modified)
        .find(|modified| *modified < last)
}
