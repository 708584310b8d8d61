//! Tracked tables and the typed batch records passed between stages.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::FilmWork;
use crate::sink::IndexDocument;
use crate::watermark::Watermark;

/// A source table whose changes are followed by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedTable {
    Genre,
    Person,
    FilmWork,
}

impl TrackedTable {
    /// Processing order used when the configuration does not name one.
    pub const ALL: [TrackedTable; 3] = [
        TrackedTable::Genre,
        TrackedTable::Person,
        TrackedTable::FilmWork,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            TrackedTable::Genre => "genre",
            TrackedTable::Person => "person",
            TrackedTable::FilmWork => "film_work",
        }
    }

    /// The root table owns index documents; the others are dependencies.
    pub fn is_root(&self) -> bool {
        matches!(self, TrackedTable::FilmWork)
    }

    /// Link table and foreign-key column joining a dependency to film works.
    pub fn link(&self) -> Option<(&'static str, &'static str)> {
        match self {
            TrackedTable::Genre => Some(("genre_film_work", "genre_id")),
            TrackedTable::Person => Some(("person_film_work", "person_id")),
            TrackedTable::FilmWork => None,
        }
    }
}

impl fmt::Display for TrackedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.table_name())
    }
}

impl FromStr for TrackedTable {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "genre" => Ok(TrackedTable::Genre),
            "person" => Ok(TrackedTable::Person),
            "film_work" => Ok(TrackedTable::FilmWork),
            other => anyhow::bail!(
                "Unknown table: '{}'. Must be genre, person, or film_work.",
                other
            ),
        }
    }
}

/// One page of changed rows from the change extractor.
#[derive(Debug, Clone)]
pub struct ChangeBatch {
    pub table: TrackedTable,
    pub ids: Vec<Uuid>,
    /// Maximum modification time observed in the page.
    pub watermark: Watermark,
    /// What the table checkpoint may be advanced to once the page is indexed.
    pub committable: Option<Watermark>,
}

/// Root-entity ids that must be re-derived.
#[derive(Debug, Clone)]
pub struct RootBatch {
    pub source_table: TrackedTable,
    pub ids: Vec<Uuid>,
    pub watermark: Watermark,
}

#[derive(Debug, Clone)]
pub struct EnrichedBatch {
    pub source_table: TrackedTable,
    pub film_works: Vec<FilmWork>,
    pub watermark: Watermark,
}

#[derive(Debug, Clone)]
pub struct DocumentBatch {
    pub source_table: TrackedTable,
    pub documents: Vec<IndexDocument>,
    pub watermark: Watermark,
}
