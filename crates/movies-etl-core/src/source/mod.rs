//! Relational change source abstraction.
//!
//! The [`ChangeSource`] trait is the read-only contract the pipeline needs
//! from the relational store: a keyset range scan per table, a reverse-join
//! scan from dependency ids to film works, and the enrichment join.
//!
//! All scans return rows sorted by `(modified, id)` ascending and strictly
//! after the supplied cursor, at most `limit` of them.

pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::batch::TrackedTable;
use crate::error::StageError;
use crate::models::{FilmWork, FlatFilmWorkRow};
use crate::watermark::{PageCursor, Watermark};

/// Id and modification time of one changed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangedRow {
    pub id: Uuid,
    pub modified: Watermark,
}

/// Read access to the movies catalog.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Rows of `table` modified after `after`.
    async fn changed_since(
        &self,
        table: TrackedTable,
        after: PageCursor,
        limit: usize,
    ) -> Result<Vec<ChangedRow>, StageError>;

    /// Distinct film works linked to any of `ids` through `table`'s link
    /// table, positioned after `after` by the film work's own
    /// `(modified, id)`.
    async fn film_works_referencing(
        &self,
        table: TrackedTable,
        ids: &[Uuid],
        after: PageCursor,
        limit: usize,
    ) -> Result<Vec<ChangedRow>, StageError>;

    /// Film works for `ids` with genres and persons aggregated per film work.
    ///
    /// A film work without links comes back with empty collections; unknown
    /// ids are simply absent.
    async fn enrich(&self, ids: &[Uuid]) -> Result<Vec<FilmWork>, StageError>;

    /// Same join as [`enrich`](ChangeSource::enrich) without aggregation:
    /// one row per film work, person link and genre combination.
    async fn enrich_flat(&self, ids: &[Uuid]) -> Result<Vec<FlatFilmWorkRow>, StageError>;

    /// Cheap round trip used by health checks.
    async fn ping(&self) -> Result<(), StageError>;
}
