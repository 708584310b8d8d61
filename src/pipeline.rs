//! Per-table pipeline: extract → resolve → enrich → transform → load.
//!
//! Each stage is a small struct with one typed input and one typed output
//! batch. [`Pipeline::run_table`] chains them synchronously for one tracked
//! table:
//!
//! ```text
//! checkpoint ──▶ ChangeExtractor ──ChangeBatch──▶ RootResolver ──RootBatch──▶
//!     Enricher ──EnrichedBatch──▶ Transformer ──DocumentBatch──▶ Loader
//! ```
//!
//! The table checkpoint is advanced once per change page, and only after
//! every root batch derived from that page has been accepted by the sink.
//! A fatal error anywhere stops the run for that table without touching its
//! checkpoint.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use movies_etl_core::checkpoint::CheckpointStore;
use movies_etl_core::retry::RetryPolicy;
use movies_etl_core::sink::SearchSink;
use movies_etl_core::source::ChangeSource;
use movies_etl_core::transform::{group_flat_rows, to_index_documents};
use movies_etl_core::watermark::committable_watermark;
use movies_etl_core::{
    ChangeBatch, DocumentBatch, EnrichedBatch, PageCursor, RootBatch, StageError, TrackedTable,
    Watermark,
};

use crate::config::{Aggregation, Config};
use crate::retry::with_backoff;

/// Where a table run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Extracting,
    Resolving,
    Enriching,
    Transforming,
    Loading,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Extracting => "extracting",
            PipelineState::Resolving => "resolving",
            PipelineState::Enriching => "enriching",
            PipelineState::Transforming => "transforming",
            PipelineState::Loading => "loading",
        };
        f.pad(name)
    }
}

/// Cursor before every row, including rows stamped with the origin itself.
fn cursor_at_start() -> PageCursor {
    PageCursor {
        modified: Watermark::origin(),
        id: Uuid::nil(),
    }
}

pub struct ChangeExtractor {
    source: Arc<dyn ChangeSource>,
    policy: RetryPolicy,
    page_size: usize,
}

impl ChangeExtractor {
    /// Next page of changed rows after `after` with the cursor on its last
    /// row, or `None` once the table is exhausted.
    pub async fn extract(
        &self,
        table: TrackedTable,
        after: PageCursor,
    ) -> Result<Option<(ChangeBatch, PageCursor)>, StageError> {
        let operation = format!("extract {}", table);
        let rows = with_backoff(&self.policy, &operation, || {
            self.source.changed_since(table, after, self.page_size)
        })
        .await?;

        let Some(last) = rows.last() else {
            return Ok(None);
        };
        let batch = ChangeBatch {
            table,
            ids: rows.iter().map(|row| row.id).collect(),
            watermark: last.modified,
            committable: committable_watermark(&rows, self.page_size),
        };
        Ok(Some((batch, PageCursor::at(last))))
    }
}

pub struct RootResolver {
    source: Arc<dyn ChangeSource>,
    policy: RetryPolicy,
    page_size: usize,
}

impl RootResolver {
    /// Root table changes are their own roots.
    pub fn identity(&self, batch: &ChangeBatch) -> RootBatch {
        RootBatch {
            source_table: batch.table,
            ids: batch.ids.clone(),
            watermark: batch.watermark,
        }
    }

    /// One page of film works referencing the ids of a dependency batch,
    /// with the cursor on its last row unless the page is empty.
    pub async fn resolve(
        &self,
        batch: &ChangeBatch,
        after: PageCursor,
    ) -> Result<(RootBatch, Option<PageCursor>), StageError> {
        let operation = format!("resolve {}", batch.table);
        let rows = with_backoff(&self.policy, &operation, || {
            self.source
                .film_works_referencing(batch.table, &batch.ids, after, self.page_size)
        })
        .await?;

        let roots = RootBatch {
            source_table: batch.table,
            ids: rows.iter().map(|row| row.id).collect(),
            watermark: rows.last().map_or(after.modified, |row| row.modified),
        };
        Ok((roots, rows.last().map(PageCursor::at)))
    }
}

pub struct Enricher {
    source: Arc<dyn ChangeSource>,
    policy: RetryPolicy,
    aggregation: Aggregation,
}

impl Enricher {
    pub async fn enrich(&self, roots: &RootBatch) -> Result<EnrichedBatch, StageError> {
        let film_works = match self.aggregation {
            Aggregation::Server => {
                with_backoff(&self.policy, "enrich", || self.source.enrich(&roots.ids)).await?
            }
            Aggregation::Client => {
                let rows = with_backoff(&self.policy, "enrich", || {
                    self.source.enrich_flat(&roots.ids)
                })
                .await?;
                group_flat_rows(&rows)
            }
        };
        Ok(EnrichedBatch {
            source_table: roots.source_table,
            film_works,
            watermark: roots.watermark,
        })
    }
}

pub struct Transformer {
    index: String,
}

impl Transformer {
    pub fn transform(&self, batch: &EnrichedBatch) -> Result<DocumentBatch, StageError> {
        Ok(DocumentBatch {
            source_table: batch.source_table,
            documents: to_index_documents(&batch.film_works, &self.index)?,
            watermark: batch.watermark,
        })
    }
}

pub struct Loader {
    sink: Arc<dyn SearchSink>,
    policy: RetryPolicy,
}

impl Loader {
    /// Upsert the whole batch in one bulk request, retrying it as a unit.
    pub async fn load(&self, batch: &DocumentBatch) -> Result<(), StageError> {
        if batch.documents.is_empty() {
            return Ok(());
        }
        with_backoff(&self.policy, "load", || {
            self.sink.bulk_upsert(&batch.documents)
        })
        .await
    }
}

/// Tunables shared by every stage.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub page_size: usize,
    pub index: String,
    pub aggregation: Aggregation,
    pub retry: RetryPolicy,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_size: config.etl.page_size,
            index: config.elastic.index.clone(),
            aggregation: config.etl.aggregation,
            retry: config.retry.policy(),
        }
    }
}

/// Why a table run stopped early.
#[derive(Debug)]
pub struct TableFailure {
    pub table: TrackedTable,
    /// Checkpoint the run started from; it was not advanced past the failed page.
    pub started_from: Watermark,
    pub state: PipelineState,
    /// Size of the batch being processed when the error surfaced.
    pub batch_size: usize,
    pub error: StageError,
}

#[derive(Debug)]
pub enum TableOutcome {
    Synced {
        table: TrackedTable,
        pages: usize,
        documents: usize,
        /// Last watermark written during this run, if any.
        watermark: Option<Watermark>,
    },
    Failed(TableFailure),
}

impl TableOutcome {
    pub fn table(&self) -> TrackedTable {
        match self {
            TableOutcome::Synced { table, .. } => *table,
            TableOutcome::Failed(failure) => failure.table,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TableOutcome::Failed(_))
    }
}

#[derive(Default)]
struct Progress {
    state: PipelineState,
    batch_size: usize,
    pages: usize,
    documents: usize,
    watermark: Option<Watermark>,
}

impl Progress {
    fn enter(&mut self, state: PipelineState, batch_size: usize) {
        self.state = state;
        self.batch_size = batch_size;
    }
}

pub struct Pipeline {
    extractor: ChangeExtractor,
    resolver: RootResolver,
    enricher: Enricher,
    transformer: Transformer,
    loader: Loader,
    checkpoints: Arc<dyn CheckpointStore>,
    page_size: usize,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn ChangeSource>,
        sink: Arc<dyn SearchSink>,
        checkpoints: Arc<dyn CheckpointStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            extractor: ChangeExtractor {
                source: source.clone(),
                policy: settings.retry.clone(),
                page_size: settings.page_size,
            },
            resolver: RootResolver {
                source: source.clone(),
                policy: settings.retry.clone(),
                page_size: settings.page_size,
            },
            enricher: Enricher {
                source,
                policy: settings.retry.clone(),
                aggregation: settings.aggregation,
            },
            transformer: Transformer {
                index: settings.index,
            },
            loader: Loader {
                sink,
                policy: settings.retry,
            },
            checkpoints,
            page_size: settings.page_size,
        }
    }

    /// Bring the index up to date with every change to `table` since its
    /// checkpoint.
    pub async fn run_table(&self, table: TrackedTable) -> TableOutcome {
        let mut progress = Progress::default();

        let started_from = match self.checkpoints.get(table.table_name()).await {
            Ok(watermark) => watermark.unwrap_or_else(Watermark::origin),
            Err(e) => {
                let error = StageError::fatal(e).context("reading checkpoint");
                tracing::error!(%table, error = %error, "Table run aborted");
                return TableOutcome::Failed(TableFailure {
                    table,
                    started_from: Watermark::origin(),
                    state: PipelineState::Idle,
                    batch_size: 0,
                    error,
                });
            }
        };

        tracing::debug!(%table, watermark = %started_from, "Table run started");
        match self.walk(table, started_from, &mut progress).await {
            Ok(()) => {
                if progress.documents > 0 {
                    tracing::info!(
                        %table,
                        pages = progress.pages,
                        documents = progress.documents,
                        watermark = ?progress.watermark.map(|w| w.to_string()),
                        "Table synced"
                    );
                }
                TableOutcome::Synced {
                    table,
                    pages: progress.pages,
                    documents: progress.documents,
                    watermark: progress.watermark,
                }
            }
            Err(error) => {
                tracing::error!(
                    %table,
                    watermark = %started_from,
                    stage = %progress.state,
                    batch_size = progress.batch_size,
                    error = %error,
                    "Table run aborted"
                );
                TableOutcome::Failed(TableFailure {
                    table,
                    started_from,
                    state: progress.state,
                    batch_size: progress.batch_size,
                    error,
                })
            }
        }
    }

    async fn walk(
        &self,
        table: TrackedTable,
        start: Watermark,
        progress: &mut Progress,
    ) -> Result<(), StageError> {
        let mut cursor = PageCursor::after(start);
        // Maximum of the previous page when it was full and could not commit it.
        let mut tail: Option<Watermark> = None;
        loop {
            progress.enter(PipelineState::Extracting, 0);
            let Some((batch, next)) = self.extractor.extract(table, cursor).await? else {
                // Nothing sorts after the previous page, so none of its rows
                // can tie with a row still to come.
                if let Some(watermark) = tail {
                    self.commit(table, watermark, progress).await?;
                }
                break;
            };
            progress.pages += 1;
            let full = batch.ids.len() >= self.page_size;

            progress.documents += self.propagate(&batch, progress).await?;

            if let Some(watermark) = batch.committable {
                self.commit(table, watermark, progress).await?;
            }

            progress.enter(PipelineState::Idle, 0);
            if !full {
                break;
            }
            tail = Some(batch.watermark);
            cursor = next;
        }
        Ok(())
    }

    async fn commit(
        &self,
        table: TrackedTable,
        watermark: Watermark,
        progress: &mut Progress,
    ) -> Result<(), StageError> {
        let advanced = self
            .checkpoints
            .advance(table.table_name(), watermark)
            .await
            .map_err(|e| StageError::fatal(e).context("writing checkpoint"))?;
        if advanced {
            tracing::debug!(%table, watermark = %watermark, "Checkpoint advanced");
            progress.watermark = Some(watermark);
        }
        Ok(())
    }

    /// Push one change page through to the index. Returns the number of
    /// documents written.
    async fn propagate(
        &self,
        batch: &ChangeBatch,
        progress: &mut Progress,
    ) -> Result<usize, StageError> {
        progress.enter(PipelineState::Resolving, batch.ids.len());
        if batch.table.is_root() {
            let roots = self.resolver.identity(batch);
            return self.derive(&roots, progress).await;
        }

        let mut documents = 0;
        let mut cursor = cursor_at_start();
        loop {
            progress.enter(PipelineState::Resolving, batch.ids.len());
            let (roots, next) = self.resolver.resolve(batch, cursor).await?;
            let Some(next) = next else {
                break;
            };
            let full = roots.ids.len() >= self.page_size;
            tracing::debug!(
                table = %batch.table,
                changed = batch.ids.len(),
                roots = roots.ids.len(),
                "Resolved film works"
            );
            documents += self.derive(&roots, progress).await?;
            if !full {
                break;
            }
            cursor = next;
        }
        Ok(documents)
    }

    /// Enrich, transform and load one root batch.
    async fn derive(&self, roots: &RootBatch, progress: &mut Progress) -> Result<usize, StageError> {
        if roots.ids.is_empty() {
            return Ok(0);
        }
        progress.enter(PipelineState::Enriching, roots.ids.len());
        let enriched = self.enricher.enrich(roots).await?;

        progress.enter(PipelineState::Transforming, enriched.film_works.len());
        let documents = self.transformer.transform(&enriched)?;

        progress.enter(PipelineState::Loading, documents.documents.len());
        self.loader.load(&documents).await?;
        Ok(documents.documents.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use movies_etl_core::checkpoint::memory::InMemoryCheckpoints;
    use movies_etl_core::models::{Genre, Person};
    use movies_etl_core::sink::memory::InMemoryIndex;
    use movies_etl_core::source::memory::{FailureKind, FilmWorkRecord, InMemorySource, SourceOp};
    use std::collections::HashSet;
    use std::time::Duration;

    fn ts(secs: i64) -> Watermark {
        Watermark::new(Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap())
    }

    fn film_work(id: u128, title: &str, modified: Watermark) -> FilmWorkRecord {
        FilmWorkRecord {
            id: Uuid::from_u128(id),
            title: title.into(),
            description: None,
            rating: None,
            kind: Some("movie".into()),
            creation_date: None,
            modified,
        }
    }

    fn settings(page_size: usize, aggregation: Aggregation) -> PipelineSettings {
        PipelineSettings {
            page_size,
            index: "movies".into(),
            aggregation,
            retry: RetryPolicy {
                base_delay: Duration::from_millis(10),
                multiplier: 2.0,
                max_delay: Duration::from_millis(100),
                max_attempts: None,
            },
        }
    }

    struct Harness {
        source: Arc<InMemorySource>,
        index: Arc<InMemoryIndex>,
        checkpoints: Arc<InMemoryCheckpoints>,
        pipeline: Pipeline,
    }

    fn harness(page_size: usize, aggregation: Aggregation) -> Harness {
        let source = Arc::new(InMemorySource::new());
        let index = Arc::new(InMemoryIndex::new());
        let checkpoints = Arc::new(InMemoryCheckpoints::new());
        let pipeline = Pipeline::new(
            source.clone(),
            index.clone(),
            checkpoints.clone(),
            settings(page_size, aggregation),
        );
        Harness {
            source,
            index,
            checkpoints,
            pipeline,
        }
    }

    fn document(index: &InMemoryIndex, id: u128) -> serde_json::Value {
        let raw = index
            .document("movies", &Uuid::from_u128(id).to_string())
            .expect("document indexed");
        serde_json::from_str(&raw).unwrap()
    }

    /// Seeds "Arrival" (modified at T1) linked to "Sci-Fi" (modified at T0).
    fn seed_arrival(source: &InMemorySource) -> (Watermark, Watermark) {
        let t0 = ts(0);
        let t1 = ts(60);
        source.upsert_film_work(film_work(1, "Arrival", t1));
        source.upsert_genre(
            Genre {
                id: Uuid::from_u128(100),
                name: "Sci-Fi".into(),
                description: None,
            },
            t0,
        );
        source.link_genre(Uuid::from_u128(1), Uuid::from_u128(100));
        (t0, t1)
    }

    #[tokio::test]
    async fn genre_change_reindexes_linked_film_work() {
        let h = harness(500, Aggregation::Server);
        let (t0, _) = seed_arrival(&h.source);
        h.checkpoints
            .set("genre", Watermark::new(t0.timestamp() - ChronoDuration::microseconds(1)))
            .await
            .unwrap();

        let outcome = h.pipeline.run_table(TrackedTable::Genre).await;

        assert!(!outcome.is_failed(), "{outcome:?}");
        assert_eq!(h.source.calls(SourceOp::FilmWorksReferencing), 1);
        let doc = document(&h.index, 1);
        assert_eq!(doc["title"], "Arrival");
        assert_eq!(doc["genre"], serde_json::json!(["Sci-Fi"]));
        assert_eq!(doc["actors"], serde_json::json!([]));
        assert_eq!(doc["writers"], serde_json::json!([]));
        assert_eq!(doc["directors"], serde_json::json!([]));
        assert_eq!(h.checkpoints.get("genre").await.unwrap(), Some(t0));
        assert_eq!(h.checkpoints.get("film_work").await.unwrap(), None);
    }

    #[tokio::test]
    async fn failed_load_leaves_checkpoint_untouched() {
        let h = harness(500, Aggregation::Server);
        let (t0, _) = seed_arrival(&h.source);
        h.index.fail_next_bulk([FailureKind::Fatal]);

        let outcome = h.pipeline.run_table(TrackedTable::Genre).await;
        match outcome {
            TableOutcome::Failed(failure) => {
                assert_eq!(failure.table, TrackedTable::Genre);
                assert_eq!(failure.state, PipelineState::Loading);
                assert_eq!(failure.batch_size, 1);
                assert_eq!(failure.started_from, Watermark::origin());
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(h.checkpoints.get("genre").await.unwrap(), None);
        assert_eq!(h.index.document_count("movies"), 0);

        // The next tick picks the same change up again.
        let outcome = h.pipeline.run_table(TrackedTable::Genre).await;
        assert!(!outcome.is_failed());
        assert_eq!(h.checkpoints.get("genre").await.unwrap(), Some(t0));
        assert_eq!(h.index.document_count("movies"), 1);
    }

    #[tokio::test]
    async fn fifteen_hundred_rows_take_three_pages() {
        let h = harness(500, Aggregation::Server);
        for i in 0..1500u128 {
            h.source
                .upsert_film_work(film_work(i + 1, &format!("Film {i}"), ts(i as i64)));
        }

        let outcome = h.pipeline.run_table(TrackedTable::FilmWork).await;

        match outcome {
            TableOutcome::Synced {
                pages, documents, ..
            } => {
                assert_eq!(pages, 3);
                assert_eq!(documents, 1500);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        // Three pages, then one empty read after the last full page.
        assert_eq!(h.source.calls(SourceOp::ChangedSince), 4);
        assert_eq!(h.index.bulk_calls(), 3);
        assert_eq!(h.index.document_count("movies"), 1500);
        assert_eq!(h.checkpoints.get("film_work").await.unwrap(), Some(ts(1499)));
    }

    #[tokio::test]
    async fn extracted_cursor_sits_on_the_last_row_of_the_page() {
        let h = harness(2, Aggregation::Server);
        h.source.upsert_film_work(film_work(1, "A", ts(1)));
        h.source.upsert_film_work(film_work(3, "C", ts(2)));
        h.source.upsert_film_work(film_work(2, "B", ts(2)));

        let extractor = &h.pipeline.extractor;
        let (first, cursor) = extractor
            .extract(TrackedTable::FilmWork, PageCursor::after(Watermark::origin()))
            .await
            .unwrap()
            .expect("first page");
        assert_eq!(first.ids, vec![Uuid::from_u128(1), Uuid::from_u128(2)]);
        assert_eq!(
            cursor,
            PageCursor {
                modified: ts(2),
                id: Uuid::from_u128(2),
            }
        );

        let (second, cursor) = extractor
            .extract(TrackedTable::FilmWork, cursor)
            .await
            .unwrap()
            .expect("second page");
        assert_eq!(second.ids, vec![Uuid::from_u128(3)]);
        assert_eq!(cursor.id, Uuid::from_u128(3));
        assert!(extractor
            .extract(TrackedTable::FilmWork, cursor)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn resolved_cursor_is_absent_once_no_film_work_remains() {
        let h = harness(500, Aggregation::Server);
        seed_arrival(&h.source);
        let (batch, _) = h
            .pipeline
            .extractor
            .extract(TrackedTable::Genre, PageCursor::after(Watermark::origin()))
            .await
            .unwrap()
            .expect("genre page");

        let (roots, next) = h
            .pipeline
            .resolver
            .resolve(&batch, cursor_at_start())
            .await
            .unwrap();
        assert_eq!(roots.ids, vec![Uuid::from_u128(1)]);
        let next = next.expect("cursor on Arrival");
        assert_eq!(next.id, Uuid::from_u128(1));
        assert_eq!(next.modified, ts(60));

        let (roots, next) = h.pipeline.resolver.resolve(&batch, next).await.unwrap();
        assert!(roots.ids.is_empty());
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn rows_sharing_a_timestamp_across_pages_are_not_lost() {
        let h = harness(2, Aggregation::Server);
        // Five rows, three of them tied on the page boundary.
        h.source.upsert_film_work(film_work(1, "A", ts(1)));
        h.source.upsert_film_work(film_work(2, "B", ts(2)));
        h.source.upsert_film_work(film_work(3, "C", ts(2)));
        h.source.upsert_film_work(film_work(4, "D", ts(2)));
        h.source.upsert_film_work(film_work(5, "E", ts(3)));

        let outcome = h.pipeline.run_table(TrackedTable::FilmWork).await;

        assert!(!outcome.is_failed());
        assert_eq!(h.index.document_count("movies"), 5);
        assert_eq!(h.checkpoints.get("film_work").await.unwrap(), Some(ts(3)));
    }

    #[tokio::test]
    async fn full_page_of_ties_commits_once_the_table_is_exhausted() {
        let h = harness(2, Aggregation::Server);
        h.source.upsert_film_work(film_work(1, "A", ts(5)));
        h.source.upsert_film_work(film_work(2, "B", ts(5)));

        h.pipeline.run_table(TrackedTable::FilmWork).await;
        assert_eq!(h.index.document_count("movies"), 2);
        assert_eq!(h.checkpoints.get("film_work").await.unwrap(), Some(ts(5)));

        h.source.upsert_film_work(film_work(3, "C", ts(6)));
        h.pipeline.run_table(TrackedTable::FilmWork).await;
        assert_eq!(h.index.bulk_calls(), 2);
        assert_eq!(h.index.document_count("movies"), 3);
        assert_eq!(h.checkpoints.get("film_work").await.unwrap(), Some(ts(6)));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_source_failures_are_retried() {
        let h = harness(500, Aggregation::Server);
        seed_arrival(&h.source);
        h.source.fail_next(
            SourceOp::ChangedSince,
            [FailureKind::Transient, FailureKind::Transient],
        );
        h.index.fail_next_bulk([FailureKind::Transient]);

        let outcome = h.pipeline.run_table(TrackedTable::FilmWork).await;

        assert!(!outcome.is_failed(), "{outcome:?}");
        assert_eq!(h.source.calls(SourceOp::ChangedSince), 3);
        assert_eq!(h.index.bulk_calls(), 2);
        assert_eq!(h.index.document_count("movies"), 1);
    }

    #[tokio::test]
    async fn fatal_source_error_aborts_without_checkpoint() {
        let h = harness(500, Aggregation::Server);
        seed_arrival(&h.source);
        h.source.fail_next(SourceOp::Enrich, [FailureKind::Fatal]);

        let outcome = h.pipeline.run_table(TrackedTable::FilmWork).await;

        match outcome {
            TableOutcome::Failed(failure) => {
                assert_eq!(failure.state, PipelineState::Enriching);
                assert!(!failure.error.is_transient());
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(h.source.calls(SourceOp::Enrich), 1);
        assert_eq!(h.checkpoints.writes(), 0);
    }

    #[tokio::test]
    async fn reload_of_unchanged_source_is_byte_identical() {
        let h = harness(500, Aggregation::Server);
        seed_arrival(&h.source);
        let id = Uuid::from_u128(1).to_string();

        h.pipeline.run_table(TrackedTable::FilmWork).await;
        let first = h.index.document("movies", &id).unwrap();

        h.checkpoints.set("film_work", Watermark::origin()).await.unwrap();
        h.pipeline.run_table(TrackedTable::FilmWork).await;
        let second = h.index.document("movies", &id).unwrap();

        assert_eq!(first, second);
        assert_eq!(h.index.document_count("movies"), 1);
    }

    #[tokio::test]
    async fn person_with_two_roles_lands_in_both_collections() {
        for aggregation in [Aggregation::Server, Aggregation::Client] {
            let h = harness(500, aggregation);
            seed_arrival(&h.source);
            let amy = Uuid::from_u128(200);
            h.source.upsert_person(
                Person {
                    id: amy,
                    full_name: "Amy Adams".into(),
                },
                ts(10),
            );
            h.source.link_person(Uuid::from_u128(1), amy, Some("actor"));
            h.source.link_person(Uuid::from_u128(1), amy, Some("writer"));

            let outcome = h.pipeline.run_table(TrackedTable::Person).await;
            assert!(!outcome.is_failed());

            let doc = document(&h.index, 1);
            let amy_ref = serde_json::json!([{"id": amy.to_string(), "name": "Amy Adams"}]);
            assert_eq!(doc["actors"], amy_ref, "{aggregation:?}");
            assert_eq!(doc["writers"], amy_ref, "{aggregation:?}");
            assert_eq!(doc["directors"], serde_json::json!([]));
            assert_eq!(doc["actors_names"], serde_json::json!(["Amy Adams"]));
        }
    }

    #[tokio::test]
    async fn dependency_resolution_pages_through_every_film_work() {
        let h = harness(2, Aggregation::Server);
        let genre = Uuid::from_u128(100);
        h.source.upsert_genre(
            Genre {
                id: genre,
                name: "Drama".into(),
                description: None,
            },
            ts(0),
        );
        for i in 1..=5u128 {
            h.source.upsert_film_work(film_work(i, "Film", ts(1)));
            h.source.link_genre(Uuid::from_u128(i), genre);
        }

        let outcome = h.pipeline.run_table(TrackedTable::Genre).await;

        assert!(!outcome.is_failed());
        let ids: HashSet<u128> = (1..=5).collect();
        for id in ids {
            assert_eq!(document(&h.index, id)["genre"], serde_json::json!(["Drama"]));
        }
        assert_eq!(h.source.calls(SourceOp::FilmWorksReferencing), 3);
        assert_eq!(h.checkpoints.get("genre").await.unwrap(), Some(ts(0)));
    }

    #[tokio::test]
    async fn watermark_never_moves_backwards() {
        let h = harness(500, Aggregation::Server);
        seed_arrival(&h.source);
        h.checkpoints.set("film_work", ts(1000)).await.unwrap();

        // The seeded row is older than the checkpoint, so nothing is seen.
        let outcome = h.pipeline.run_table(TrackedTable::FilmWork).await;
        assert!(!outcome.is_failed());
        assert_eq!(h.index.document_count("movies"), 0);
        assert_eq!(h.checkpoints.get("film_work").await.unwrap(), Some(ts(1000)));

        let mut seen = Vec::new();
        for step in [30, 10, 20] {
            h.source.upsert_film_work(film_work(7, "Late", ts(1000 + step)));
            h.pipeline.run_table(TrackedTable::FilmWork).await;
            seen.push(h.checkpoints.get("film_work").await.unwrap().unwrap());
        }
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    }
}
