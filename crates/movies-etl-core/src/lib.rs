//! # Movies ETL Core
//!
//! Shared, runtime-free logic for the movies ETL: data model, watermarks,
//! typed batch records, the transform stage, the retry policy, and the
//! collaborator traits for the change source, the search sink, and the
//! checkpoint store.
//!
//! This crate contains no tokio, sqlx, HTTP clients, or filesystem I/O.
//! Every collaborator trait ships with an in-memory implementation so the
//! pipeline can be exercised without PostgreSQL or Elasticsearch.

pub mod batch;
pub mod checkpoint;
pub mod error;
pub mod models;
pub mod retry;
pub mod sink;
pub mod source;
pub mod transform;
pub mod watermark;

pub use batch::{ChangeBatch, DocumentBatch, EnrichedBatch, RootBatch, TrackedTable};
pub use error::StageError;
pub use watermark::{PageCursor, Watermark};
