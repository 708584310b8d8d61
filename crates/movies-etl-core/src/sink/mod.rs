//! Search engine sink abstraction.
//!
//! The [`SearchSink`] trait covers what the pipeline needs from the search
//! engine: a reachability check, idempotent index creation, and a bulk
//! upsert that writes a whole batch in one network operation.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StageError;

/// Name and mapping of one search index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    pub name: String,
    /// Full index body (`settings` and `mappings`).
    pub body: Value,
}

/// A serialized document ready to be upserted by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDocument {
    pub index: String,
    pub id: String,
    /// JSON source, serialized once so retries resend identical bytes.
    pub source: String,
}

#[async_trait]
pub trait SearchSink: Send + Sync {
    /// `true` when the engine answers.
    async fn ping(&self) -> bool;

    /// Create the index unless it already exists. Returns `true` when this
    /// call created it.
    async fn ensure_index(&self, index: &IndexDefinition) -> Result<bool, StageError>;

    /// Replace every document in `documents` by id, in one request.
    async fn bulk_upsert(&self, documents: &[IndexDocument]) -> Result<(), StageError>;
}
