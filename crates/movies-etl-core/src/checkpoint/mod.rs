//! Durable per-table watermarks.
//!
//! A [`CheckpointStore`] maps table names to [`Watermark`]s. Absence of a
//! key means "beginning of time" and is not an error. Writers go through
//! [`CheckpointStore::advance`], which refuses to move a watermark
//! backwards.
//!
//! Concurrent writers to the same key are not supported; the orchestrator
//! is the single writer per key.

pub mod memory;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::watermark::Watermark;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Every persisted watermark.
    async fn load_all(&self) -> Result<BTreeMap<String, Watermark>>;

    /// Unconditionally store `watermark` under `key`. Idempotent.
    async fn set(&self, key: &str, watermark: Watermark) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Watermark>> {
        Ok(self.load_all().await?.get(key).copied())
    }

    /// Store `watermark` only if it is newer than the current value.
    ///
    /// Returns `true` when a write happened.
    async fn advance(&self, key: &str, watermark: Watermark) -> Result<bool> {
        if let Some(current) = self.get(key).await? {
            if current >= watermark {
                return Ok(false);
            }
        }
        self.set(key, watermark).await?;
        Ok(true)
    }
}
