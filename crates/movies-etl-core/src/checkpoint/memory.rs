//! In-memory [`CheckpointStore`] for tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::watermark::Watermark;

use super::CheckpointStore;

#[derive(Default)]
pub struct InMemoryCheckpoints {
    values: RwLock<BTreeMap<String, Watermark>>,
    writes: AtomicUsize,
}

impl InMemoryCheckpoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set` calls that reached the store.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpoints {
    async fn load_all(&self) -> Result<BTreeMap<String, Watermark>> {
        Ok(self.values.read().unwrap().clone())
    }

    async fn set(&self, key: &str, watermark: Watermark) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.values
            .write()
            .unwrap()
            .insert(key.to_string(), watermark);
        Ok(())
    }
}
