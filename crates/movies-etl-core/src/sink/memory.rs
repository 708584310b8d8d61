//! In-memory [`SearchSink`] for tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;

use crate::error::StageError;
use crate::source::memory::FailureKind;

use super::{IndexDefinition, IndexDocument, SearchSink};

#[derive(Default)]
struct StoredIndex {
    body: Value,
    docs: BTreeMap<String, String>,
}

/// Index contents keyed by index name, then document id.
pub struct InMemoryIndex {
    indices: RwLock<BTreeMap<String, StoredIndex>>,
    reachable: AtomicBool,
    bulk_calls: AtomicUsize,
    failures: Mutex<VecDeque<FailureKind>>,
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self {
            indices: RwLock::new(BTreeMap::new()),
            reachable: AtomicBool::new(true),
            bulk_calls: AtomicUsize::new(0),
            failures: Mutex::new(VecDeque::new()),
        }
    }
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make the next bulk calls fail, one failure per call.
    pub fn fail_next_bulk(&self, kinds: impl IntoIterator<Item = FailureKind>) {
        self.failures.lock().unwrap().extend(kinds);
    }

    /// Number of bulk requests received, failed ones included.
    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    pub fn document(&self, index: &str, id: &str) -> Option<String> {
        let indices = self.indices.read().unwrap();
        indices.get(index).and_then(|i| i.docs.get(id).cloned())
    }

    pub fn document_count(&self, index: &str) -> usize {
        let indices = self.indices.read().unwrap();
        indices.get(index).map_or(0, |i| i.docs.len())
    }

    pub fn index_body(&self, index: &str) -> Option<Value> {
        let indices = self.indices.read().unwrap();
        indices.get(index).map(|i| i.body.clone())
    }
}

#[async_trait]
impl SearchSink for InMemoryIndex {
    async fn ping(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    async fn ensure_index(&self, index: &IndexDefinition) -> Result<bool, StageError> {
        let mut indices = self.indices.write().unwrap();
        if indices.contains_key(&index.name) {
            return Ok(false);
        }
        indices.insert(
            index.name.clone(),
            StoredIndex {
                body: index.body.clone(),
                docs: BTreeMap::new(),
            },
        );
        Ok(true)
    }

    async fn bulk_upsert(&self, documents: &[IndexDocument]) -> Result<(), StageError> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        match self.failures.lock().unwrap().pop_front() {
            Some(FailureKind::Transient) => {
                return Err(StageError::transient(anyhow!("injected bulk failure: 503")))
            }
            Some(FailureKind::Fatal) => {
                return Err(StageError::fatal(anyhow!("injected bulk failure: 400")))
            }
            None => {}
        }
        let mut indices = self.indices.write().unwrap();
        for doc in documents {
            // Unknown indices are auto-created, as Elasticsearch does.
            indices
                .entry(doc.index.clone())
                .or_default()
                .docs
                .insert(doc.id.clone(), doc.source.clone());
        }
        Ok(())
    }
}
