//! Tick loop over the tracked tables.
//!
//! Startup waits for the search engine and creates the index if it is
//! missing. Each tick then runs [`Pipeline::run_table`] for every configured
//! table, one after another, in configuration order. A failed table is
//! logged and skipped; the next tick retries it from its unchanged
//! checkpoint.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::MissedTickBehavior;

use movies_etl_core::retry::RetryPolicy;
use movies_etl_core::sink::{IndexDefinition, SearchSink};
use movies_etl_core::TrackedTable;

use crate::pipeline::{Pipeline, TableOutcome};
use crate::retry::with_backoff;

pub struct Orchestrator {
    pipeline: Pipeline,
    sink: Arc<dyn SearchSink>,
    index: IndexDefinition,
    tables: Vec<TrackedTable>,
    tick_interval: Duration,
    ping_interval: Duration,
    retry: RetryPolicy,
}

impl Orchestrator {
    pub fn new(
        pipeline: Pipeline,
        sink: Arc<dyn SearchSink>,
        index: IndexDefinition,
        tables: Vec<TrackedTable>,
        tick_interval: Duration,
        ping_interval: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            pipeline,
            sink,
            index,
            tables,
            tick_interval,
            ping_interval,
            retry,
        }
    }

    /// Block until the search engine answers a ping.
    pub async fn wait_for_sink(&self) {
        let mut waited = 0u32;
        while !self.sink.ping().await {
            waited += 1;
            tracing::info!(attempt = waited, "Waiting for the search engine");
            tokio::time::sleep(self.ping_interval).await;
        }
    }

    /// Wait for the search engine, then create the index unless it exists.
    pub async fn bootstrap(&self) -> Result<()> {
        self.wait_for_sink().await;
        let created = with_backoff(&self.retry, "create index", || {
            self.sink.ensure_index(&self.index)
        })
        .await?;
        if created {
            tracing::info!(index = %self.index.name, "Index created");
        } else {
            tracing::info!(index = %self.index.name, "Index already exists");
        }
        Ok(())
    }

    /// One pass over every tracked table.
    pub async fn tick(&self) -> Vec<TableOutcome> {
        let mut outcomes = Vec::with_capacity(self.tables.len());
        for table in &self.tables {
            outcomes.push(self.pipeline.run_table(*table).await);
        }
        let failed = outcomes.iter().filter(|o| o.is_failed()).count();
        if failed > 0 {
            tracing::warn!(failed, tables = outcomes.len(), "Tick finished with failures");
        }
        outcomes
    }

    /// Tick at the configured interval until `shutdown` resolves.
    ///
    /// Shutdown is only observed between ticks; a tick in progress runs to
    /// completion.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut ticks = 0u64;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(ticks, "Shutting down");
                    break;
                }
                _ = interval.tick() => {
                    ticks += 1;
                    self.tick().await;
                }
            }
        }
    }
}
