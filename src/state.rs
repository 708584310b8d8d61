//! Checkpoint store selection and the `state` command.

use std::sync::Arc;

use anyhow::Result;

use movies_etl_core::checkpoint::CheckpointStore;

use crate::checkpoint_json::JsonFileCheckpoints;
use crate::checkpoint_sqlite::SqliteCheckpoints;
use crate::config::{Config, StateBackend};

/// Open the checkpoint store named by `[state]`.
pub async fn open_store(config: &Config) -> Result<Arc<dyn CheckpointStore>> {
    let store: Arc<dyn CheckpointStore> = match config.state.backend {
        StateBackend::Json => Arc::new(JsonFileCheckpoints::new(&config.state.path)),
        StateBackend::Sqlite => Arc::new(SqliteCheckpoints::open(&config.state.path).await?),
    };
    Ok(store)
}

/// Print the persisted watermark of every tracked table.
pub async fn run_state(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let watermarks = store.load_all().await?;

    println!("{:<12} WATERMARK", "TABLE");
    for table in &config.etl.tables {
        match watermarks.get(table.table_name()) {
            Some(watermark) => println!("{:<12} {}", table, watermark),
            None => println!("{:<12} (none)", table),
        }
    }
    Ok(())
}
