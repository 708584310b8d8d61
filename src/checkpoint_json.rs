//! JSON-file [`CheckpointStore`].
//!
//! The whole state is one JSON object `{ "<table>": "<watermark>" }`.
//! Reads return the full map (a missing file is an empty map); writes
//! replace the full file by writing a sibling temp file, syncing it to disk
//! and renaming it over the original, so a crash mid-write leaves the
//! previous state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use movies_etl_core::checkpoint::CheckpointStore;
use movies_etl_core::Watermark;

pub struct JsonFileCheckpoints {
    path: PathBuf,
}

impl JsonFileCheckpoints {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_raw(&self) -> Result<BTreeMap<String, String>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read state file: {}", self.path.display())
                })
            }
        };
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", self.path.display()))
    }

    async fn write_raw(&self, state: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let body = serde_json::to_string_pretty(state)?;
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .with_context(|| format!("Failed to create state file: {}", tmp.display()))?;
        file.write_all(body.as_bytes())
            .await
            .with_context(|| format!("Failed to write state file: {}", tmp.display()))?;
        // The rename must not become durable before the contents do.
        file.sync_all()
            .await
            .with_context(|| format!("Failed to sync state file: {}", tmp.display()))?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace state file: {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for JsonFileCheckpoints {
    async fn load_all(&self) -> Result<BTreeMap<String, Watermark>> {
        self.read_raw()
            .await?
            .into_iter()
            .map(|(key, raw)| {
                let watermark = raw
                    .parse::<Watermark>()
                    .with_context(|| format!("Bad watermark for '{}' in state file", key))?;
                Ok((key, watermark))
            })
            .collect()
    }

    async fn set(&self, key: &str, watermark: Watermark) -> Result<()> {
        // Read-modify-write; other keys are preserved verbatim.
        let mut state = self.read_raw().await?;
        state.insert(key.to_string(), watermark.to_string());
        self.write_raw(&state).await
    }
}
