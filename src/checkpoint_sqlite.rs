//! SQLite-backed [`CheckpointStore`].
//!
//! One row per tracked table in a `checkpoints` table. The schema is
//! created idempotently when the store is opened.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use movies_etl_core::checkpoint::CheckpointStore;
use movies_etl_core::Watermark;

use crate::db;

pub struct SqliteCheckpoints {
    pool: SqlitePool,
}

impl SqliteCheckpoints {
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect_sqlite(path)
            .await
            .with_context(|| format!("Failed to open state database: {}", path.display()))?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS checkpoints (
            source TEXT PRIMARY KEY,
            cursor TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

#[async_trait]
impl CheckpointStore for SqliteCheckpoints {
    async fn load_all(&self) -> Result<BTreeMap<String, Watermark>> {
        let rows = sqlx::query("SELECT source, cursor FROM checkpoints ORDER BY source")
            .fetch_all(&self.pool)
            .await?;

        let mut state = BTreeMap::new();
        for row in rows {
            let source: String = row.get("source");
            let cursor: String = row.get("cursor");
            let watermark = cursor
                .parse::<Watermark>()
                .with_context(|| format!("Bad watermark for '{}' in checkpoints", source))?;
            state.insert(source, watermark);
        }
        Ok(state)
    }

    async fn get(&self, key: &str) -> Result<Option<Watermark>> {
        let result: Option<String> =
            sqlx::query_scalar("SELECT cursor FROM checkpoints WHERE source = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        result
            .map(|s| s.parse::<Watermark>())
            .transpose()
            .with_context(|| format!("Bad watermark for '{}' in checkpoints", key))
    }

    async fn set(&self, key: &str, watermark: Watermark) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO checkpoints (source, cursor, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(source) DO UPDATE SET cursor = excluded.cursor, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(watermark.to_string())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
