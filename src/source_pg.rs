//! PostgreSQL [`ChangeSource`].
//!
//! Runs the queries from [`crate::queries`] against the movies catalog
//! through a long-lived `PgPool`. Driver errors are classified with
//! [`classify_sqlx`] so the stages know what to retry.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use uuid::Uuid;

use chrono::{DateTime, NaiveDate, Utc};
use movies_etl_core::models::{FilmWork, FlatFilmWorkRow, Genre, PersonRole};
use movies_etl_core::source::{ChangeSource, ChangedRow};
use movies_etl_core::{PageCursor, StageError, TrackedTable, Watermark};

use crate::errors::classify_sqlx;
use crate::queries;

pub struct PostgresSource {
    pool: PgPool,
    schema: String,
}

impl PostgresSource {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn page_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn decode_changed(row: &PgRow) -> Result<ChangedRow, sqlx::Error> {
    let id: Uuid = row.try_get("id")?;
    let modified: DateTime<Utc> = row.try_get("modified")?;
    Ok(ChangedRow {
        id,
        modified: Watermark::new(modified),
    })
}

fn decode_film_work(row: &PgRow) -> Result<FilmWork, sqlx::Error> {
    let persons: Json<Vec<PersonRole>> = row.try_get("persons")?;
    let genres: Json<Vec<Genre>> = row.try_get("genres")?;
    Ok(FilmWork {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        rating: row.try_get("rating")?,
        kind: row.try_get("type")?,
        creation_date: row.try_get::<Option<NaiveDate>, _>("creation_date")?,
        genres: genres.0,
        persons: persons.0,
    })
}

fn decode_flat(row: &PgRow) -> Result<FlatFilmWorkRow, sqlx::Error> {
    Ok(FlatFilmWorkRow {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        rating: row.try_get("rating")?,
        kind: row.try_get("type")?,
        creation_date: row.try_get("creation_date")?,
        role: row.try_get("role")?,
        person_id: row.try_get("person_id")?,
        person_name: row.try_get("person_name")?,
        genre_id: row.try_get("genre_id")?,
        genre_name: row.try_get("genre_name")?,
    })
}

fn decode_all<T>(
    rows: &[PgRow],
    decode: fn(&PgRow) -> Result<T, sqlx::Error>,
) -> Result<Vec<T>, StageError> {
    rows.iter()
        .map(decode)
        .collect::<Result<Vec<_>, _>>()
        .map_err(classify_sqlx)
}

#[async_trait]
impl ChangeSource for PostgresSource {
    async fn changed_since(
        &self,
        table: TrackedTable,
        after: PageCursor,
        limit: usize,
    ) -> Result<Vec<ChangedRow>, StageError> {
        let sql = queries::changed_since(&self.schema, table);
        let rows = sqlx::query(&sql)
            .bind(after.modified.timestamp())
            .bind(after.id)
            .bind(page_limit(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(classify_sqlx)
            .map_err(|e| e.context(format!("selecting changed rows from {}", table)))?;
        decode_all(&rows, decode_changed)
    }

    async fn film_works_referencing(
        &self,
        table: TrackedTable,
        ids: &[Uuid],
        after: PageCursor,
        limit: usize,
    ) -> Result<Vec<ChangedRow>, StageError> {
        let sql = queries::film_works_referencing(&self.schema, table)
            .with_context(|| format!("{} has no link table to film_work", table))
            .map_err(StageError::Fatal)?;
        let rows = sqlx::query(&sql)
            .bind(ids)
            .bind(after.modified.timestamp())
            .bind(after.id)
            .bind(page_limit(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(classify_sqlx)
            .map_err(|e| e.context(format!("resolving film works from {}", table)))?;
        decode_all(&rows, decode_changed)
    }

    async fn enrich(&self, ids: &[Uuid]) -> Result<Vec<FilmWork>, StageError> {
        let sql = queries::enrich_aggregated(&self.schema);
        let rows = sqlx::query(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(classify_sqlx)
            .map_err(|e| e.context("enriching film works"))?;
        decode_all(&rows, decode_film_work)
    }

    async fn enrich_flat(&self, ids: &[Uuid]) -> Result<Vec<FlatFilmWorkRow>, StageError> {
        let sql = queries::enrich_flat(&self.schema);
        let rows = sqlx::query(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(classify_sqlx)
            .map_err(|e| e.context("enriching film works"))?;
        decode_all(&rows, decode_flat)
    }

    async fn ping(&self) -> Result<(), StageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(classify_sqlx)
    }
}
