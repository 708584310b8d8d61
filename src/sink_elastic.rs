//! Elasticsearch [`SearchSink`] over the REST API.
//!
//! - `ping` → `GET /`
//! - `ensure_index` → `HEAD /<index>`, then `PUT /<index>` with the mapping
//! - `bulk_upsert` → one `POST /_bulk` with an `index` action per document
//!
//! The `index` bulk action is a full replace by `_id`, which is what makes
//! retrying a whole batch safe.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};

use movies_etl_core::sink::{IndexDefinition, IndexDocument, SearchSink};
use movies_etl_core::StageError;

use crate::errors::{classify_reqwest, classify_status, is_transient_status};

/// Reads a response body as JSON. A body that stops short is a transport
/// failure and transient; a complete body that doesn't parse is fatal.
async fn read_json(resp: reqwest::Response) -> Result<Value, StageError> {
    let bytes = resp.bytes().await.map_err(StageError::transient)?;
    serde_json::from_slice(&bytes).map_err(StageError::fatal)
}

pub struct ElasticsearchSink {
    client: reqwest::Client,
    base_url: String,
}

impl ElasticsearchSink {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

/// Newline-delimited bulk body; every line, including the last, ends in `\n`.
pub fn bulk_body(documents: &[IndexDocument]) -> String {
    let mut body = String::new();
    for doc in documents {
        let action = json!({ "index": { "_index": doc.index, "_id": doc.id } });
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&doc.source);
        body.push('\n');
    }
    body
}

/// Inspect a `_bulk` response body for per-item failures.
///
/// Any item rejected with 429 or 5xx makes the batch transient (it is
/// retried whole); any other rejection is fatal.
pub fn check_bulk_response(response: &Value) -> Result<(), StageError> {
    if !response["errors"].as_bool().unwrap_or(false) {
        return Ok(());
    }
    let items = response["items"].as_array().cloned().unwrap_or_default();
    let mut failed = 0usize;
    let mut first_fatal: Option<String> = None;
    let mut any_transient = false;

    for item in &items {
        let Some(result) = item.as_object().and_then(|o| o.values().next()) else {
            continue;
        };
        if result.get("error").is_none() {
            continue;
        }
        failed += 1;
        let status = result["status"]
            .as_u64()
            .and_then(|s| u16::try_from(s).ok())
            .and_then(|s| StatusCode::from_u16(s).ok());
        if status.is_some_and(is_transient_status) {
            any_transient = true;
        } else if first_fatal.is_none() {
            first_fatal = Some(format!(
                "document {}: {}",
                result["_id"].as_str().unwrap_or("?"),
                result["error"]
            ));
        }
    }

    match first_fatal {
        Some(reason) => Err(StageError::fatal(anyhow!(
            "bulk upsert rejected {} of {} documents; first: {}",
            failed,
            items.len(),
            reason
        ))),
        None if any_transient => Err(StageError::transient(anyhow!(
            "bulk upsert throttled {} of {} documents",
            failed,
            items.len()
        ))),
        None => Err(StageError::fatal(anyhow!(
            "bulk upsert reported errors without item details"
        ))),
    }
}

#[async_trait]
impl SearchSink for ElasticsearchSink {
    async fn ping(&self) -> bool {
        match self.client.get(self.url("")).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn ensure_index(&self, index: &IndexDefinition) -> Result<bool, StageError> {
        let head = self
            .client
            .head(self.url(&index.name))
            .send()
            .await
            .map_err(classify_reqwest)?;
        if head.status().is_success() {
            return Ok(false);
        }
        if head.status() != StatusCode::NOT_FOUND {
            return Err(classify_status(head.status(), ""));
        }

        let resp = self
            .client
            .put(self.url(&index.name))
            .json(&index.body)
            .send()
            .await
            .map_err(classify_reqwest)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(true);
        }
        let body = resp.text().await.unwrap_or_default();
        // Lost a creation race with another process.
        if status == StatusCode::BAD_REQUEST && body.contains("resource_already_exists_exception") {
            return Ok(false);
        }
        Err(classify_status(status, &body))
    }

    async fn bulk_upsert(&self, documents: &[IndexDocument]) -> Result<(), StageError> {
        if documents.is_empty() {
            return Ok(());
        }
        let resp = self
            .client
            .post(self.url("_bulk"))
            .header("Content-Type", "application/x-ndjson")
            .body(bulk_body(documents))
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        let json = read_json(resp).await?;
        check_bulk_response(&json)
    }
}
