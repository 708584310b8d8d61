//! Configuration parsing and validation.
//!
//! The ETL is configured by a TOML file (default `config/etl.toml`). See
//! `config/etl.example.toml` for every option. [`load_config`] applies
//! defaults and rejects values the pipeline cannot run with.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use movies_etl_core::retry::RetryPolicy;
use movies_etl_core::TrackedTable;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub postgres: PostgresConfig,
    pub elastic: ElasticConfig,
    #[serde(default)]
    pub etl: EtlConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PostgresConfig {
    pub host: String,
    #[serde(default = "default_pg_port")]
    pub port: u16,
    pub dbname: String,
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_pg_port() -> u16 {
    5432
}
fn default_schema() -> String {
    "content".to_string()
}
fn default_max_connections() -> u32 {
    2
}

impl PostgresConfig {
    /// Password from config, else from the `POSTGRES_PASSWORD` environment variable.
    pub fn resolved_password(&self) -> Option<String> {
        self.password
            .clone()
            .or_else(|| std::env::var("POSTGRES_PASSWORD").ok())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ElasticConfig {
    pub url: String,
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

fn default_index() -> String {
    "movies".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_ping_interval_secs() -> u64 {
    1
}

/// How film works are aggregated during enrichment.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Genres and persons are aggregated into JSON arrays by PostgreSQL.
    Server,
    /// One row per join tuple, grouped by the transform stage.
    Client,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EtlConfig {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_tables")]
    pub tables: Vec<TrackedTable>,
    #[serde(default = "default_aggregation")]
    pub aggregation: Aggregation,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            page_size: default_page_size(),
            tables: default_tables(),
            aggregation: default_aggregation(),
        }
    }
}

fn default_tick_interval_secs() -> u64 {
    5
}
fn default_page_size() -> usize {
    500
}
fn default_tables() -> Vec<TrackedTable> {
    TrackedTable::ALL.to_vec()
}
fn default_aggregation() -> Aggregation {
    Aggregation::Server
}

impl EtlConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    Json,
    Sqlite,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    #[serde(default = "default_state_backend")]
    pub backend: StateBackend,
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: default_state_backend(),
            path: default_state_path(),
        }
    }
}

fn default_state_backend() -> StateBackend {
    StateBackend::Json
}
fn default_state_path() -> PathBuf {
    PathBuf::from("./state/state.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// 0 means retry forever.
    #[serde(default)]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: 0,
        }
    }
}

fn default_base_delay_ms() -> u64 {
    500
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_max_delay_ms() -> u64 {
    30_000
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            multiplier: self.multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_attempts: (self.max_attempts > 0).then_some(self.max_attempts),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

fn validate(config: &Config) -> Result<()> {
    // Validate postgres
    if !is_plain_identifier(&config.postgres.schema) {
        anyhow::bail!(
            "postgres.schema must be a lowercase identifier, got '{}'",
            config.postgres.schema
        );
    }
    if config.postgres.max_connections == 0 {
        anyhow::bail!("postgres.max_connections must be >= 1");
    }

    // Validate elastic
    if !config.elastic.url.starts_with("http://") && !config.elastic.url.starts_with("https://") {
        anyhow::bail!("elastic.url must start with http:// or https://");
    }
    if config.elastic.index.is_empty() || config.elastic.index != config.elastic.index.to_lowercase()
    {
        anyhow::bail!("elastic.index must be a non-empty lowercase name");
    }

    // Validate etl
    if config.etl.tick_interval_secs == 0 {
        anyhow::bail!("etl.tick_interval_secs must be > 0");
    }
    if !(1..=10_000).contains(&config.etl.page_size) {
        anyhow::bail!("etl.page_size must be in [1, 10000]");
    }
    if config.etl.tables.is_empty() {
        anyhow::bail!("etl.tables must name at least one table");
    }
    let mut tables = config.etl.tables.clone();
    tables.sort();
    tables.dedup();
    if tables.len() != config.etl.tables.len() {
        anyhow::bail!("etl.tables must not repeat a table");
    }

    // Validate retry
    if config.retry.multiplier <= 1.0 {
        anyhow::bail!("retry.multiplier must be > 1.0");
    }
    if config.retry.base_delay_ms == 0 {
        anyhow::bail!("retry.base_delay_ms must be > 0");
    }
    if config.retry.max_delay_ms < config.retry.base_delay_ms {
        anyhow::bail!("retry.max_delay_ms must be >= retry.base_delay_ms");
    }

    Ok(())
}
