//! The `check` command: one-shot reachability of both endpoints.

use anyhow::{bail, Result};

use movies_etl_core::sink::SearchSink;
use movies_etl_core::source::ChangeSource;

use crate::config::Config;
use crate::db;
use crate::sink_elastic::ElasticsearchSink;
use crate::source_pg::PostgresSource;

pub async fn run_check(config: &Config) -> Result<()> {
    let source = PostgresSource::new(db::connect_postgres(&config.postgres), &config.postgres.schema);
    let sink = ElasticsearchSink::new(
        &config.elastic.url,
        std::time::Duration::from_secs(config.elastic.timeout_secs),
    )?;

    let postgres = match source.ping().await {
        Ok(()) => ("OK".to_string(), true),
        Err(e) => (e.to_string(), false),
    };
    source.close().await;
    let elastic = if sink.ping().await {
        ("OK".to_string(), true)
    } else {
        ("UNREACHABLE".to_string(), false)
    };

    let pg_target = format!(
        "{}:{}/{}",
        config.postgres.host, config.postgres.port, config.postgres.dbname
    );
    println!("{:<14} {:<32} STATUS", "ENDPOINT", "TARGET");
    println!("{:<14} {:<32} {}", "postgres", pg_target, postgres.0);
    println!("{:<14} {:<32} {}", "elasticsearch", config.elastic.url, elastic.0);

    if !(postgres.1 && elastic.1) {
        bail!("one or more endpoints are unreachable");
    }
    Ok(())
}
