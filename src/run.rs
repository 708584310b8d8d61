//! Wiring for the `init` and `run` commands.
//!
//! Builds the long-lived collaborators once (PostgreSQL pool, HTTP client,
//! checkpoint store) and hands them to the [`Orchestrator`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use movies_etl_core::sink::SearchSink;

use crate::config::Config;
use crate::db;
use crate::index::film_work_index;
use crate::orchestrator::Orchestrator;
use crate::pipeline::{Pipeline, PipelineSettings, TableOutcome};
use crate::sink_elastic::ElasticsearchSink;
use crate::source_pg::PostgresSource;
use crate::state::open_store;

async fn build(config: &Config) -> Result<Orchestrator> {
    let source = Arc::new(PostgresSource::new(
        db::connect_postgres(&config.postgres),
        &config.postgres.schema,
    ));
    let sink: Arc<dyn SearchSink> = Arc::new(ElasticsearchSink::new(
        &config.elastic.url,
        Duration::from_secs(config.elastic.timeout_secs),
    )?);
    let checkpoints = open_store(config).await?;

    let pipeline = Pipeline::new(
        source,
        sink.clone(),
        checkpoints,
        PipelineSettings::from_config(config),
    );
    Ok(Orchestrator::new(
        pipeline,
        sink,
        film_work_index(&config.elastic.index),
        config.etl.tables.clone(),
        config.etl.tick_interval(),
        Duration::from_secs(config.elastic.ping_interval_secs),
        config.retry.policy(),
    ))
}

pub async fn run_init(config: &Config) -> Result<()> {
    let orchestrator = build(config).await?;
    orchestrator.bootstrap().await?;
    println!("Index '{}' ready.", config.elastic.index);
    Ok(())
}

pub async fn run_etl(config: &Config, once: bool) -> Result<()> {
    let orchestrator = build(config).await?;
    orchestrator.bootstrap().await?;

    if once {
        let outcomes = orchestrator.tick().await;
        print_summary(&outcomes);
        if outcomes.iter().any(TableOutcome::is_failed) {
            anyhow::bail!("tick finished with failed tables");
        }
        return Ok(());
    }

    tracing::info!(
        tables = ?config.etl.tables,
        interval_secs = config.etl.tick_interval_secs,
        "ETL started"
    );
    orchestrator
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await;
    Ok(())
}

fn print_summary(outcomes: &[TableOutcome]) {
    println!("{:<12} {:<8} {:<8} {:<10} WATERMARK", "TABLE", "STATUS", "PAGES", "DOCUMENTS");
    for outcome in outcomes {
        match outcome {
            TableOutcome::Synced {
                table,
                pages,
                documents,
                watermark,
            } => {
                let watermark = watermark.map_or_else(|| "(unchanged)".to_string(), |w| w.to_string());
                println!("{:<12} {:<8} {:<8} {:<10} {}", table, "ok", pages, documents, watermark);
            }
            TableOutcome::Failed(failure) => {
                println!(
                    "{:<12} {:<8} {:<8} {:<10} {} (stage {}, batch {}): {}",
                    failure.table,
                    "failed",
                    "-",
                    "-",
                    failure.started_from,
                    failure.state,
                    failure.batch_size,
                    failure.error
                );
            }
        }
    }
}
