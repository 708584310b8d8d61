//! # Movies ETL
//!
//! Incremental change-data-capture from the PostgreSQL movies catalog into
//! an Elasticsearch index.
//!
//! Every tick, each tracked table (`genre`, `person`, `film_work`) is read
//! from its persisted watermark. Changed dependency rows are resolved back
//! to the film works that reference them, those film works are re-enriched
//! and re-indexed in bulk, and only then is the table's watermark advanced.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────────────────────────┐   ┌───────────────┐
//! │ PostgreSQL │──▶│ extract → resolve → enrich → transform │──▶│ Elasticsearch │
//! │  content.* │   │               → load                   │   │    movies     │
//! └────────────┘   └──────────────────┬───────────────────┘   └───────────────┘
//!                                     │ advance after load
//!                                     ▼
//!                              ┌─────────────┐
//!                              │ checkpoints │
//!                              │ JSON/SQLite │
//!                              └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! movies-etl check              # reachability of both endpoints
//! movies-etl init               # create the index if missing
//! movies-etl run --once         # one tick with a summary
//! movies-etl run                # tick forever, Ctrl-C to stop
//! movies-etl state              # persisted watermarks
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`errors`] | Driver error classification |
//! | [`retry`] | Backoff executor |
//! | [`db`] | PostgreSQL and SQLite pools |
//! | [`queries`] | SQL text |
//! | [`source_pg`] | PostgreSQL change source |
//! | [`sink_elastic`] | Elasticsearch sink |
//! | [`index`] | Index settings and mapping |
//! | [`checkpoint_json`] | JSON-file checkpoints |
//! | [`checkpoint_sqlite`] | SQLite checkpoints |
//! | [`pipeline`] | Stages and the per-table run |
//! | [`orchestrator`] | Startup and the tick loop |
//! | [`run`] | `init` and `run` commands |
//! | [`state`] | Checkpoint store selection and `state` |
//! | [`health`] | `check` command |

pub mod checkpoint_json;
pub mod checkpoint_sqlite;
pub mod config;
pub mod db;
pub mod errors;
pub mod health;
pub mod index;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod queries;
pub mod retry;
pub mod run;
pub mod sink_elastic;
pub mod source_pg;
pub mod state;
