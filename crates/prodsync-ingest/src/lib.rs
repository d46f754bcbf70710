//! prodsync ingestion library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Fetches product details from a JSON API, one request per id listed in a CSV
//! file, and persists them into PostgreSQL. Runs are resumable: ids that are
//! already stored are skipped without a request, so an interrupted run can be
//! restarted over the same input.
//!
//! # Components
//!
//! - [`id_source`]: lazy, deduplicating reader over the input CSV
//! - [`client`]: product API client behind the [`ProductFetcher`] trait
//! - [`store`]: PostgreSQL record store behind the [`RecordStore`] trait
//! - [`failure_log`]: JSON Lines log of ids that were not stored
//! - [`pipeline`]: the sequential fetch-and-persist loop
//!
//! # Example
//!
//! ```no_run
//! use prodsync_ingest::{
//!     ApiClient, AppConfig, IdSource, IngestionPipeline, JsonlFailureLog, PgRecordStore,
//!     PipelineOptions,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load("database.ini", "postgresql")?;
//!     let store = PgRecordStore::connect(&config.database).await?;
//!     store.migrate().await?;
//!
//!     let client = ApiClient::new(&config.api)?;
//!     let failures = JsonlFailureLog::open(&config.ingest.failure_log)?;
//!     let ids = IdSource::open("product_id.csv")?;
//!
//!     let pipeline =
//!         IngestionPipeline::new(&client, &store, &failures, PipelineOptions::default());
//!     let summary = pipeline.run(ids.iter()?).await?;
//!     println!("{summary}");
//!
//!     store.close().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod failure_log;
pub mod id_source;
pub mod pipeline;
pub mod store;
pub mod text;

pub use client::{ApiClient, ProductFetcher};
pub use config::AppConfig;
pub use error::{FetchError, IngestError, ItemError, Result, StoreError};
pub use failure_log::{FailureSink, JsonlFailureLog};
pub use id_source::IdSource;
pub use pipeline::{IngestSummary, IngestionPipeline, ItemOutcome, PipelineOptions};
pub use store::{PgRecordStore, RecordStore};
