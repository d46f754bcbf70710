//! Error types for prodsync ingestion
//!
//! Two layers of errors exist:
//!
//! - [`IngestError`] is fatal and ends the run (bad configuration, unreachable
//!   database at startup, unreadable input file).
//! - [`ItemError`] is scoped to one product id. The pipeline records it and moves
//!   on; it never escapes a run.
//!
//! [`FetchError`] and [`StoreError`] are the component-level errors that fold
//! into [`ItemError`].

use prodsync_common::{FailureKind, ProductId};
use thiserror::Error;

/// Result type alias for run-level operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Fatal errors that abort a run
#[derive(Error, Debug)]
pub enum IngestError {
    /// Input file, configuration file or database settings are unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// Record store failed outside of per-item processing (migrations, pool)
    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Errors from the product API client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The API reported that the product does not exist
    #[error("product not found (HTTP {status})")]
    NotFound { status: u16 },

    /// Network failure, timeout, unexpected status or unparseable body
    #[error("{0}")]
    Transient(String),
}

impl FetchError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Whether another attempt within the same run may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

/// Errors from the record store
#[derive(Error, Debug)]
pub enum StoreError {
    /// A record with this id is already stored
    #[error("product {0} already exists")]
    DuplicateKey(ProductId),

    #[error("Database query failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Why a single product id was not stored
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ItemError {
    #[error("product not found (HTTP {status})")]
    NotFound { status: u16 },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("record already stored")]
    Duplicate,

    #[error("unexpected failure: {0}")]
    Unknown(String),
}

impl ItemError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ItemError::NotFound { .. } => FailureKind::NotFound,
            ItemError::Transient(_) => FailureKind::Transient,
            ItemError::Duplicate => FailureKind::Duplicate,
            ItemError::Unknown(_) => FailureKind::Unknown,
        }
    }
}

impl From<FetchError> for ItemError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::NotFound { status } => ItemError::NotFound { status },
            FetchError::Transient(reason) => ItemError::Transient(reason),
        }
    }
}

impl From<StoreError> for ItemError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateKey(_) => ItemError::Duplicate,
            other => ItemError::Unknown(other.to_string()),
        }
    }
}
