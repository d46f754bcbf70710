//! prodsync common library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types and logging setup for the prodsync workspace.
//!
//! # Overview
//!
//! - **Types**: product identifiers, flattened product records and failure entries
//! - **Logging**: `tracing` subscriber configuration shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use prodsync_common::logging::{init_logging, LogConfig};
//! use prodsync_common::ProductId;
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     let id: ProductId = "184059211".parse()?;
//!     tracing::info!(product_id = %id, "Parsed product id");
//!     Ok(())
//! }
//! ```

pub mod logging;
pub mod types;

// Re-export commonly used types
pub use types::{FailureEntry, FailureKind, ParseProductIdError, ProductId, ProductRecord};
