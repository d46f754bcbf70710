//! Failure log
//!
//! Every id that does not end up stored (other than benign skips) gets one
//! [`FailureEntry`] appended to a JSON Lines file. The file is written for
//! operators; the pipeline never reads it back.

use prodsync_common::FailureEntry;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Destination for failure entries
pub trait FailureSink: Send + Sync {
    fn record(&self, entry: &FailureEntry) -> io::Result<()>;
}

/// Append-only JSON Lines failure log
///
/// Each entry is appended and flushed on its own, so entries written before a
/// crash survive it.
#[derive(Debug, Clone)]
pub struct JsonlFailureLog {
    path: PathBuf,
}

impl JsonlFailureLog {
    /// Prepare the log at `path`, creating parent directories
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FailureSink for JsonlFailureLog {
    fn record(&self, entry: &FailureEntry) -> io::Result<()> {
        let line = serde_json::to_string(entry)?;

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{line}")?;
        file.flush()
    }
}
