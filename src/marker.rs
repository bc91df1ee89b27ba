//! Run completion marker
//!
//! The external publisher only picks up outputs when this file exists. It is
//! removed at the start of every run and written last, so its presence always
//! means the documents and ledger next to it are complete.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Result, TickerError};
use crate::persist::write_atomic;
use crate::report::format_timestamp;
use crate::types::Money;

/// Hex SHA-256 of published bytes
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Informational content of the marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerContent {
    pub completed_at: DateTime<Utc>,
    pub profit_7d: Money,
    pub trades_7d: usize,
    pub ledger_trades: usize,
    pub json_sha256: String,
    pub html_sha256: String,
}

impl MarkerContent {
    pub fn render(&self) -> String {
        format!(
            "completed_at={}\nprofit_7d={:.2}\ntrades_7d={}\nledger_trades={}\njson_sha256={}\nhtml_sha256={}\n",
            format_timestamp(self.completed_at),
            self.profit_7d.round_dp(2).inner(),
            self.trades_7d,
            self.ledger_trades,
            self.json_sha256,
            self.html_sha256,
        )
    }
}

#[derive(Debug, Clone)]
pub struct RunMarker {
    path: PathBuf,
}

impl RunMarker {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Remove a marker left by a previous run.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Removed previous marker {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(TickerError::Persist {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Signal completion. Call only after every output was committed.
    pub fn emit(&self, content: &MarkerContent) -> Result<()> {
        write_atomic(&self.path, content.render().as_bytes())?;
        info!("Marker written: {}", self.path.display());
        Ok(())
    }
}
