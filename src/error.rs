//! Error taxonomy for a ticker run
//!
//! Parse-level problems never show up here: they are recovered locally as
//! `ParseWarning`s. Everything in `TickerError` aborts the run before the
//! marker is written.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TickerError {
    #[error("state input not found: {}", path.display())]
    InputMissing { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    InputRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state input {} is neither UTF-8 nor UTF-16LE", path.display())]
    Undecodable { path: PathBuf },

    #[error("no valid snapshot in {} ({skipped} records skipped)", path.display())]
    NoSnapshot { path: PathBuf, skipped: usize },

    #[error("ledger file {} is corrupt: {source}", path.display())]
    LedgerCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported ledger version {found} in {} (expected {expected})", path.display())]
    LedgerVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("conflicting duplicate for ticket {ticket}")]
    Integrity { ticket: String },

    #[error("failed to publish {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("statement {}: {message}", path.display())]
    Statement { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TickerError>;
