//! Account web ticker
//!
//! Merges the trading terminal's state log into a durable trade ledger,
//! computes trailing-window performance statistics and publishes them as a
//! JSON document plus a static HTML dashboard.

pub mod config;
pub mod dashboard;
pub mod error;
pub mod ledger;
pub mod marker;
pub mod parser;
pub mod pause;
pub mod persist;
pub mod pipeline;
pub mod report;
pub mod statement;
pub mod stats;
pub mod types;

pub use config::{Config, RunConfig};
pub use error::{Result, TickerError};
pub use ledger::{DuplicatePolicy, Ledger, LedgerStore};
pub use types::*;
