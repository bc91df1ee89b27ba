//! Statement import command implementation

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;
use webticker::config::RunOverrides;
use webticker::{pipeline, Config};

pub fn run(config_path: PathBuf, statement: PathBuf, state_log: Option<PathBuf>) -> Result<()> {
    info!("Importing statement {}", statement.display());

    let config = Config::from_file(&config_path)?;
    let run_config = config
        .resolve(RunOverrides::default())
        .context("Invalid ticker configuration")?;

    let report = pipeline::import_statement(&run_config, &statement, state_log.as_deref())
        .with_context(|| format!("Failed to import {}", statement.display()))?;

    println!("Imported trades:    {}", report.added);
    println!("Already recorded:   {}", report.duplicates);
    if !report.conflicts.is_empty() {
        println!("Conflicting tickets kept as stored: {}", report.conflicts.join(", "));
    }
    println!("Ledger:             {}", run_config.ledger.display());

    info!("Import completed successfully");
    Ok(())
}
