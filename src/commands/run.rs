//! Run command implementation

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::info;
use webticker::config::RunOverrides;
use webticker::{pipeline, Config};

pub fn run(config_path: PathBuf, overrides: RunOverrides, now: Option<String>) -> Result<()> {
    info!("Starting ticker run");

    let config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path.display());

    let run_config = config
        .resolve(overrides)
        .context("Invalid ticker configuration")?;

    let now = match now {
        Some(raw) => {
            let at = DateTime::parse_from_rfc3339(&raw)
                .with_context(|| format!("--now must be RFC 3339, got {}", raw))?
                .with_timezone(&Utc);
            info!("Overriding reference time to: {}", at);
            at
        }
        None => Utc::now(),
    };

    let outcome = pipeline::run_cycle(&run_config, now).context("Ticker run failed")?;

    println!("\n{}", "=".repeat(60));
    println!("WEB TICKER RUN");
    println!("{}", "=".repeat(60));
    println!("New trades:         {}", outcome.merge.added);
    println!("Duplicates:         {}", outcome.merge.duplicates);
    println!("Conflicts:          {}", outcome.merge.conflicts.len());
    println!("Skipped records:    {}", outcome.skipped_records);
    println!("Ledger trades:      {}", outcome.ledger_trades);
    println!("Statistics frozen:  {}", outcome.frozen);
    println!("JSON:               {}", run_config.output.display());
    println!("HTML:               {}", run_config.html_output.display());
    println!("{}", "=".repeat(60));

    info!("Run completed successfully");
    Ok(())
}
