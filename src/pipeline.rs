//! One ticker run: parse → merge → stats → pause gate → render → publish → mark
//!
//! Nothing is written until every output has been produced in memory and
//! staged next to its target. Documents are renamed into place before the
//! ledger, and the marker comes last, so an interrupted run leaves either
//! the previous state or no marker.

use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::dashboard::render_dashboard;
use crate::error::Result;
use crate::ledger::{LedgerStore, MergeReport};
use crate::marker::{digest, MarkerContent, RunMarker};
use crate::parser::StateParser;
use crate::pause::PauseGate;
use crate::persist::{write_atomic, StagedFile};
use crate::report::ReportDocument;
use crate::statement::StatementImporter;
use crate::stats::StatsEngine;

/// Summary of a successful run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub merge: MergeReport,
    /// Malformed state records that were skipped
    pub skipped_records: usize,
    pub ledger_trades: usize,
    /// Statistics were taken from the pre-pause rendering
    pub frozen: bool,
    pub json_sha256: String,
    pub html_sha256: String,
}

/// Execute a full run cycle at `now`.
pub fn run_cycle(config: &RunConfig, now: DateTime<Utc>) -> Result<RunOutcome> {
    let marker = RunMarker::new(&config.marker_output);
    marker.clear()?;

    // Parse
    let parser = StateParser::new(config.source_offset);
    let parsed = parser.read_file(&config.state_log)?;
    parsed.require_snapshot(&config.state_log)?;
    let skipped_records = parsed.warnings.len();
    if skipped_records > 0 {
        warn!("{} malformed state records skipped", skipped_records);
    }

    // Merge
    let store = LedgerStore::new(&config.ledger);
    let mut ledger = store.load()?;
    let merge = ledger.merge(parsed.trades, parsed.snapshot, config.duplicate_policy)?;

    // Stats behind the pause gate
    let engine = StatsEngine::new(config.stats);
    let mut memory = std::mem::take(&mut ledger.render_state);
    let renderable = PauseGate::apply(&config.pause, &mut memory, now, || {
        engine.compute(&ledger, now)
    });
    ledger.render_state = memory;
    if let Some(banner) = &renderable.banner {
        info!("Trading paused since {}: {}", banner.since, banner.message);
    }

    // Render
    let document = ReportDocument::build(&config.bot_name, &ledger, &renderable, now);
    let json = document.to_json(config.pretty)?;
    let html = render_dashboard(&document);

    // Publish
    let staged_json = StagedFile::stage(&config.output, json.as_bytes())?;
    let staged_html = StagedFile::stage(&config.html_output, html.as_bytes())?;
    let staged_ledger = store.stage(&ledger)?;

    staged_json.commit()?;
    staged_html.commit()?;
    staged_ledger.commit()?;
    info!(
        "Published {} and {}, ledger {} trades",
        config.output.display(),
        config.html_output.display(),
        ledger.len()
    );

    // Mark
    let week = &renderable.stats.windows.week;
    let content = MarkerContent {
        completed_at: now,
        profit_7d: week.profit,
        trades_7d: week.trade_count,
        ledger_trades: ledger.len(),
        json_sha256: digest(json.as_bytes()),
        html_sha256: digest(html.as_bytes()),
    };
    marker.emit(&content)?;

    Ok(RunOutcome {
        merge,
        skipped_records,
        ledger_trades: ledger.len(),
        frozen: renderable.frozen,
        json_sha256: content.json_sha256,
        html_sha256: content.html_sha256,
    })
}

/// Merge an account statement (and optionally the state log) into the ledger.
///
/// Only the ledger is written; documents and marker are left to the next run.
pub fn import_statement(
    config: &RunConfig,
    statement: &Path,
    state_log: Option<&Path>,
) -> Result<MergeReport> {
    let parser = StateParser::new(config.source_offset);
    let trades = StatementImporter::new(parser).read_file(statement)?;

    let store = LedgerStore::new(&config.ledger);
    let mut ledger = store.load()?;
    let mut report = ledger.merge(trades, None, config.duplicate_policy)?;

    if let Some(path) = state_log {
        let parsed = parser.read_file(path)?;
        let from_log = ledger.merge(parsed.trades, parsed.snapshot, config.duplicate_policy)?;
        report.added += from_log.added;
        report.duplicates += from_log.duplicates;
        report.conflicts.extend(from_log.conflicts);
        report.snapshot_replaced = from_log.snapshot_replaced;
    }

    store.save(&ledger)?;
    Ok(report)
}

/// Rebuild the dashboard from a published structured document.
pub fn rerender_dashboard(input: &Path, html_output: &Path) -> Result<()> {
    let document = ReportDocument::read_file(input)?;
    write_atomic(html_output, render_dashboard(&document).as_bytes())?;
    info!("Dashboard {} rendered from {}", html_output.display(), input.display());
    Ok(())
}
