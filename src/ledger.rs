// Trade Ledger
// Append-only trade history keyed by ticket, plus the latest account snapshot
//
// Persisted as a single JSON document that is only ever replaced through a
// staged temp file, so a crash mid-write leaves the previous ledger intact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Result, TickerError};
use crate::pause::RenderState;
use crate::persist::StagedFile;
use crate::types::{Snapshot, Trade};

pub const LEDGER_VERSION: u32 = 1;

// =============================================================================
// Merge Policy & Report
// =============================================================================

/// What to do when an incoming trade reuses a stored ticket with different fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Warn and keep the stored version
    #[default]
    KeepExisting,
    /// Fail the run before anything is persisted
    Abort,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub added: usize,
    /// Identical copies of stored trades
    pub duplicates: usize,
    /// Tickets whose incoming copy differed from the stored one
    pub conflicts: Vec<String>,
    pub snapshot_replaced: bool,
}

// =============================================================================
// Ledger
// =============================================================================

type TradeKey = (DateTime<Utc>, String);

/// Trades ordered by `(closed_at, ticket)` with a ticket index for dedup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    trades: BTreeMap<TradeKey, Trade>,
    index: HashMap<String, DateTime<Utc>>,
    snapshot: Option<Snapshot>,
    pub render_state: RenderState,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Trades in close-time order, ties by ticket
    pub fn trades(&self) -> impl DoubleEndedIterator<Item = &Trade> + ExactSizeIterator {
        self.trades.values()
    }

    pub fn get(&self, ticket: &str) -> Option<&Trade> {
        let closed_at = self.index.get(ticket)?;
        self.trades.get(&(*closed_at, ticket.to_string()))
    }

    pub fn contains(&self, ticket: &str) -> bool {
        self.index.contains_key(ticket)
    }

    fn insert(&mut self, trade: Trade) {
        self.index.insert(trade.ticket.clone(), trade.closed_at);
        self.trades
            .insert((trade.closed_at, trade.ticket.clone()), trade);
    }

    /// Add every trade whose ticket is not yet recorded and take the snapshot
    /// if one was parsed. Stored trades are never modified.
    pub fn merge(
        &mut self,
        incoming: Vec<Trade>,
        snapshot: Option<Snapshot>,
        policy: DuplicatePolicy,
    ) -> Result<MergeReport> {
        if policy == DuplicatePolicy::Abort {
            self.check_conflicts(&incoming)?;
        }

        let mut report = MergeReport::default();

        for trade in incoming {
            match self.get(&trade.ticket) {
                Some(existing) if *existing == trade => report.duplicates += 1,
                Some(existing) => {
                    warn!(
                        "Conflicting duplicate for ticket {} ({} {} closed {}), keeping stored version",
                        trade.ticket, existing.symbol, existing.profit, existing.closed_at
                    );
                    report.conflicts.push(trade.ticket);
                }
                None => {
                    debug!(
                        "New trade {} {} profit={} closed={}",
                        trade.ticket, trade.symbol, trade.profit, trade.closed_at
                    );
                    self.insert(trade);
                    report.added += 1;
                }
            }
        }

        if let Some(snap) = snapshot {
            self.snapshot = Some(snap);
            report.snapshot_replaced = true;
        }

        info!(
            "Merged: {} added, {} duplicates, {} conflicts, ledger now {} trades",
            report.added,
            report.duplicates,
            report.conflicts.len(),
            self.len()
        );
        Ok(report)
    }

    /// Abort-policy pre-scan so a rejected merge leaves the ledger unchanged.
    fn check_conflicts(&self, incoming: &[Trade]) -> Result<()> {
        let mut batch: HashMap<&str, &Trade> = HashMap::new();
        for trade in incoming {
            let known = self
                .get(&trade.ticket)
                .or_else(|| batch.get(trade.ticket.as_str()).copied());
            match known {
                Some(existing) if existing != trade => {
                    return Err(TickerError::Integrity {
                        ticket: trade.ticket.clone(),
                    })
                }
                Some(_) => {}
                None => {
                    batch.insert(&trade.ticket, trade);
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// On-disk Format
// =============================================================================

#[derive(Serialize)]
struct LedgerFileRef<'a> {
    version: u32,
    snapshot: Option<&'a Snapshot>,
    trades: Vec<&'a Trade>,
    render_state: &'a RenderState,
}

#[derive(Deserialize)]
struct LedgerFile {
    version: u32,
    #[serde(default)]
    snapshot: Option<Snapshot>,
    #[serde(default)]
    trades: Vec<Trade>,
    #[serde(default)]
    render_state: RenderState,
}

// =============================================================================
// Store
// =============================================================================

/// Owns the ledger file location
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the ledger, or an empty one on first run.
    pub fn load(&self) -> Result<Ledger> {
        if !self.path.exists() {
            info!("No ledger at {}, starting empty", self.path.display());
            return Ok(Ledger::new());
        }

        let contents = std::fs::read(&self.path).map_err(|source| TickerError::InputRead {
            path: self.path.clone(),
            source,
        })?;
        let file: LedgerFile =
            serde_json::from_slice(&contents).map_err(|source| TickerError::LedgerCorrupt {
                path: self.path.clone(),
                source,
            })?;

        if file.version != LEDGER_VERSION {
            return Err(TickerError::LedgerVersion {
                path: self.path.clone(),
                found: file.version,
                expected: LEDGER_VERSION,
            });
        }

        let mut ledger = Ledger {
            snapshot: file.snapshot,
            render_state: file.render_state,
            ..Ledger::default()
        };
        for trade in file.trades {
            if ledger.contains(&trade.ticket) {
                warn!("Ledger file repeats ticket {}, keeping first entry", trade.ticket);
                continue;
            }
            ledger.insert(trade);
        }

        info!(
            "Loaded ledger {} ({} trades)",
            self.path.display(),
            ledger.len()
        );
        Ok(ledger)
    }

    pub fn encode(ledger: &Ledger) -> Result<Vec<u8>> {
        let file = LedgerFileRef {
            version: LEDGER_VERSION,
            snapshot: ledger.snapshot(),
            trades: ledger.trades().collect(),
            render_state: &ledger.render_state,
        };
        let mut bytes = serde_json::to_vec_pretty(&file)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Write the ledger to a temp file; it replaces the stored one on commit.
    pub fn stage(&self, ledger: &Ledger) -> Result<StagedFile> {
        StagedFile::stage(&self.path, &Self::encode(ledger)?)
    }

    pub fn save(&self, ledger: &Ledger) -> Result<()> {
        self.stage(ledger)?.commit()?;
        info!("Ledger saved: {} ({} trades)", self.path.display(), ledger.len());
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Money, Symbol};
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
    }

    fn trade(ticket: &str, profit: i64, closed_at: DateTime<Utc>) -> Trade {
        Trade {
            ticket: ticket.to_string(),
            symbol: Symbol::new("XAUUSD"),
            order_type: Some("BUY".to_string()),
            volume: Money::new(dec!(0.10)),
            profit: Money::from_i64(profit),
            commission: Money::ZERO,
            swap: Money::ZERO,
            comment: None,
            opened_at: None,
            closed_at,
            tp_label: None,
            sl_label: None,
            exit_reason: None,
        }
    }

    fn snapshot(balance: i64) -> Snapshot {
        Snapshot {
            timestamp: t0(),
            balance: Money::from_i64(balance),
            equity: Money::from_i64(balance),
            floating: Money::ZERO,
        }
    }

    #[test]
    fn test_merge_is_idempotent() {
        let batch = vec![trade("1", 50, t0()), trade("2", -5, t0() - Duration::hours(1))];

        let mut once = Ledger::new();
        once.merge(batch.clone(), Some(snapshot(1000)), DuplicatePolicy::KeepExisting)
            .unwrap();

        let mut twice = once.clone();
        let report = twice
            .merge(batch, Some(snapshot(1000)), DuplicatePolicy::KeepExisting)
            .unwrap();

        assert_eq!(report.added, 0);
        assert_eq!(report.duplicates, 2);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_trades_sorted_by_close_time_then_ticket() {
        let mut ledger = Ledger::new();
        ledger
            .merge(
                vec![
                    trade("b", 1, t0()),
                    trade("c", 1, t0() - Duration::hours(2)),
                    trade("a", 1, t0()),
                ],
                None,
                DuplicatePolicy::KeepExisting,
            )
            .unwrap();

        let order: Vec<&str> = ledger.trades().map(|t| t.ticket.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_conflicting_duplicate_keeps_stored_version() {
        let mut ledger = Ledger::new();
        ledger
            .merge(vec![trade("1", 50, t0())], None, DuplicatePolicy::KeepExisting)
            .unwrap();

        let report = ledger
            .merge(vec![trade("1", 99, t0())], None, DuplicatePolicy::KeepExisting)
            .unwrap();

        assert_eq!(report.conflicts, vec!["1".to_string()]);
        assert_eq!(ledger.get("1").unwrap().profit, Money::from_i64(50));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_abort_policy_rejects_conflict_without_mutation() {
        let mut ledger = Ledger::new();
        ledger
            .merge(vec![trade("1", 50, t0())], Some(snapshot(1000)), DuplicatePolicy::KeepExisting)
            .unwrap();
        let before = ledger.clone();

        let err = ledger
            .merge(
                vec![trade("2", 1, t0()), trade("1", 99, t0())],
                Some(snapshot(2000)),
                DuplicatePolicy::Abort,
            )
            .unwrap_err();

        assert!(matches!(err, TickerError::Integrity { ref ticket } if ticket == "1"));
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_snapshot_retained_when_none_parsed() {
        let mut ledger = Ledger::new();
        ledger
            .merge(vec![], Some(snapshot(1000)), DuplicatePolicy::KeepExisting)
            .unwrap();
        let report = ledger.merge(vec![], None, DuplicatePolicy::KeepExisting).unwrap();

        assert!(!report.snapshot_replaced);
        assert_eq!(ledger.snapshot().unwrap().balance, Money::from_i64(1000));
    }

    #[test]
    fn test_store_round_trip_preserves_decimals() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("ledger.json"));

        let mut ledger = Ledger::new();
        let mut precise = trade("1", 0, t0());
        precise.profit = Money::new(dec!(0.10000001));
        ledger
            .merge(vec![precise], Some(snapshot(1000)), DuplicatePolicy::KeepExisting)
            .unwrap();
        store.save(&ledger).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, ledger);
        assert_eq!(loaded.get("1").unwrap().profit.to_string(), "0.10000001");
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("absent.json"));
        let ledger = store.load().unwrap();
        assert!(ledger.is_empty());
        assert!(ledger.snapshot().is_none());
    }

    #[test]
    fn test_corrupt_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, b"{\"version\":1,\"trades\":[").unwrap();

        let err = LedgerStore::new(&path).load().unwrap_err();
        assert!(matches!(err, TickerError::LedgerCorrupt { .. }));
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, b"{\"version\":7}").unwrap();

        let err = LedgerStore::new(&path).load().unwrap_err();
        assert!(matches!(err, TickerError::LedgerVersion { found: 7, .. }));
    }

    #[test]
    fn test_unsaved_merge_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("ledger.json"));

        let mut ledger = Ledger::new();
        ledger
            .merge(vec![trade("1", 10, t0())], Some(snapshot(1000)), DuplicatePolicy::KeepExisting)
            .unwrap();
        store.save(&ledger).unwrap();
        let on_disk = std::fs::read(store.path()).unwrap();

        // Merge and stage, then "crash" before commit
        let mut next = store.load().unwrap();
        next.merge(vec![trade("2", 20, t0())], None, DuplicatePolicy::KeepExisting)
            .unwrap();
        let staged = store.stage(&next).unwrap();
        drop(staged);

        assert_eq!(std::fs::read(store.path()).unwrap(), on_disk);
        assert_eq!(store.load().unwrap().len(), 1);
    }
}
