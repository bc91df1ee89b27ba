//! Structured report document
//!
//! The JSON document is the single source for every rendered artifact: the
//! dashboard is derived from it alone, so it must carry everything a reader
//! sees. Field order is fixed by the struct layout and all numbers are rounded
//! before serialization, which makes two renders of the same inputs
//! byte-identical.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, TickerError};
use crate::ledger::Ledger;
use crate::pause::RenderableStats;
use crate::stats::{
    win_rate, PeriodStats, SymbolRanking, SymbolStat, TradeSummary, WindowSet, WindowStats,
};
use crate::types::{ExitKind, Money, Snapshot, Symbol};

/// Money and volume precision in rendered output
pub const MONEY_DP: u32 = 2;
/// Win-rate precision in rendered output
pub const RATE_DP: u32 = 4;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn money(value: Money) -> Decimal {
    value.round_dp(MONEY_DP).inner().normalize()
}

fn rate(value: Decimal) -> Decimal {
    value
        .round_dp_with_strategy(RATE_DP, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}

// =============================================================================
// Document
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMeta {
    pub bot: String,
    pub generated_at: String,
    pub stats_computed_at: String,
    pub ledger_trades: usize,
    pub trade_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDoc {
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub equity: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub floating_pl: Decimal,
    pub timestamp: String,
}

impl From<&Snapshot> for SnapshotDoc {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            balance: money(snapshot.balance),
            equity: money(snapshot.equity),
            floating_pl: money(snapshot.floating),
            timestamp: format_timestamp(snapshot.timestamp),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeDoc {
    pub ticket: String,
    pub symbol: Symbol,
    pub side: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub volume: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub profit: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub commission: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub swap: Decimal,
    pub opened_at: Option<String>,
    pub closed_at: String,
    pub exit: ExitKind,
    pub comment: Option<String>,
}

impl From<&TradeSummary> for TradeDoc {
    fn from(t: &TradeSummary) -> Self {
        Self {
            ticket: t.ticket.clone(),
            symbol: t.symbol.clone(),
            side: t.side.clone(),
            volume: money(t.volume),
            profit: money(t.profit),
            commission: money(t.commission),
            swap: money(t.swap),
            opened_at: t.opened_at.map(format_timestamp),
            closed_at: format_timestamp(t.closed_at),
            exit: t.exit,
            comment: t.comment.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowDoc {
    #[serde(with = "rust_decimal::serde::float")]
    pub profit: Decimal,
    pub trade_count: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub win_rate: Decimal,
    pub wins: usize,
    pub losses: usize,
    pub best_trade: Option<TradeDoc>,
    pub worst_trade: Option<TradeDoc>,
}

impl From<&WindowStats> for WindowDoc {
    fn from(w: &WindowStats) -> Self {
        Self {
            profit: money(w.profit),
            trade_count: w.trade_count,
            win_rate: rate(w.win_rate),
            wins: w.wins,
            losses: w.losses,
            best_trade: w.best_trade.as_ref().map(TradeDoc::from),
            worst_trade: w.worst_trade.as_ref().map(TradeDoc::from),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowsDoc {
    #[serde(rename = "7d")]
    pub week: WindowDoc,
    #[serde(rename = "30d")]
    pub month: WindowDoc,
    #[serde(rename = "365d")]
    pub year: WindowDoc,
}

impl From<&WindowSet> for WindowsDoc {
    fn from(w: &WindowSet) -> Self {
        Self {
            week: WindowDoc::from(&w.week),
            month: WindowDoc::from(&w.month),
            year: WindowDoc::from(&w.year),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolDoc {
    pub rank: usize,
    pub symbol: Symbol,
    #[serde(with = "rust_decimal::serde::float")]
    pub profit: Decimal,
    pub trade_count: usize,
    pub wins: usize,
    pub losses: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub win_rate: Decimal,
}

impl From<&SymbolStat> for SymbolDoc {
    fn from(s: &SymbolStat) -> Self {
        Self {
            rank: s.rank,
            symbol: s.symbol.clone(),
            profit: money(s.profit),
            trade_count: s.trade_count,
            wins: s.wins,
            losses: s.losses,
            win_rate: rate(win_rate(s.wins, s.trade_count)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingDoc {
    pub best: Vec<SymbolDoc>,
    pub worst: Vec<SymbolDoc>,
}

impl From<&SymbolRanking> for RankingDoc {
    fn from(r: &SymbolRanking) -> Self {
        Self {
            best: r.best.iter().map(SymbolDoc::from).collect(),
            worst: r.worst.iter().map(SymbolDoc::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodDoc {
    pub period: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub profit: Decimal,
    pub trade_count: usize,
    pub wins: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub win_rate: Decimal,
}

impl From<&PeriodStats> for PeriodDoc {
    fn from(p: &PeriodStats) -> Self {
        Self {
            period: p.period.clone(),
            profit: money(p.profit),
            trade_count: p.trade_count,
            wins: p.wins,
            win_rate: rate(p.win_rate),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauseDoc {
    pub active: bool,
    pub message: Option<String>,
    pub since: Option<String>,
}

/// The machine-readable output of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub meta: ReportMeta,
    pub snapshot: Option<SnapshotDoc>,
    pub overall: WindowDoc,
    pub windows: WindowsDoc,
    pub symbol_ranking: RankingDoc,
    pub last_trades: Vec<TradeDoc>,
    pub daily: Vec<PeriodDoc>,
    pub monthly: Vec<PeriodDoc>,
    pub yearly: Vec<PeriodDoc>,
    pub pause: PauseDoc,
}

impl ReportDocument {
    /// Project ledger, gated statistics and run metadata into a document.
    pub fn build(
        bot: &str,
        ledger: &Ledger,
        renderable: &RenderableStats,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let stats = &renderable.stats;
        let pause = match &renderable.banner {
            Some(banner) => PauseDoc {
                active: true,
                message: Some(banner.message.clone()),
                since: Some(format_timestamp(banner.since)),
            },
            None => PauseDoc {
                active: false,
                message: None,
                since: None,
            },
        };

        Self {
            meta: ReportMeta {
                bot: bot.to_string(),
                generated_at: format_timestamp(generated_at),
                stats_computed_at: format_timestamp(stats.computed_at),
                ledger_trades: ledger.len(),
                trade_active: renderable.banner.is_none(),
            },
            snapshot: ledger.snapshot().map(SnapshotDoc::from),
            overall: WindowDoc::from(&stats.overall),
            windows: WindowsDoc::from(&stats.windows),
            symbol_ranking: RankingDoc::from(&stats.symbol_ranking),
            last_trades: stats.last_trades.iter().map(TradeDoc::from).collect(),
            daily: stats.daily.iter().map(PeriodDoc::from).collect(),
            monthly: stats.monthly.iter().map(PeriodDoc::from).collect(),
            yearly: stats.yearly.iter().map(PeriodDoc::from).collect(),
            pause,
        }
    }

    /// Serialized bytes, newline-terminated.
    pub fn to_json(&self, pretty: bool) -> Result<String> {
        let mut out = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        out.push('\n');
        Ok(out)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a previously written document.
    pub fn read_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TickerError::InputMissing {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path).map_err(|source| TickerError::InputRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }
}
