//! Trailing-window performance statistics
//!
//! Everything here is a pure function of the ledger's trades and a reference
//! instant `now`. Trades closing after `now` do not exist as far as a
//! computation is concerned, which keeps re-renders at a past `now`
//! reproducible.

use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ledger::Ledger;
use crate::types::{ExitKind, Money, Symbol, Trade};

// =============================================================================
// Windows
// =============================================================================

/// A trailing window ending at `now`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeWindow {
    pub key: &'static str,
    pub days: i64,
    pub label: &'static str,
}

impl TradeWindow {
    /// `now - days <= closed_at <= now`
    pub fn contains(&self, closed_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        closed_at >= now - Duration::days(self.days) && closed_at <= now
    }
}

pub const WEEK: TradeWindow = TradeWindow {
    key: "7d",
    days: 7,
    label: "Last 7 days",
};
pub const MONTH: TradeWindow = TradeWindow {
    key: "30d",
    days: 30,
    label: "Last 30 days",
};
pub const YEAR: TradeWindow = TradeWindow {
    key: "365d",
    days: 365,
    label: "Last 365 days",
};

pub const WINDOWS: [TradeWindow; 3] = [WEEK, MONTH, YEAR];

// =============================================================================
// Options
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsOptions {
    /// Symbols listed in each of the best/worst rankings
    pub ranking_depth: usize,
    /// Length of the most-recent trades list
    pub recent_trades: usize,
    /// Days covered by the daily breakdown
    pub daily_days: i64,
}

impl Default for StatsOptions {
    fn default() -> Self {
        Self {
            ranking_depth: 5,
            recent_trades: 10,
            daily_days: 7,
        }
    }
}

// =============================================================================
// Results
// =============================================================================

/// One trade as shown in lists and best/worst hints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeSummary {
    pub ticket: String,
    pub symbol: Symbol,
    pub side: Option<String>,
    pub volume: Money,
    pub profit: Money,
    pub commission: Money,
    pub swap: Money,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: DateTime<Utc>,
    pub exit: ExitKind,
    pub comment: Option<String>,
}

impl From<&Trade> for TradeSummary {
    fn from(trade: &Trade) -> Self {
        Self {
            ticket: trade.ticket.clone(),
            symbol: trade.symbol.clone(),
            side: trade.side().map(|s| s.to_string()),
            volume: trade.volume,
            profit: trade.profit,
            commission: trade.commission,
            swap: trade.swap,
            opened_at: trade.opened_at,
            closed_at: trade.closed_at,
            exit: trade.exit_kind(),
            comment: trade.comment.clone(),
        }
    }
}

/// Running totals for a group of trades
#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    profit: Money,
    count: usize,
    wins: usize,
    losses: usize,
}

impl Tally {
    fn add(&mut self, trade: &Trade) {
        self.profit += trade.profit;
        self.count += 1;
        if trade.is_win() {
            self.wins += 1;
        } else if trade.is_loss() {
            self.losses += 1;
        }
    }

    fn win_rate(&self) -> Decimal {
        win_rate(self.wins, self.count)
    }
}

/// Fraction of winning trades to 4 dp, midpoints away from zero; 0 for an empty group
pub fn win_rate(wins: usize, count: usize) -> Decimal {
    if count == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(wins as u64) / Decimal::from(count as u64))
        .round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WindowStats {
    pub profit: Money,
    pub trade_count: usize,
    pub wins: usize,
    pub losses: usize,
    /// 0..1
    #[serde(with = "rust_decimal::serde::str")]
    pub win_rate: Decimal,
    pub best_trade: Option<TradeSummary>,
    pub worst_trade: Option<TradeSummary>,
}

impl WindowStats {
    pub fn from_trades<'a>(trades: impl IntoIterator<Item = &'a Trade>) -> Self {
        let mut tally = Tally::default();
        let mut best: Option<&Trade> = None;
        let mut worst: Option<&Trade> = None;

        for trade in trades {
            tally.add(trade);
            // Later trades win ties for best, earlier ones for worst
            if best.map_or(true, |b| trade.profit >= b.profit) {
                best = Some(trade);
            }
            if worst.map_or(true, |w| trade.profit < w.profit) {
                worst = Some(trade);
            }
        }

        Self {
            profit: tally.profit,
            trade_count: tally.count,
            wins: tally.wins,
            losses: tally.losses,
            win_rate: tally.win_rate(),
            best_trade: best.map(TradeSummary::from),
            worst_trade: worst.map(TradeSummary::from),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WindowSet {
    #[serde(rename = "7d")]
    pub week: WindowStats,
    #[serde(rename = "30d")]
    pub month: WindowStats,
    #[serde(rename = "365d")]
    pub year: WindowStats,
}

impl WindowSet {
    pub fn get(&self, window: TradeWindow) -> &WindowStats {
        match window.key {
            "7d" => &self.week,
            "30d" => &self.month,
            _ => &self.year,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolStat {
    /// Position in the profit-descending ordering of all symbols
    pub rank: usize,
    pub symbol: Symbol,
    pub profit: Money,
    pub trade_count: usize,
    pub wins: usize,
    pub losses: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SymbolRanking {
    /// Highest aggregate profit first
    pub best: Vec<SymbolStat>,
    /// Lowest aggregate profit first
    pub worst: Vec<SymbolStat>,
}

/// Totals for one calendar bucket (day, month or year, UTC)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodStats {
    pub period: String,
    pub profit: Money,
    pub trade_count: usize,
    pub wins: usize,
    #[serde(with = "rust_decimal::serde::str")]
    pub win_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputedStats {
    pub computed_at: DateTime<Utc>,
    pub overall: WindowStats,
    pub windows: WindowSet,
    pub symbol_ranking: SymbolRanking,
    /// Most recent first
    pub last_trades: Vec<TradeSummary>,
    pub daily: Vec<PeriodStats>,
    pub monthly: Vec<PeriodStats>,
    pub yearly: Vec<PeriodStats>,
}

// =============================================================================
// Engine
// =============================================================================

/// Stateless calculator over the ledger's ordered trades
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsEngine {
    options: StatsOptions,
}

impl StatsEngine {
    pub fn new(options: StatsOptions) -> Self {
        Self { options }
    }

    pub fn compute(&self, ledger: &Ledger, now: DateTime<Utc>) -> ComputedStats {
        let trades: Vec<&Trade> = ledger.trades().collect();
        self.compute_sorted(&trades, now)
    }

    /// `trades` must be ordered by close time, ties by ticket.
    pub fn compute_sorted(&self, trades: &[&Trade], now: DateTime<Utc>) -> ComputedStats {
        // Sorted input: everything closed by `now` is a prefix
        let known = trades.partition_point(|t| t.closed_at <= now);
        let history = &trades[..known];

        let window = |w: TradeWindow| {
            WindowStats::from_trades(history.iter().copied().filter(|t| w.contains(t.closed_at, now)))
        };

        let daily_window = TradeWindow {
            key: "daily",
            days: self.options.daily_days,
            label: "Daily",
        };
        let daily_trades: Vec<&Trade> = history
            .iter()
            .copied()
            .filter(|t| daily_window.contains(t.closed_at, now))
            .collect();

        ComputedStats {
            computed_at: now,
            overall: WindowStats::from_trades(history.iter().copied()),
            windows: WindowSet {
                week: window(WEEK),
                month: window(MONTH),
                year: window(YEAR),
            },
            symbol_ranking: rank_symbols(history, self.options.ranking_depth),
            last_trades: history
                .iter()
                .rev()
                .take(self.options.recent_trades)
                .map(|t| TradeSummary::from(*t))
                .collect(),
            daily: breakdown(&daily_trades, "%Y-%m-%d"),
            monthly: breakdown(history, "%Y-%m"),
            yearly: breakdown(history, "%Y"),
        }
    }
}

/// Aggregate profit per symbol; ties are broken by symbol name.
pub fn rank_symbols(trades: &[&Trade], depth: usize) -> SymbolRanking {
    let mut buckets: HashMap<&Symbol, Tally> = HashMap::new();
    for trade in trades {
        buckets.entry(&trade.symbol).or_default().add(trade);
    }

    let ranked: Vec<SymbolStat> = buckets
        .into_iter()
        .sorted_by(|(sa, a), (sb, b)| b.profit.cmp(&a.profit).then_with(|| sa.cmp(sb)))
        .enumerate()
        .map(|(idx, (symbol, tally))| SymbolStat {
            rank: idx + 1,
            symbol: symbol.clone(),
            profit: tally.profit,
            trade_count: tally.count,
            wins: tally.wins,
            losses: tally.losses,
        })
        .collect();

    let worst = ranked
        .iter()
        .sorted_by(|a, b| a.profit.cmp(&b.profit).then_with(|| a.symbol.cmp(&b.symbol)))
        .take(depth)
        .cloned()
        .collect();
    let best = ranked.into_iter().take(depth).collect();

    SymbolRanking { best, worst }
}

/// Calendar buckets in ascending order. Input must be sorted by close time.
fn breakdown(trades: &[&Trade], key_format: &str) -> Vec<PeriodStats> {
    trades
        .iter()
        .chunk_by(|t| t.closed_at.format(key_format).to_string())
        .into_iter()
        .map(|(period, group)| {
            let mut tally = Tally::default();
            group.for_each(|t| tally.add(t));
            PeriodStats {
                period,
                profit: tally.profit,
                trade_count: tally.count,
                wins: tally.wins,
                win_rate: tally.win_rate(),
            }
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
    }

    fn trade(ticket: &str, symbol: &str, profit: Decimal, closed_at: DateTime<Utc>) -> Trade {
        Trade {
            ticket: ticket.to_string(),
            symbol: Symbol::new(symbol),
            order_type: Some("BUY".to_string()),
            volume: Money::new(dec!(0.1)),
            profit: Money::new(profit),
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

    fn compute(trades: &[Trade]) -> ComputedStats {
        let mut refs: Vec<&Trade> = trades.iter().collect();
        refs.sort_by(|a, b| a.closed_at.cmp(&b.closed_at).then_with(|| a.ticket.cmp(&b.ticket)));
        StatsEngine::default().compute_sorted(&refs, now())
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let on_edge = trade("1", "EURUSD", dec!(10), now() - Duration::days(7));
        let just_outside = trade(
            "2",
            "EURUSD",
            dec!(20),
            now() - Duration::days(7) - Duration::seconds(1),
        );
        let stats = compute(&[on_edge, just_outside]);

        assert_eq!(stats.windows.week.trade_count, 1);
        assert_eq!(stats.windows.week.profit, Money::new(dec!(10)));
        assert_eq!(stats.windows.month.trade_count, 2);
    }

    #[test]
    fn test_trades_after_now_are_ignored() {
        let future = trade("1", "EURUSD", dec!(10), now() + Duration::seconds(1));
        let stats = compute(&[future]);
        assert_eq!(stats.windows.week.trade_count, 0);
        assert_eq!(stats.overall.trade_count, 0);
        assert!(stats.last_trades.is_empty());
    }

    #[test]
    fn test_empty_window_has_zero_win_rate() {
        let stats = compute(&[]);
        assert_eq!(stats.windows.week.win_rate, Decimal::ZERO);
        assert_eq!(stats.windows.week.trade_count, 0);
        assert!(stats.windows.week.best_trade.is_none());
    }

    #[test]
    fn test_win_rate_and_counts() {
        let trades = vec![
            trade("1", "EURUSD", dec!(10), now() - Duration::hours(1)),
            trade("2", "EURUSD", dec!(-5), now() - Duration::hours(2)),
            trade("3", "EURUSD", dec!(0), now() - Duration::hours(3)),
        ];
        let stats = compute(&trades);
        let week = &stats.windows.week;

        assert_eq!(week.trade_count, 3);
        assert_eq!(week.wins, 1);
        assert_eq!(week.losses, 1);
        assert_eq!(week.win_rate, dec!(0.3333));
        assert_eq!(week.profit, Money::new(dec!(5)));
        assert_eq!(week.best_trade.as_ref().unwrap().ticket, "1");
        assert_eq!(week.worst_trade.as_ref().unwrap().ticket, "2");
    }

    #[test]
    fn test_win_rate_rounds_midpoint_away_from_zero() {
        assert_eq!(win_rate(1, 32), dec!(0.0313));
        assert_eq!(win_rate(3, 32), dec!(0.0938));
        assert_eq!(win_rate(0, 0), Decimal::ZERO);
    }

    #[test]
    fn test_symbol_ranking_breaks_ties_by_name() {
        let t = now() - Duration::hours(1);
        let trades = vec![
            trade("1", "XAUUSD", dec!(30), t),
            trade("2", "EURUSD", dec!(30), t),
            trade("3", "GBPUSD", dec!(-10), t),
            trade("4", "USDJPY", dec!(-10), t),
            trade("5", "BTCUSD", dec!(5), t),
        ];
        let refs: Vec<&Trade> = trades.iter().collect();
        let ranking = rank_symbols(&refs, 2);

        let best: Vec<&str> = ranking.best.iter().map(|s| s.symbol.as_str()).collect();
        let worst: Vec<&str> = ranking.worst.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(best, vec!["EURUSD", "XAUUSD"]);
        assert_eq!(worst, vec!["GBPUSD", "USDJPY"]);
        assert_eq!(ranking.best[0].rank, 1);
        assert_eq!(ranking.worst[0].rank, 4);
        assert_eq!(ranking.worst[1].rank, 5);
    }

    #[test]
    fn test_last_trades_most_recent_first() {
        let trades: Vec<Trade> = (0..15)
            .map(|i| {
                trade(
                    &format!("{:02}", i),
                    "EURUSD",
                    dec!(1),
                    now() - Duration::hours(15 - i),
                )
            })
            .collect();
        let stats = compute(&trades);

        assert_eq!(stats.last_trades.len(), 10);
        assert_eq!(stats.last_trades[0].ticket, "14");
        assert_eq!(stats.last_trades[9].ticket, "05");
    }

    #[test]
    fn test_calendar_breakdowns() {
        let trades = vec![
            trade("1", "EURUSD", dec!(10), Utc.with_ymd_and_hms(2025, 12, 31, 23, 0, 0).unwrap()),
            trade("2", "EURUSD", dec!(-4), Utc.with_ymd_and_hms(2026, 1, 2, 8, 0, 0).unwrap()),
            trade("3", "EURUSD", dec!(6), Utc.with_ymd_and_hms(2026, 1, 20, 8, 0, 0).unwrap()),
            trade("4", "EURUSD", dec!(1), now() - Duration::days(1)),
        ];
        let stats = compute(&trades);

        let months: Vec<&str> = stats.monthly.iter().map(|p| p.period.as_str()).collect();
        assert_eq!(months, vec!["2025-12", "2026-01", "2026-10"]);
        assert_eq!(stats.monthly[1].profit, Money::new(dec!(2)));
        assert_eq!(stats.monthly[1].win_rate, dec!(0.5));

        let years: Vec<&str> = stats.yearly.iter().map(|p| p.period.as_str()).collect();
        assert_eq!(years, vec!["2025", "2026"]);

        assert_eq!(stats.daily.len(), 1);
        assert_eq!(stats.daily[0].period, "2026-10-17");
    }

    #[test]
    fn test_compute_is_deterministic() {
        let t = now() - Duration::hours(1);
        let trades = vec![
            trade("1", "XAUUSD", dec!(30), t),
            trade("2", "EURUSD", dec!(30), t),
            trade("3", "GBPUSD", dec!(-10), t),
        ];
        let a = serde_json::to_string(&compute(&trades)).unwrap();
        let b = serde_json::to_string(&compute(&trades)).unwrap();
        assert_eq!(a, b);
    }
}
