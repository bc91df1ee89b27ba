//! Core data types shared by the parser, ledger, statistics and renderers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trading symbol using Arc<str> for cheap cloning
///
/// Symbols are cloned into every per-symbol bucket and trade summary, so a
/// shared string keeps the ranking pass allocation-free.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

/// Custom serde for Arc<str>
mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order direction as reported by the terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
    Other(String),
}

impl OrderSide {
    /// Normalise terminal order types such as `ORDER_TYPE_BUY` or `sell limit`.
    pub fn from_raw(raw: &str) -> Self {
        let upper = raw.trim().to_uppercase();
        if upper.contains("BUY") {
            OrderSide::Buy
        } else if upper.contains("SELL") {
            OrderSide::Sell
        } else {
            OrderSide::Other(upper)
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
            OrderSide::Other(raw) => write!(f, "{}", raw),
        }
    }
}

/// How a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitKind {
    #[serde(rename = "tp")]
    TakeProfit,
    #[serde(rename = "sl")]
    StopLoss,
    #[serde(rename = "manual")]
    Manual,
}

impl ExitKind {
    pub fn label(self) -> &'static str {
        match self {
            ExitKind::TakeProfit => "Exit: TP",
            ExitKind::StopLoss => "Exit: SL",
            ExitKind::Manual => "Exit: Manual",
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            ExitKind::TakeProfit => "tp",
            ExitKind::StopLoss => "sl",
            ExitKind::Manual => "manual",
        }
    }
}

const TP_REASON_HINTS: &[&str] = &["deal_reason_tp", "tp_hit", "takeprofit", "take profit", "target_tp"];
const SL_REASON_HINTS: &[&str] = &["deal_reason_sl", "sl_hit", "stoploss", "stop loss", "target_sl"];
const TP_COMMENT_HINTS: &[&str] = &["[tp", " tp", "tp ", "tp:", "tp-", "tp hit", "take profit"];
const SL_COMMENT_HINTS: &[&str] = &["[sl", " sl", "sl ", "sl:", "sl-", "sl hit", "stop loss"];

fn has_hint(value: Option<&str>, hints: &[&str]) -> bool {
    match value {
        Some(text) if !text.trim().is_empty() => {
            let text = text.trim().to_lowercase();
            hints.iter().any(|hint| text.contains(hint))
        }
        _ => false,
    }
}

/// A closed position. The ticket is the deduplication key of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub ticket: String,
    pub symbol: Symbol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_type: Option<String>,
    pub volume: Money,
    pub profit: Money,
    #[serde(default)]
    pub commission: Money,
    #[serde(default)]
    pub swap: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tp_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sl_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_reason: Option<String>,
}

impl Trade {
    pub fn side(&self) -> Option<OrderSide> {
        self.order_type
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .map(OrderSide::from_raw)
    }

    pub fn is_win(&self) -> bool {
        self.profit.is_positive()
    }

    pub fn is_loss(&self) -> bool {
        self.profit.is_negative()
    }

    /// Classify the exit. Take-profit evidence is checked before stop-loss.
    pub fn exit_kind(&self) -> ExitKind {
        let labelled = |label: &Option<String>| label.as_deref().is_some_and(|l| !l.is_empty());

        if labelled(&self.tp_label)
            || has_hint(self.exit_reason.as_deref(), TP_REASON_HINTS)
            || has_hint(self.comment.as_deref(), TP_COMMENT_HINTS)
        {
            return ExitKind::TakeProfit;
        }
        if labelled(&self.sl_label)
            || has_hint(self.exit_reason.as_deref(), SL_REASON_HINTS)
            || has_hint(self.comment.as_deref(), SL_COMMENT_HINTS)
        {
            return ExitKind::StopLoss;
        }
        ExitKind::Manual
    }
}

/// Point-in-time account reading. Only the newest one is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub balance: Money,
    pub equity: Money,
    #[serde(rename = "floating_pl")]
    pub floating: Money,
}

// ============================================================================
// Money Type - Precise Decimal Arithmetic for Monetary Values
// ============================================================================

use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub};
use std::str::FromStr;

/// Money type for precise decimal arithmetic in monetary calculations.
///
/// Wraps `rust_decimal::Decimal`. Ledger values are persisted as decimal
/// strings so that a trade read back from disk compares equal to the one
/// parsed from the terminal, run after run.
///
/// # Example
/// ```
/// use webticker::Money;
/// let a: Money = "0.1".parse().unwrap();
/// let b: Money = "0.2".parse().unwrap();
/// assert_eq!(a + b, "0.3".parse().unwrap());
/// ```
#[derive(Debug, Clone, Copy, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl Money {
    /// Zero value
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Money(value)
    }

    /// Create from i64 (for whole number values)
    pub fn from_i64(value: i64) -> Self {
        Money(Decimal::from(value))
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Strictly greater than zero
    pub fn is_positive(self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Strictly less than zero
    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Round to specified decimal places, midpoints away from zero
    pub fn round_dp(self, dp: u32) -> Self {
        Money(
            self.0
                .round_dp_with_strategy(dp, rust_decimal::RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Get the underlying Decimal
    pub fn inner(self) -> Decimal {
        self.0
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map(Money)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Money(value)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Money::from_i64(value)
    }
}

// PartialEq compares numeric value, so 50 and 50.00 are the same amount
impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Money {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl std::hash::Hash for Money {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.normalize().hash(state);
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + x)
    }
}

impl<'a> std::iter::Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + *x)
    }
}


#[cfg(test)]
mod trade_tests {
    use super::*;
    use chrono::TimeZone;

    fn trade() -> Trade {
        Trade {
            ticket: "1".to_string(),
            symbol: Symbol::new("XAUUSD"),
            order_type: Some("ORDER_TYPE_SELL".to_string()),
            volume: Money::from_i64(1),
            profit: Money::from_i64(10),
            commission: Money::ZERO,
            swap: Money::ZERO,
            comment: None,
            opened_at: None,
            closed_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            tp_label: None,
            sl_label: None,
            exit_reason: None,
        }
    }

    #[test]
    fn test_side_normalisation() {
        assert_eq!(trade().side(), Some(OrderSide::Sell));
        assert_eq!(OrderSide::from_raw("buy limit"), OrderSide::Buy);
        assert_eq!(OrderSide::from_raw("balance").to_string(), "BALANCE");
    }

    #[test]
    fn test_exit_kind_defaults_to_manual() {
        assert_eq!(trade().exit_kind(), ExitKind::Manual);
    }

    #[test]
    fn test_exit_kind_from_labels_and_hints() {
        let mut t = trade();
        t.sl_label = Some("SL1".to_string());
        assert_eq!(t.exit_kind(), ExitKind::StopLoss);

        t.comment = Some("[tp 2045.1]".to_string());
        assert_eq!(t.exit_kind(), ExitKind::TakeProfit);

        let mut t = trade();
        t.exit_reason = Some("DEAL_REASON_SL".to_string());
        assert_eq!(t.exit_kind(), ExitKind::StopLoss);
    }
}
