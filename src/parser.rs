//! State log parsing
//!
//! The terminal appends one line per event to its state log:
//!
//! ```text
//! [2026.10.18 09:15:02] Goldjunge [WEB_TICKER] {"type":"trade","ticket":"4711",...}
//! [2026.10.18 09:15:02] Goldjunge [WEB_TICKER] {"type":"snapshot","balance":1000.0,...}
//! ```
//!
//! Lines without the `[WEB_TICKER]` tag are other terminal chatter and are
//! ignored. A tagged line that cannot be turned into a `Trade` or `Snapshot`
//! is skipped with a `ParseWarning`; one bad line never aborts a run.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{Result, TickerError};
use crate::types::{Money, Snapshot, Symbol, Trade};

// =============================================================================
// Constants
// =============================================================================

pub const WEB_TAG: &str = "[WEB_TICKER]";
const LOG_TIMESTAMP_FMT: &str = "%Y.%m.%d %H:%M:%S";
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    LOG_TIMESTAMP_FMT,
];
const UNKNOWN_SYMBOL: &str = "UNKNOWN";

// =============================================================================
// Parse Results
// =============================================================================

/// A tagged record that was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// 1-based line number in the decoded input
    pub line: usize,
    pub reason: String,
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)
    }
}

/// Everything one state log yielded
#[derive(Debug, Clone, Default)]
pub struct ParsedState {
    pub trades: Vec<Trade>,
    /// Newest snapshot by timestamp; on equal timestamps the later line wins
    pub snapshot: Option<Snapshot>,
    pub warnings: Vec<ParseWarning>,
    /// Number of tagged records seen, valid or not
    pub records: usize,
}

impl ParsedState {
    /// A run cannot render balance/equity without a snapshot.
    pub fn require_snapshot(&self, source: &Path) -> Result<&Snapshot> {
        self.snapshot.as_ref().ok_or_else(|| TickerError::NoSnapshot {
            path: source.to_path_buf(),
            skipped: self.warnings.len(),
        })
    }
}

// =============================================================================
// Parser
// =============================================================================

/// Parses state log text. Naive timestamps are read at a fixed UTC offset so
/// results never depend on the host's local time zone.
#[derive(Debug, Clone, Copy)]
pub struct StateParser {
    offset: FixedOffset,
}

impl Default for StateParser {
    fn default() -> Self {
        Self::new(Utc.fix())
    }
}

impl StateParser {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Read and parse a state log from disk.
    pub fn read_file(&self, path: &Path) -> Result<ParsedState> {
        if !path.exists() {
            return Err(TickerError::InputMissing {
                path: path.to_path_buf(),
            });
        }
        let raw = std::fs::read(path).map_err(|source| TickerError::InputRead {
            path: path.to_path_buf(),
            source,
        })?;
        let text = decode_state_bytes(&raw).ok_or_else(|| TickerError::Undecodable {
            path: path.to_path_buf(),
        })?;

        let parsed = self.parse_str(&text);
        info!(
            "Parsed {}: {} trades, snapshot={}, {} skipped",
            path.display(),
            parsed.trades.len(),
            parsed.snapshot.is_some(),
            parsed.warnings.len()
        );
        Ok(parsed)
    }

    pub fn parse_str(&self, text: &str) -> ParsedState {
        let mut state = ParsedState::default();

        for (idx, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim_start_matches('\u{feff}');
            if !line.contains(WEB_TAG) {
                continue;
            }
            state.records += 1;
            let line_no = idx + 1;

            match self.parse_record(line) {
                Ok(Record::Trade(trade)) => state.trades.push(trade),
                Ok(Record::Snapshot(snap)) => {
                    let newer = state
                        .snapshot
                        .as_ref()
                        .map_or(true, |current| snap.timestamp >= current.timestamp);
                    if newer {
                        state.snapshot = Some(snap);
                    }
                }
                Err(reason) => {
                    let warning = ParseWarning {
                        line: line_no,
                        reason,
                    };
                    warn!("Skipping state record: {}", warning);
                    state.warnings.push(warning);
                }
            }
        }

        debug!(
            "{} tagged records, {} trades, {} warnings",
            state.records,
            state.trades.len(),
            state.warnings.len()
        );
        state
    }

    fn parse_record(&self, line: &str) -> std::result::Result<Record, String> {
        let log_ts = self.parse_log_prefix(line)?;

        let tag_at = line.find(WEB_TAG).ok_or("missing tag")?;
        let json_start = line[tag_at..]
            .find('{')
            .map(|i| tag_at + i)
            .ok_or("no JSON payload after tag")?;
        let payload: Value = serde_json::from_str(line[json_start..].trim())
            .map_err(|e| format!("invalid JSON payload: {}", e))?;
        let obj = payload.as_object().ok_or("payload is not an object")?;

        match obj.get("type").and_then(Value::as_str) {
            Some("trade") => self.trade_from(obj, log_ts).map(Record::Trade),
            Some("snapshot") => self.snapshot_from(obj, log_ts).map(Record::Snapshot),
            Some(other) => Err(format!("unknown record type '{}'", other)),
            None => Err("record without type".to_string()),
        }
    }

    fn parse_log_prefix(&self, line: &str) -> std::result::Result<DateTime<Utc>, String> {
        let rest = line
            .strip_prefix('[')
            .ok_or_else(|| format!("line does not start with a timestamp: {}", preview(line)))?;
        let end = rest
            .find(']')
            .ok_or_else(|| format!("unterminated timestamp: {}", preview(line)))?;
        let naive = NaiveDateTime::parse_from_str(&rest[..end], LOG_TIMESTAMP_FMT)
            .map_err(|e| format!("bad log timestamp '{}': {}", &rest[..end], e))?;
        Ok(self.localize(naive))
    }

    fn trade_from(
        &self,
        obj: &Map<String, Value>,
        log_ts: DateTime<Utc>,
    ) -> std::result::Result<Trade, String> {
        let ticket = match obj.get("ticket") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) => ticket_from_number(n)?,
            _ => return Err("trade without ticket".to_string()),
        };

        let symbol = text_field(obj, &["symbol"]).unwrap_or_else(|| UNKNOWN_SYMBOL.to_string());

        Ok(Trade {
            ticket,
            symbol: Symbol::new(symbol),
            order_type: text_field(obj, &["order_type", "direction", "side"]),
            volume: decimal_field(obj, "volume")?.unwrap_or_default(),
            profit: decimal_field(obj, "profit")?.unwrap_or_default(),
            commission: decimal_field(obj, "commission")?.unwrap_or_default(),
            swap: decimal_field(obj, "swap")?.unwrap_or_default(),
            comment: text_field(obj, &["comment", "label"]),
            opened_at: self.time_field(obj, "opened_at")?,
            closed_at: self.time_field(obj, "closed_at")?.unwrap_or(log_ts),
            tp_label: text_field(obj, &["tp_label"]),
            sl_label: text_field(obj, &["sl_label"]),
            exit_reason: text_field(obj, &["exit_reason"]),
        })
    }

    fn snapshot_from(
        &self,
        obj: &Map<String, Value>,
        log_ts: DateTime<Utc>,
    ) -> std::result::Result<Snapshot, String> {
        let balance = decimal_field(obj, "balance")?.ok_or("snapshot without balance")?;
        let equity = decimal_field(obj, "equity")?.ok_or("snapshot without equity")?;
        let floating = match decimal_field(obj, "floating")? {
            Some(v) => v,
            None => decimal_field(obj, "floating_pl")?.unwrap_or_default(),
        };

        Ok(Snapshot {
            timestamp: self.time_field(obj, "timestamp")?.unwrap_or(log_ts),
            balance,
            equity,
            floating,
        })
    }

    fn time_field(
        &self,
        obj: &Map<String, Value>,
        key: &str,
    ) -> std::result::Result<Option<DateTime<Utc>>, String> {
        match obj.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => self
                .parse_time(s)
                .map(Some)
                .ok_or_else(|| format!("bad {} '{}'", key, s)),
            Some(other) => Err(format!("bad {}: {}", key, other)),
        }
    }

    /// RFC 3339 with an explicit offset is honoured; anything naive is read
    /// at the configured fixed offset.
    pub fn parse_time(&self, value: &str) -> Option<DateTime<Utc>> {
        let value = value.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
            .map(|naive| self.localize(naive))
    }

    fn localize(&self, naive: NaiveDateTime) -> DateTime<Utc> {
        // A fixed offset has no gaps or folds, so the mapping is always unique
        self.offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
    }
}

enum Record {
    Trade(Trade),
    Snapshot(Snapshot),
}

// =============================================================================
// Field Helpers
// =============================================================================

fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Numeric tickets must be whole; `4711.0` and `4711` are the same ticket.
fn ticket_from_number(n: &Number) -> std::result::Result<String, String> {
    let text = n.to_string();
    let value = text
        .parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| format!("bad ticket {}", text))?;
    if !value.fract().is_zero() || value.is_sign_negative() {
        return Err(format!("ticket {} is not a whole number", text));
    }
    Ok(value.trunc().normalize().to_string())
}

/// Numbers are taken from their JSON text so `0.1` stays exactly `0.1`.
fn decimal_field(obj: &Map<String, Value>, key: &str) -> std::result::Result<Option<Money>, String> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .to_string()
            .parse::<Money>()
            .map(Some)
            .map_err(|e| format!("bad {} {}: {}", key, n, e)),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .parse::<Money>()
            .map(Some)
            .map_err(|e| format!("bad {} '{}': {}", key, s, e)),
        Some(other) => Err(format!("bad {}: {}", key, other)),
    }
}

fn preview(line: &str) -> String {
    line.chars().take(40).collect()
}

// =============================================================================
// Decoding
// =============================================================================

/// The terminal writes UTF-16LE; copies made by other tools are often UTF-8.
pub fn decode_state_bytes(raw: &[u8]) -> Option<String> {
    if let Some(rest) = raw.strip_prefix(&[0xFF, 0xFE]) {
        return decode_utf16le(rest);
    }
    if let Some(rest) = raw.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8(rest.to_vec()).ok();
    }
    if looks_like_utf16le(raw) {
        return decode_utf16le(raw);
    }
    String::from_utf8(raw.to_vec()).ok()
}

fn looks_like_utf16le(raw: &[u8]) -> bool {
    if raw.len() < 2 || raw.len() % 2 != 0 {
        return false;
    }
    let sample: Vec<&[u8]> = raw.chunks_exact(2).take(64).collect();
    let high_zero = sample.iter().filter(|pair| pair[1] == 0 && pair[0] != 0).count();
    high_zero * 2 > sample.len()
}

fn decode_utf16le(raw: &[u8]) -> Option<String> {
    if raw.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const TRADE_LINE: &str = r#"[2026.10.18 09:15:02] Goldjunge [WEB_TICKER] {"type":"trade","ticket":4711,"symbol":"XAUUSD","volume":0.1,"profit":50.12,"commission":-0.7,"swap":0,"order_type":"ORDER_TYPE_BUY","comment":"[tp 2045]","opened_at":"2026-10-18T08:00:00Z","closed_at":"2026-10-18T09:15:00Z"}"#;
    const SNAPSHOT_LINE: &str = r#"[2026.10.18 09:15:02] Goldjunge [WEB_TICKER] {"type":"snapshot","balance":1000.0,"equity":1012.5,"floating":12.5}"#;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_parse_trade_and_snapshot() {
        let text = format!("{}\n{}\n", TRADE_LINE, SNAPSHOT_LINE);
        let parsed = StateParser::default().parse_str(&text);

        assert!(parsed.warnings.is_empty());
        assert_eq!(parsed.records, 2);
        assert_eq!(parsed.trades.len(), 1);

        let trade = &parsed.trades[0];
        assert_eq!(trade.ticket, "4711");
        assert_eq!(trade.symbol.as_str(), "XAUUSD");
        assert_eq!(trade.profit, Money::new(dec!(50.12)));
        assert_eq!(trade.commission, Money::new(dec!(-0.7)));
        assert_eq!(trade.closed_at, utc("2026-10-18T09:15:00Z"));
        assert_eq!(trade.comment.as_deref(), Some("[tp 2045]"));

        let snap = parsed.snapshot.unwrap();
        assert_eq!(snap.balance, Money::from_i64(1000));
        assert_eq!(snap.equity, Money::new(dec!(1012.5)));
        // Falls back to the log timestamp
        assert_eq!(snap.timestamp, utc("2026-10-18T09:15:02Z"));
    }

    #[test]
    fn test_untagged_lines_are_ignored() {
        let text = "[2026.10.18 09:00:00] EA started\nrandom noise\n";
        let parsed = StateParser::default().parse_str(text);
        assert_eq!(parsed.records, 0);
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_malformed_records_are_skipped() {
        let text = [
            "[2026.10.18 09:00:00] [WEB_TICKER] {not json",
            "no timestamp [WEB_TICKER] {\"type\":\"snapshot\",\"balance\":1,\"equity\":1}",
            "[2026.10.18 09:00:00] [WEB_TICKER] {\"type\":\"trade\",\"symbol\":\"EURUSD\"}",
            "[2026.10.18 09:00:00] [WEB_TICKER] {\"type\":\"trade\",\"ticket\":\"9\",\"profit\":\"abc\"}",
            "[2026.10.18 09:00:00] [WEB_TICKER] {\"type\":\"heartbeat\"}",
            SNAPSHOT_LINE,
        ]
        .join("\n");

        let parsed = StateParser::default().parse_str(&text);
        assert_eq!(parsed.records, 6);
        assert_eq!(parsed.warnings.len(), 5);
        assert_eq!(parsed.warnings[0].line, 1);
        assert_eq!(parsed.warnings[4].line, 5);
        assert!(parsed.trades.is_empty());
        assert!(parsed.snapshot.is_some());
    }

    #[test]
    fn test_missing_snapshot_is_fatal() {
        let parsed = StateParser::default().parse_str(TRADE_LINE);
        let err = parsed.require_snapshot(Path::new("state.log")).unwrap_err();
        assert!(matches!(err, TickerError::NoSnapshot { .. }));
    }

    #[test]
    fn test_newest_snapshot_wins() {
        let text = [
            r#"[2026.10.18 10:00:00] [WEB_TICKER] {"type":"snapshot","balance":2000,"equity":2000}"#,
            r#"[2026.10.18 09:00:00] [WEB_TICKER] {"type":"snapshot","balance":1000,"equity":1000}"#,
        ]
        .join("\n");
        let parsed = StateParser::default().parse_str(&text);
        assert_eq!(parsed.snapshot.unwrap().balance, Money::from_i64(2000));
    }

    #[test]
    fn test_naive_timestamps_use_fixed_offset() {
        let parser = StateParser::new(FixedOffset::east_opt(2 * 3600).unwrap());
        let text = r#"[2026.10.18 12:00:00] [WEB_TICKER] {"type":"trade","ticket":"1","closed_at":"2026-10-18 11:30:00"}"#;
        let parsed = parser.parse_str(text);
        assert_eq!(parsed.trades[0].closed_at, utc("2026-10-18T09:30:00Z"));

        // Explicit offsets are not shifted again
        assert_eq!(
            parser.parse_time("2026-10-18T11:30:00+00:00"),
            Some(utc("2026-10-18T11:30:00Z"))
        );
    }

    #[test]
    fn test_decode_utf16le_with_and_without_bom() {
        let text = format!("{}\n", SNAPSHOT_LINE);
        let mut bytes: Vec<u8> = text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();

        let decoded = decode_state_bytes(&bytes).unwrap();
        assert_eq!(decoded, text);

        let mut with_bom = vec![0xFF, 0xFE];
        with_bom.append(&mut bytes);
        let decoded = decode_state_bytes(&with_bom).unwrap();
        assert_eq!(decoded, text);
    }

    #[test]
    fn test_decode_utf8_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(SNAPSHOT_LINE.as_bytes());
        let decoded = decode_state_bytes(&bytes).unwrap();
        assert!(decoded.starts_with('['));
    }

    #[test]
    fn test_long_fraction_kept_exactly() {
        let line = r#"[2026.10.18 09:15:02] [WEB_TICKER] {"type":"trade","ticket":"9","symbol":"BTCUSD","volume":0.01,"profit":12345678.123456789,"closed_at":"2026-10-18T09:15:00Z"}"#;
        let parsed = StateParser::default().parse_str(line);

        assert!(parsed.warnings.is_empty());
        assert_eq!(parsed.trades[0].profit.to_string(), "12345678.123456789");
        assert_eq!(parsed.trades[0].volume.to_string(), "0.01");
    }

    #[test]
    fn test_float_ticket_matches_integer_ticket() {
        let as_float = TRADE_LINE.replace("\"ticket\":4711,", "\"ticket\":4711.0,");
        let parsed = StateParser::default().parse_str(&as_float);
        assert_eq!(parsed.trades[0].ticket, "4711");

        let parsed = StateParser::default().parse_str(TRADE_LINE);
        assert_eq!(parsed.trades[0].ticket, "4711");
    }

    #[test]
    fn test_fractional_ticket_is_skipped() {
        let bad = TRADE_LINE.replace("\"ticket\":4711,", "\"ticket\":4711.5,");
        let parsed = StateParser::default().parse_str(&bad);
        assert!(parsed.trades.is_empty());
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn test_read_missing_file() {
        let err = StateParser::default()
            .read_file(Path::new("/definitely/not/here.log"))
            .unwrap_err();
        assert!(matches!(err, TickerError::InputMissing { .. }));
    }
}
