//! Account statement import
//!
//! Seeds the ledger from the terminal's account history, for trades that
//! closed before the ticker started logging. Two formats are read: the HTML
//! account report the terminal saves (usually UTF-16LE) and a plain CSV
//! export. Rows are turned into the same `Trade` values the state log parser
//! produces, so the regular merge deduplicates them against the ledger.

use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{Result, TickerError};
use crate::parser::{decode_state_bytes, StateParser};
use crate::types::{Money, Symbol, Trade};

/// First cell of the column header row in the HTML report
const REPORT_HEADER: &str = "zeit";
/// Sections after the closed positions
const REPORT_SECTION_ENDS: &[&str] = &["Ergebnisse", "Balanceoperationen"];
const REPORT_HEADER_MIN_CELLS: usize = 7;
const REPORT_ROW_MIN_CELLS: usize = 14;

// Column positions in a closed-position row
const COL_OPENED: usize = 0;
const COL_TICKET: usize = 1;
const COL_SYMBOL: usize = 2;
const COL_TYPE: usize = 3;
const COL_COMMENT: usize = 4;
const COL_VOLUME: usize = 5;
const COL_CLOSED: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementFormat {
    Html,
    Csv,
}

impl StatementFormat {
    /// `.htm`/`.html` files and anything containing a table are HTML, the rest CSV.
    pub fn detect(path: &Path, text: &str) -> Self {
        let by_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("htm") || e.eq_ignore_ascii_case("html"))
            .unwrap_or(false);
        if by_extension || text.to_ascii_lowercase().contains("<table") {
            StatementFormat::Html
        } else {
            StatementFormat::Csv
        }
    }
}

/// One CSV row. Only `ticket`, `symbol`, `volume`, `closed_at` and `profit` are required.
#[derive(Debug, Deserialize)]
struct StatementRow {
    ticket: String,
    symbol: String,
    #[serde(default)]
    order_type: Option<String>,
    volume: String,
    #[serde(default)]
    opened_at: Option<String>,
    closed_at: String,
    profit: String,
    #[serde(default)]
    commission: Option<String>,
    #[serde(default)]
    swap: Option<String>,
    #[serde(default)]
    comment: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn selector(css: &str) -> std::result::Result<Selector, String> {
    Selector::parse(css).map_err(|e| format!("selector '{}': {:?}", css, e))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().map(str::trim).collect::<String>()
}

/// Report numbers use `,` as decimal separator and may carry grouping
/// spaces: `1 234,56` reads as `1234.56`.
fn report_number(raw: &str) -> Option<Money> {
    let cleaned: String = raw
        .replace(',', ".")
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-' || *c == '.')
        .collect();
    cleaned.parse::<Money>().ok()
}

/// Reads account statements; naive timestamps use the parser's offset
pub struct StatementImporter {
    times: StateParser,
}

impl StatementImporter {
    pub fn new(times: StateParser) -> Self {
        Self { times }
    }

    /// Decode the file and read it in its detected format.
    pub fn read_file(&self, path: &Path) -> Result<Vec<Trade>> {
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

        let format = StatementFormat::detect(path, &text);
        let trades = match format {
            StatementFormat::Html => self.parse_html(&text),
            StatementFormat::Csv => self.parse_csv(&text),
        }
        .map_err(|message| TickerError::Statement {
            path: path.to_path_buf(),
            message,
        })?;

        info!(
            "Read {} trades from {:?} statement {}",
            trades.len(),
            format,
            path.display()
        );
        Ok(trades)
    }

    /// Closed positions from the HTML account report.
    ///
    /// Rows between the `Zeit` header and the next section are read; short
    /// rows are layout and rows with unreadable times or numbers are skipped.
    pub fn parse_html(&self, text: &str) -> std::result::Result<Vec<Trade>, String> {
        let document = Html::parse_document(text);
        let table_sel = selector("table")?;
        let row_sel = selector("tr")?;
        let cell_sel = selector("td, th")?;

        let table = document
            .select(&table_sel)
            .next()
            .ok_or_else(|| "no table in report".to_string())?;
        let rows: Vec<Vec<String>> = table
            .select(&row_sel)
            .map(|row| row.select(&cell_sel).map(cell_text).collect())
            .collect();

        let header = rows
            .iter()
            .position(|cells| {
                cells.len() >= REPORT_HEADER_MIN_CELLS
                    && cells[0].to_lowercase().starts_with(REPORT_HEADER)
            })
            .ok_or_else(|| "column header 'Zeit' not found".to_string())?;

        let mut trades = Vec::new();
        let mut skipped = 0usize;
        for cells in &rows[header + 1..] {
            let first = match cells.first() {
                Some(first) => first,
                None => break,
            };
            if REPORT_SECTION_ENDS.iter().any(|end| first.starts_with(end)) {
                break;
            }
            if cells.len() < REPORT_ROW_MIN_CELLS {
                continue;
            }
            match self.report_trade(cells) {
                Ok(trade) => trades.push(trade),
                Err(reason) => {
                    warn!("Skipping report row: {}", reason);
                    skipped += 1;
                }
            }
        }
        if skipped > 0 {
            warn!("{} report rows skipped", skipped);
        }
        Ok(trades)
    }

    fn report_trade(&self, cells: &[String]) -> std::result::Result<Trade, String> {
        let time = |idx: usize| {
            self.times
                .parse_time(&cells[idx])
                .ok_or_else(|| format!("bad time '{}'", cells[idx]))
        };
        let number = |name: &str, raw: &str| {
            report_number(raw).ok_or_else(|| format!("bad {} '{}'", name, raw))
        };

        let ticket = cells[COL_TICKET].clone();
        if ticket.is_empty() {
            return Err("empty ticket".to_string());
        }
        let opened_at = time(COL_OPENED)?;
        let closed_at = time(COL_CLOSED)?;
        let profit_raw = cells.last().map(String::as_str).unwrap_or_default();

        Ok(Trade {
            ticket,
            symbol: Symbol::new(cells[COL_SYMBOL].to_uppercase()),
            order_type: non_empty(Some(cells[COL_TYPE].clone())),
            volume: number("volume", &cells[COL_VOLUME])?,
            profit: number("profit", profit_raw)?,
            commission: Money::ZERO,
            swap: Money::ZERO,
            comment: non_empty(Some(cells[COL_COMMENT].clone())),
            opened_at: Some(opened_at),
            closed_at,
            tp_label: None,
            sl_label: None,
            exit_reason: None,
        })
    }

    /// Every CSV row; any bad row fails the import with its line number.
    pub fn parse_csv(&self, text: &str) -> std::result::Result<Vec<Trade>, String> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut trades = Vec::new();
        for (idx, result) in reader.deserialize::<StatementRow>().enumerate() {
            // Header is line 1
            let line = idx + 2;
            let row = result.map_err(|e| format!("line {}: {}", line, e))?;
            let trade = self
                .trade_from(row)
                .map_err(|e| format!("line {}: {}", line, e))?;
            trades.push(trade);
        }
        Ok(trades)
    }

    fn trade_from(&self, row: StatementRow) -> std::result::Result<Trade, String> {
        let money = |name: &str, raw: &str| {
            raw.parse::<Money>()
                .map_err(|e| format!("bad {} '{}': {}", name, raw, e))
        };
        let optional_money = |name: &str, raw: Option<String>| match non_empty(raw) {
            Some(raw) => money(name, &raw),
            None => Ok(Money::ZERO),
        };

        if row.ticket.is_empty() {
            return Err("empty ticket".to_string());
        }
        let closed_at = self
            .times
            .parse_time(&row.closed_at)
            .ok_or_else(|| format!("bad closed_at '{}'", row.closed_at))?;
        let opened_at = match non_empty(row.opened_at) {
            Some(raw) => Some(
                self.times
                    .parse_time(&raw)
                    .ok_or_else(|| format!("bad opened_at '{}'", raw))?,
            ),
            None => None,
        };

        Ok(Trade {
            ticket: row.ticket,
            symbol: Symbol::new(row.symbol.to_uppercase()),
            order_type: non_empty(row.order_type),
            volume: money("volume", &row.volume)?,
            profit: money("profit", &row.profit)?,
            commission: optional_money("commission", row.commission)?,
            swap: optional_money("swap", row.swap)?,
            comment: non_empty(row.comment),
            opened_at,
            closed_at,
            tp_label: None,
            sl_label: None,
            exit_reason: None,
        })
    }
}
