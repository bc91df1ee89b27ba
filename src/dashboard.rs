//! Static HTML dashboard
//!
//! Rendered from a `ReportDocument` only, so the `render` command can rebuild
//! it from a published JSON file. The page is self-contained: inline CSS, no
//! scripts, every dynamic string escaped.

use itertools::Itertools;
use rust_decimal::Decimal;

use crate::report::{PeriodDoc, ReportDocument, SymbolDoc, TradeDoc, WindowDoc};
use crate::stats::WINDOWS;

const STYLE: &str = r#"
    body { font-family: 'Inter', Arial, sans-serif; margin: 0; padding: 24px; background: #070c16; color: #f5f6fb; }
    h1 { margin: 0 0 12px; font-size: 1.8rem; }
    h2 { margin: 0 0 12px; font-size: 1.4rem; }
    .meta { color: #9aa3c1; margin-bottom: 20px; }
    .banner { padding: 14px 18px; border-radius: 10px; margin-bottom: 20px; font-weight: 600; }
    .banner.paused { background: #402726; border: 1px solid #f87171; color: #fcd9d7; }
    .cards { display: grid; grid-template-columns: repeat(auto-fit,minmax(160px,1fr)); gap: 16px; margin-bottom: 30px; }
    .card { background: #11162a; border-radius: 12px; padding: 16px; }
    .card .label, .stat-card .label { color: #9aa3c1; font-size: 0.85rem; margin-bottom: 6px; }
    .card .value { font-size: 1.4rem; font-weight: 600; }
    .stat-grid { display: grid; grid-template-columns: repeat(auto-fit,minmax(200px,1fr)); gap: 14px; }
    .stat-card { background: #11162a; border-radius: 12px; padding: 16px; }
    .stat-card .value { font-size: 1.2rem; font-weight: 600; margin-bottom: 6px; }
    .stat-card .meta-line { color: #8b93b3; font-size: 0.85rem; }
    .sub-line { font-size: 0.8rem; margin-top: 6px; color: #8d95b6; }
    .pos { color: #4ade80; }
    .neg { color: #f87171; }
    .section { margin-bottom: 36px; }
    table { width: 100%; border-collapse: collapse; background: #11162a; }
    th, td { padding: 10px 12px; text-align: left; }
    th { background: #1b2340; font-weight: 500; }
    tr:nth-child(even) td { background: #151c32; }
    .num { text-align: right; font-variant-numeric: tabular-nums; }
    .trade-list { display: flex; flex-direction: column; gap: 14px; }
    .trade-row { display: grid; grid-template-columns: repeat(auto-fit,minmax(200px,1fr)); gap: 12px; }
    .trade-card { background: #11162a; border-radius: 12px; padding: 14px; }
    .trade-top { font-weight: 600; margin-bottom: 4px; }
    .side { font-weight: 600; }
    .side.buy { color: #60a5fa; }
    .side.sell { color: #f87171; }
    .trade-meta { font-size: 0.8rem; color: #8d95b6; }
    .exit { font-weight: 600; }
    .exit.tp { color: #4ade80; }
    .exit.sl { color: #f87171; }
    .muted { color: #8d95b6; font-size: 0.9rem; }
"#;

const TRADES_PER_ROW: usize = 5;

/// Escape text for element content and quoted attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Two decimals with non-breaking-space thousands groups, e.g. `-1 234.50`
pub fn fmt_money(value: Decimal) -> String {
    let rounded = value
        .round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
        .abs();
    let text = format!("{:.2}", rounded);
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let grouped = int_part
        .as_bytes()
        .rchunks(3)
        .rev()
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .join("\u{a0}");

    let sign = if value.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{}{}.{}", sign, grouped, frac_part)
}

/// Win rate in 0..1 as a percentage with two decimals
pub fn fmt_pct(rate: Decimal) -> String {
    let pct = (rate * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero);
    format!("{:.2}%", pct)
}

fn profit_class(value: Decimal) -> &'static str {
    if value.is_sign_negative() && !value.is_zero() {
        "neg"
    } else {
        "pos"
    }
}

fn side_markup(side: Option<&str>) -> Option<String> {
    let side = side.filter(|s| !s.is_empty())?;
    let class = match side {
        "BUY" => "buy",
        "SELL" => "sell",
        _ => "",
    };
    Some(format!(
        "<span class=\"side {}\">{}</span>",
        class,
        escape(side)
    ))
}

fn trade_card(trade: &TradeDoc) -> String {
    let mut top = escape(trade.symbol.as_str());
    if let Some(side) = side_markup(trade.side.as_deref()) {
        top.push_str(" · ");
        top.push_str(&side);
    }
    format!(
        "<div class=\"trade-card\">\
         <div class=\"trade-top\">{top} · {volume:.2} Lot</div>\
         <div class=\"trade-profit {class}\">{profit}</div>\
         <div class=\"trade-meta exit {exit_class}\">{exit_label}</div>\
         <div class=\"trade-meta\">{closed}</div>\
         </div>",
        top = top,
        volume = trade.volume,
        class = profit_class(trade.profit),
        profit = fmt_money(trade.profit),
        exit_class = trade.exit.css_class(),
        exit_label = escape(trade.exit.label()),
        closed = escape(&trade.closed_at),
    )
}

fn recent_trades(trades: &[TradeDoc]) -> String {
    if trades.is_empty() {
        return "<p class=\"muted\">No trades yet.</p>".to_string();
    }
    trades
        .chunks(TRADES_PER_ROW)
        .map(|row| {
            format!(
                "<div class=\"trade-row\">{}</div>",
                row.iter().map(trade_card).join("")
            )
        })
        .join("\n")
}

fn trade_hint(trade: Option<&TradeDoc>, label: &str) -> String {
    let Some(trade) = trade else {
        return format!("<div class=\"sub-line muted\">{}: –</div>", label);
    };

    let mut pieces = vec![escape(trade.symbol.as_str())];
    pieces.extend(side_markup(trade.side.as_deref()));
    pieces.push(format!("{:.2} Lot", trade.volume));
    pieces.push(fmt_money(trade.profit));
    pieces.push(escape(trade.exit.label()));
    pieces.push(escape(&trade.closed_at));

    format!(
        "<div class=\"sub-line {}\">{}: {}</div>",
        profit_class(trade.profit),
        label,
        pieces.join(" · ")
    )
}

fn window_card(label: &str, stats: &WindowDoc) -> String {
    format!(
        "<div class=\"stat-card\">\
         <div class=\"label\">{label}</div>\
         <div class=\"value {class}\">{profit}</div>\
         <div class=\"meta-line\">{count} Trades · {rate}</div>\
         {best}{worst}\
         </div>",
        label = escape(label),
        class = profit_class(stats.profit),
        profit = fmt_money(stats.profit),
        count = stats.trade_count,
        rate = fmt_pct(stats.win_rate),
        best = trade_hint(stats.best_trade.as_ref(), "Best"),
        worst = trade_hint(stats.worst_trade.as_ref(), "Worst"),
    )
}

fn symbol_table(items: &[SymbolDoc]) -> String {
    if items.is_empty() {
        return "<p class=\"muted\">No data</p>".to_string();
    }
    let rows = items
        .iter()
        .map(|s| {
            format!(
                "<tr><td>{}.</td><td>{}</td><td class=\"num {}\">{}</td>\
                 <td class=\"num\">{}</td><td class=\"num\">{}</td></tr>",
                s.rank,
                escape(s.symbol.as_str()),
                profit_class(s.profit),
                fmt_money(s.profit),
                s.trade_count,
                fmt_pct(s.win_rate),
            )
        })
        .join("");
    format!(
        "<table><thead><tr><th>#</th><th>Symbol</th><th class=\"num\">Profit</th>\
         <th class=\"num\">Trades</th><th class=\"num\">Win rate</th></tr></thead>\
         <tbody>{}</tbody></table>",
        rows
    )
}

fn period_table(heading: &str, items: &[PeriodDoc]) -> String {
    if items.is_empty() {
        return format!(
            "<div class=\"section\"><h2>{}</h2><p class=\"muted\">No data</p></div>",
            escape(heading)
        );
    }
    // Newest period first
    let rows = items
        .iter()
        .rev()
        .map(|p| {
            format!(
                "<tr><td>{}</td><td class=\"num {}\">{}</td><td class=\"num\">{}</td>\
                 <td class=\"num\">{}</td></tr>",
                escape(&p.period),
                profit_class(p.profit),
                fmt_money(p.profit),
                p.trade_count,
                fmt_pct(p.win_rate),
            )
        })
        .join("");
    format!(
        "<div class=\"section\"><h2>{}</h2><table><thead><tr><th>Period</th>\
         <th class=\"num\">Profit</th><th class=\"num\">Trades</th>\
         <th class=\"num\">Win rate</th></tr></thead><tbody>{}</tbody></table></div>",
        escape(heading),
        rows
    )
}

/// Render the complete page. Output is a pure function of `doc`.
pub fn render_dashboard(doc: &ReportDocument) -> String {
    let bot = escape(&doc.meta.bot);

    let (balance, equity, floating, snapshot_at) = match &doc.snapshot {
        Some(s) => (
            fmt_money(s.balance),
            fmt_money(s.equity),
            fmt_money(s.floating_pl),
            escape(&s.timestamp),
        ),
        None => ("–".into(), "–".into(), "–".into(), "–".into()),
    };

    let banner = if doc.pause.active {
        let message = doc.pause.message.as_deref().unwrap_or_default();
        let since = doc
            .pause
            .since
            .as_deref()
            .map(|s| format!(" (since {})", escape(s)))
            .unwrap_or_default();
        format!(
            "<div class=\"banner paused\">{}{}</div>",
            escape(message),
            since
        )
    } else {
        String::new()
    };

    let window_docs = [&doc.windows.week, &doc.windows.month, &doc.windows.year];
    let window_cards = WINDOWS
        .iter()
        .zip(window_docs)
        .map(|(w, stats)| window_card(w.label, stats))
        .join("");

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>{bot} Live Ticker</title>
  <style>{style}  </style>
</head>
<body>
  <h1>{bot} Live Ticker</h1>
  <div class="meta">Snapshot: {snapshot_at} · Statistics: {computed} · Generated: {generated}</div>
  {banner}
  <div class="cards">
    <div class="card"><div class="label">Balance</div><div class="value">{balance}</div></div>
    <div class="card"><div class="label">Equity</div><div class="value">{equity}</div></div>
    <div class="card"><div class="label">Floating P/L</div><div class="value">{floating}</div></div>
    <div class="card"><div class="label">Overall win rate</div><div class="value">{overall_rate}</div></div>
    <div class="card"><div class="label">Total trades</div><div class="value">{overall_count}</div></div>
  </div>
  <div class="section">
    <h2>Performance windows</h2>
    <div class="stat-grid">{window_cards}</div>
  </div>
  <div class="section">
    <h2>Recent trades</h2>
    <div class="trade-list">{recent}</div>
  </div>
  <div class="section">
    <h2>Top performers</h2>
    {best}
  </div>
  <div class="section">
    <h2>Tough performers</h2>
    {worst}
  </div>
  {monthly}
  {yearly}
  {daily}
</body>
</html>
"#,
        bot = bot,
        style = STYLE,
        snapshot_at = snapshot_at,
        computed = escape(&doc.meta.stats_computed_at),
        generated = escape(&doc.meta.generated_at),
        banner = banner,
        balance = balance,
        equity = equity,
        floating = floating,
        overall_rate = fmt_pct(doc.overall.win_rate),
        overall_count = doc.overall.trade_count,
        window_cards = window_cards,
        recent = recent_trades(&doc.last_trades),
        best = symbol_table(&doc.symbol_ranking.best),
        worst = symbol_table(&doc.symbol_ranking.worst),
        monthly = period_table("Monthly", &doc.monthly),
        yearly = period_table("Yearly", &doc.yearly),
        daily = period_table("Daily", &doc.daily),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{PauseDoc, RankingDoc, ReportMeta, SnapshotDoc, WindowsDoc};
    use crate::types::{ExitKind, Symbol};
    use rust_decimal_macros::dec;

    fn empty_window() -> WindowDoc {
        WindowDoc {
            profit: Decimal::ZERO,
            trade_count: 0,
            win_rate: Decimal::ZERO,
            wins: 0,
            losses: 0,
            best_trade: None,
            worst_trade: None,
        }
    }

    fn document() -> ReportDocument {
        ReportDocument {
            meta: ReportMeta {
                bot: "Sharrow <EA>".to_string(),
                generated_at: "2026-10-18T12:00:00Z".to_string(),
                stats_computed_at: "2026-10-18T12:00:00Z".to_string(),
                ledger_trades: 1,
                trade_active: true,
            },
            snapshot: Some(SnapshotDoc {
                balance: dec!(12345.5),
                equity: dec!(12000),
                floating_pl: dec!(-345.5),
                timestamp: "2026-10-18T11:59:00Z".to_string(),
            }),
            overall: empty_window(),
            windows: WindowsDoc {
                week: empty_window(),
                month: empty_window(),
                year: empty_window(),
            },
            symbol_ranking: RankingDoc {
                best: vec![],
                worst: vec![],
            },
            last_trades: vec![TradeDoc {
                ticket: "1".to_string(),
                symbol: Symbol::new("XAUUSD"),
                side: Some("BUY".to_string()),
                volume: dec!(0.1),
                profit: dec!(50),
                commission: Decimal::ZERO,
                swap: Decimal::ZERO,
                opened_at: None,
                closed_at: "2026-10-18T11:00:00Z".to_string(),
                exit: ExitKind::TakeProfit,
                comment: Some("<script>".to_string()),
            }],
            daily: vec![],
            monthly: vec![],
            yearly: vec![],
            pause: PauseDoc {
                active: false,
                message: None,
                since: None,
            },
        }
    }

    #[test]
    fn test_fmt_money_groups_thousands() {
        assert_eq!(fmt_money(dec!(1234567.891)), "1\u{a0}234\u{a0}567.89");
        assert_eq!(fmt_money(dec!(-345.5)), "-345.50");
        assert_eq!(fmt_money(dec!(0)), "0.00");
        assert_eq!(fmt_money(dec!(-0.001)), "0.00");
    }

    #[test]
    fn test_fmt_pct() {
        assert_eq!(fmt_pct(dec!(1)), "100.00%");
        assert_eq!(fmt_pct(dec!(0.3333)), "33.33%");
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("<a href='x'>&\"</a>"), "&lt;a href=&#x27;x&#x27;&gt;&amp;&quot;&lt;/a&gt;");
    }

    #[test]
    fn test_dashboard_escapes_and_shows_cards() {
        let html = render_dashboard(&document());

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("Sharrow &lt;EA&gt; Live Ticker"));
        assert!(!html.contains("<EA>"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("12\u{a0}345.50"));
        assert!(html.contains("Exit: TP"));
        assert!(html.contains("Last 7 days"));
        assert!(!html.contains("banner paused"));
    }

    #[test]
    fn test_dashboard_pause_banner() {
        let mut doc = document();
        doc.pause = PauseDoc {
            active: true,
            message: Some("Paused & waiting".to_string()),
            since: Some("2026-10-18T10:00:00Z".to_string()),
        };
        let html = render_dashboard(&doc);
        assert!(html.contains(
            "<div class=\"banner paused\">Paused &amp; waiting (since 2026-10-18T10:00:00Z)</div>"
        ));
    }

    #[test]
    fn test_dashboard_is_deterministic() {
        assert_eq!(render_dashboard(&document()), render_dashboard(&document()));
    }
}
