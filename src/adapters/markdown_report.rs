//! Markdown report adapter implementing ReportPort.
//!
//! Writes `total.md` for all securities combined plus one `<symbol>.md` per
//! traded security.

use crate::domain::error::RuletraderError;
use crate::domain::position::Position;
use crate::domain::result::{BacktestResult, Summary, group_by_exit_year};
use crate::ports::report_port::ReportPort;
use std::fs;
use std::path::Path;

const COL_WIDTH: usize = 32;

#[derive(Debug, Default)]
pub struct MarkdownReportAdapter;

impl MarkdownReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl ReportPort for MarkdownReportAdapter {
    fn write(&self, result: &BacktestResult, output_dir: &Path) -> Result<(), RuletraderError> {
        fs::create_dir_all(output_dir)?;

        let all: Vec<&Position> = result.positions().iter().collect();
        fs::write(
            output_dir.join("total.md"),
            render_report("All securities", &result.rule_name, &all, false),
        )?;

        for symbol in result.symbols() {
            let positions = result.for_symbol(symbol);
            let path = output_dir.join(format!("{}.md", symbol.to_lowercase()));
            fs::write(path, render_report(symbol, &result.rule_name, &positions, true))?;
        }
        Ok(())
    }
}

/// Overall summary only, as printed after a backtest.
pub fn render_overview(result: &BacktestResult) -> String {
    let all: Vec<&Position> = result.positions().iter().collect();
    format!(
        "# All securities\n\nRule: {}\n\n## Summary\n{}\n",
        result.rule_name,
        format_summary_table(&Summary::compute(&all))
    )
}

fn render_report(title: &str, rule_name: &str, positions: &[&Position], with_trades: bool) -> String {
    let mut out = format!("# {title}\n\nRule: {rule_name}\n\n## Summary\n");
    out.push_str(&format_summary_table(&Summary::compute(positions)));
    out.push_str("\n\n## By exit year\n");
    for (year, in_year) in group_by_exit_year(positions.iter().copied()) {
        out.push_str(&format!("\n### {year}\n"));
        out.push_str(&format_summary_table(&Summary::compute(&in_year)));
        out.push('\n');
    }
    if with_trades {
        out.push_str("\n## Trades\n");
        out.push_str(&format_trades_table(positions));
    }
    out
}

fn format_money(value: f64) -> String {
    if value < 0.0 {
        format!("-${:.2}", value.abs())
    } else {
        format!("${value:.2}")
    }
}

fn format_pct(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

fn line(label: &str, value: &str) -> String {
    format!("|{label:<COL_WIDTH$}|{value:>COL_WIDTH$}|\n")
}

pub fn format_summary_table(summary: &Summary) -> String {
    if summary.trades == 0 {
        return "No trades were closed.".to_string();
    }

    let mut out = format!("|{:^COL_WIDTH$}|{:^COL_WIDTH$}|\n", "Item", "Value");
    out.push_str(&format!("|{}|{}:|\n", "-".repeat(COL_WIDTH), "-".repeat(COL_WIDTH - 1)));
    out.push_str(&line(
        "Average return (per $100)",
        &format_money(summary.avg_return_rate.unwrap_or(0.0) * 100.0),
    ));
    out.push_str(&line(
        "Payoff ratio",
        &summary
            .payoff_ratio
            .map_or_else(|| "NaN".to_string(), |p| format!("{p:.2}")),
    ));
    out.push_str(&line("Win rate", &format_pct(summary.win_rate)));
    out.push_str(&line("Trades", &summary.trades.to_string()));
    out.push_str(&line(
        "Best return (per $100)",
        &format_money(summary.max_return_rate * 100.0),
    ));
    out.push_str(&line(
        "Worst return (per $100)",
        &format_money(summary.min_return_rate * 100.0),
    ));
    out.push_str(&line("Wins", &summary.wins.to_string()));
    out.push_str(&line("Losses", &summary.losses.to_string()));
    out.push_str(&line("Total profit", &format_money(summary.total_profit)));
    out.push_str(&line("Average holding days", &format!("{:.1}", summary.avg_period)));
    out.trim_end().to_string()
}

pub fn format_trades_table(positions: &[&Position]) -> String {
    let mut out = String::from(
        "| Side | Entry date | Entry price | Timing | Exit date | Exit price | Timing | Volume | Profit | Return |\n\
         |------|:----------:|------------:|:------:|:---------:|-----------:|:------:|-------:|-------:|-------:|\n",
    );
    for pos in positions {
        let Some(exit) = &pos.exit else {
            continue;
        };
        out.push_str(&format!(
            "| {} | {} | {:.2} | {} | {} | {:.2} | {} | {} | {} | {} |\n",
            pos.order_type,
            pos.entry_date.format("%Y-%m-%d"),
            pos.entry_price,
            pos.entry_timing,
            exit.date.format("%Y-%m-%d"),
            exit.price,
            exit.timing,
            pos.volume,
            format_money(pos.profit().unwrap_or(0.0)),
            format_pct(pos.return_rate().unwrap_or(0.0)),
        ));
    }
    out
}
