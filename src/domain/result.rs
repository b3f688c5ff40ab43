//! Backtest results and summary statistics.

use crate::domain::position::Position;
use std::collections::BTreeMap;

/// Closed positions collected over a run, in the order they closed.
#[derive(Debug, Clone, Default)]
pub struct BacktestResult {
    pub rule_name: String,
    positions: Vec<Position>,
}

impl BacktestResult {
    pub fn new(rule_name: &str) -> Self {
        Self {
            rule_name: rule_name.to_string(),
            positions: Vec::new(),
        }
    }

    pub fn add(&mut self, position: Position) {
        self.positions.push(position);
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Traded symbols in order of first appearance.
    pub fn symbols(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for pos in &self.positions {
            if !out.contains(&pos.symbol.as_str()) {
                out.push(&pos.symbol);
            }
        }
        out
    }

    pub fn for_symbol(&self, symbol: &str) -> Vec<&Position> {
        self.positions.iter().filter(|p| p.symbol == symbol).collect()
    }

    pub fn exit_years(&self) -> Vec<i32> {
        self.by_exit_year().into_keys().collect()
    }

    pub fn for_exit_year(&self, year: i32) -> Vec<&Position> {
        self.positions
            .iter()
            .filter(|p| p.exit_year() == Some(year))
            .collect()
    }

    /// Positions grouped by the year they closed, oldest year first.
    pub fn by_exit_year(&self) -> BTreeMap<i32, Vec<&Position>> {
        group_by_exit_year(self.positions.iter())
    }

    pub fn summary(&self) -> Summary {
        let all: Vec<&Position> = self.positions.iter().collect();
        Summary::compute(&all)
    }
}

pub fn group_by_exit_year<'a>(
    positions: impl IntoIterator<Item = &'a Position>,
) -> BTreeMap<i32, Vec<&'a Position>> {
    let mut years: BTreeMap<i32, Vec<&Position>> = BTreeMap::new();
    for pos in positions {
        if let Some(year) = pos.exit_year() {
            years.entry(year).or_default().push(pos);
        }
    }
    years
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub draws: usize,
    pub win_rate: f64,
    pub total_profit: f64,
    pub avg_profit: f64,
    pub avg_win_profit: f64,
    /// Negative when there are losing trades.
    pub avg_loss_profit: f64,
    pub avg_period: f64,
    /// |average winning return / average losing return|; `None` without losers.
    pub payoff_ratio: Option<f64>,
    pub avg_return_rate: Option<f64>,
    /// Best winning return, 0 without winners.
    pub max_return_rate: f64,
    /// Worst losing return, 0 without losers.
    pub min_return_rate: f64,
}

impl Summary {
    /// Statistics over the closed positions in `positions`. Open positions
    /// are ignored.
    pub fn compute(positions: &[&Position]) -> Self {
        let closed: Vec<(f64, f64, u32)> = positions
            .iter()
            .filter_map(|p| Some((p.profit().ok()?, p.return_rate().ok()?, p.period)))
            .collect();

        let trades = closed.len();
        let winners: Vec<&(f64, f64, u32)> = closed.iter().filter(|c| c.0 > 0.0).collect();
        let losers: Vec<&(f64, f64, u32)> = closed.iter().filter(|c| c.0 < 0.0).collect();
        let wins = winners.len();
        let losses = losers.len();

        let total_profit: f64 = closed.iter().map(|c| c.0).sum();
        let win_profit: f64 = winners.iter().map(|c| c.0).sum();
        let loss_profit: f64 = losers.iter().map(|c| c.0).sum();
        let periods: u64 = closed.iter().map(|c| u64::from(c.2)).sum();

        let avg_win_return = mean(winners.iter().map(|c| c.1), wins);
        let avg_loss_return = mean(losers.iter().map(|c| c.1), losses);
        let payoff_ratio = if losses > 0 && avg_loss_return != 0.0 {
            Some((avg_win_return / avg_loss_return).abs())
        } else {
            None
        };

        Summary {
            trades,
            wins,
            losses,
            draws: trades - wins - losses,
            win_rate: ratio(wins as f64, trades),
            total_profit,
            avg_profit: ratio(total_profit, trades),
            avg_win_profit: ratio(win_profit, wins),
            avg_loss_profit: ratio(loss_profit, losses),
            avg_period: ratio(periods as f64, trades),
            payoff_ratio,
            avg_return_rate: (trades > 0).then(|| mean(closed.iter().map(|c| c.1), trades)),
            max_return_rate: winners.iter().map(|c| c.1).reduce(f64::max).unwrap_or(0.0),
            min_return_rate: losers.iter().map(|c| c.1).reduce(f64::min).unwrap_or(0.0),
        }
    }
}

fn ratio(total: f64, count: usize) -> f64 {
    if count > 0 { total / count as f64 } else { 0.0 }
}

fn mean(values: impl Iterator<Item = f64>, count: usize) -> f64 {
    ratio(values.sum(), count)
}
