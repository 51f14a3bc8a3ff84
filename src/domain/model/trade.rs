// src/domain/model/trade.rs
use crate::domain::model::signal::Side;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notional the equity curve starts from.
pub const STARTING_NOTIONAL: f64 = 1000.0;

/// Simulated single-asset holding.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum Position {
    #[default]
    Flat,
    Long {
        entry_time: DateTime<Utc>,
        entry_price: f64,
    },
}

impl Position {
    pub fn is_long(&self) -> bool {
        matches!(self, Position::Long { .. })
    }
}

/// An accepted buy or sell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub side: Side,
    pub time: DateTime<Utc>,
    pub price: f64,
    /// Set on sells: the return of the round trip this sell closed.
    pub profit_pct: Option<f64>,
}

/// A completed round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub buy_time: DateTime<Utc>,
    pub buy_price: f64,
    pub sell_time: DateTime<Utc>,
    pub sell_price: f64,
    pub profit_pct: f64,
}

impl Trade {
    pub fn is_profitable(&self) -> bool {
        self.profit_pct > 0.0
    }
}

/// Enforces the at-most-one-open-position rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionTracker {
    position: Position,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Open a position if flat; ignored while already long.
    pub fn on_buy(&mut self, time: DateTime<Utc>, price: f64) -> Option<Execution> {
        match self.position {
            Position::Flat => {
                self.position = Position::Long {
                    entry_time: time,
                    entry_price: price,
                };
                Some(Execution {
                    side: Side::Buy,
                    time,
                    price,
                    profit_pct: None,
                })
            }
            Position::Long { .. } => None,
        }
    }

    /// Close the open position; ignored while flat.
    pub fn on_sell(&mut self, time: DateTime<Utc>, price: f64) -> Option<(Execution, Trade)> {
        match self.position {
            Position::Long {
                entry_time,
                entry_price,
            } => {
                let profit_pct = (price - entry_price) / entry_price * 100.0;
                self.position = Position::Flat;
                let trade = Trade {
                    buy_time: entry_time,
                    buy_price: entry_price,
                    sell_time: time,
                    sell_price: price,
                    profit_pct,
                };
                let execution = Execution {
                    side: Side::Sell,
                    time,
                    price,
                    profit_pct: Some(profit_pct),
                };
                Some((execution, trade))
            }
            Position::Flat => None,
        }
    }
}

/// Aggregate statistics derived from a trade list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TradingStats {
    pub total_trades: usize,
    pub profitable_trades: usize,
    pub win_rate: f64,
    pub total_return_pct: f64,
    pub avg_return_pct: f64,
    pub trades: Vec<Trade>,
}

impl TradingStats {
    pub fn from_trades(trades: Vec<Trade>) -> Self {
        let total_trades = trades.len();
        if total_trades == 0 {
            return Self::default();
        }

        let profitable_trades = trades.iter().filter(|t| t.is_profitable()).count();
        let total_return_pct: f64 = trades.iter().map(|t| t.profit_pct).sum();

        Self {
            total_trades,
            profitable_trades,
            win_rate: profitable_trades as f64 / total_trades as f64 * 100.0,
            total_return_pct,
            avg_return_pct: total_return_pct / total_trades as f64,
            trades,
        }
    }

    pub fn has_trades(&self) -> bool {
        self.total_trades > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub cumulative_value: f64,
    pub pnl_pct: f64,
}

impl EquityPoint {
    pub fn new(timestamp: DateTime<Utc>, cumulative_value: f64) -> Self {
        Self {
            timestamp,
            cumulative_value,
            pnl_pct: (cumulative_value - STARTING_NOTIONAL) / STARTING_NOTIONAL * 100.0,
        }
    }
}

/// Per-bar account value, compounded at each completed trade and carried
/// forward between trades.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EquityCurve {
    pub points: Vec<EquityPoint>,
}

impl EquityCurve {
    /// Build the step curve for `timestamps` (ascending) from the
    /// `(sell_time, value)` marks recorded at each completed trade.
    pub fn from_marks(timestamps: &[DateTime<Utc>], marks: &[(DateTime<Utc>, f64)]) -> Self {
        let mut points = Vec::with_capacity(timestamps.len());
        let mut value = STARTING_NOTIONAL;
        let mut next_mark = 0;

        for &timestamp in timestamps {
            while next_mark < marks.len() && marks[next_mark].0 <= timestamp {
                value = marks[next_mark].1;
                next_mark += 1;
            }
            points.push(EquityPoint::new(timestamp, value));
        }

        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn final_value(&self) -> f64 {
        self.points
            .last()
            .map(|p| p.cumulative_value)
            .unwrap_or(STARTING_NOTIONAL)
    }
}

/// Compound a sequence of trade returns onto the starting notional and report
/// the overall change in percent.
pub fn compounded_pnl_pct(trades: &[Trade]) -> f64 {
    let value = trades
        .iter()
        .fold(STARTING_NOTIONAL, |value, t| value * (1.0 + t.profit_pct / 100.0));
    (value - STARTING_NOTIONAL) / STARTING_NOTIONAL * 100.0
}
