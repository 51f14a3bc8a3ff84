// src/application/usecase/trade_simulation_usecase.rs
// Trade simulation over buy/sell event columns

use chrono::{DateTime, Utc};

use crate::domain::errors::SignalResult;
use crate::domain::model::{
    BarWindow, EquityCurve, Execution, Position, PositionTracker, Side, Trade, TradingStats,
};

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOutcome {
    pub stats: TradingStats,
    pub equity: EquityCurve,
    /// Position left open after the last event.
    pub position: Position,
    /// Every accepted buy and sell, in order.
    pub executions: Vec<Execution>,
}

impl SimulationOutcome {
    pub fn trades(&self) -> &[Trade] {
        &self.stats.trades
    }
}

#[derive(Debug, Clone, Copy)]
struct Event {
    time: DateTime<Utc>,
    side: Side,
    price: f64,
}

fn side_rank(side: Side) -> u8 {
    match side {
        Side::Buy => 0,
        Side::Sell => 1,
    }
}

/// Replay the window's buy/sell events through a position tracker.
///
/// Buys are accepted only while flat and sells only while long; everything
/// else is ignored. Events on the same timestamp are processed buy first.
/// Both event columns must exist and be boolean.
pub fn simulate(
    window: &BarWindow,
    buy_column: &str,
    sell_column: &str,
) -> SignalResult<SimulationOutcome> {
    let buys = window.flags(buy_column)?;
    let sells = window.flags(sell_column)?;

    let mut events: Vec<Event> = Vec::new();
    for (flags, side) in [(buys, Side::Buy), (sells, Side::Sell)] {
        events.extend(window.bars().iter().zip(flags).filter(|(_, f)| **f).map(
            |(bar, _)| Event {
                time: bar.timestamp,
                side,
                price: bar.close,
            },
        ));
    }
    events.sort_by_key(|e| (e.time, side_rank(e.side)));

    let mut tracker = PositionTracker::new();
    let mut executions = Vec::new();
    let mut trades = Vec::new();
    let mut marks = Vec::new();
    let mut value = crate::domain::model::STARTING_NOTIONAL;

    for event in &events {
        match event.side {
            Side::Buy => {
                if let Some(execution) = tracker.on_buy(event.time, event.price) {
                    executions.push(execution);
                }
            }
            Side::Sell => {
                if let Some((execution, trade)) = tracker.on_sell(event.time, event.price) {
                    value *= 1.0 + trade.profit_pct / 100.0;
                    marks.push((trade.sell_time, value));
                    executions.push(execution);
                    trades.push(trade);
                }
            }
        }
    }

    let timestamps: Vec<DateTime<Utc>> = window.bars().iter().map(|b| b.timestamp).collect();
    let equity = EquityCurve::from_marks(&timestamps, &marks);

    log::debug!(
        "Simulated {} events over {} bars: {} trades",
        events.len(),
        window.len(),
        trades.len()
    );

    Ok(SimulationOutcome {
        stats: TradingStats::from_trades(trades),
        equity,
        position: tracker.position(),
        executions,
    })
}
