// src/application/usecase/backtest_usecase.rs
// One-shot historical replay of a strategy

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::dto::ChartSnapshot;
use crate::application::usecase::signal_evaluation_usecase::{evaluate_rule, evaluate_signal};
use crate::application::usecase::trade_simulation_usecase::simulate;
use crate::domain::errors::{AppResult, MarketDataError};
use crate::domain::model::{
    Bar, BarWindow, EquityCurve, Position, Resolution, Side, StrategyDefinition, TradingStats,
    BUY_SIGNAL_COLUMN, SELL_SIGNAL_COLUMN,
};
use crate::domain::repository::MarketDataProvider;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub data_points: usize,
    pub time_range: TimeRange,
    pub filter_column: Option<String>,
    pub buy_column: String,
    pub sell_column: String,
    pub stats: TradingStats,
    pub equity: EquityCurve,
    /// Position still open at the end of the data.
    pub open_position: Position,
    pub chart: ChartSnapshot,
}

/// Evaluate the strategy over `bars` and simulate its trades.
///
/// Errors propagate as-is; there is no partial report.
pub fn run_backtest(bars: Vec<Bar>, strategy: &StrategyDefinition) -> AppResult<BacktestReport> {
    if bars.is_empty() {
        return Err(MarketDataError::NoData("no bars to backtest".to_string()).into());
    }
    for bar in &bars {
        bar.validate()?;
    }

    let mut window = BarWindow::from_bars(bars);
    let mut overlays = Vec::new();

    let filter_column = match &strategy.filter {
        Some(filter) => {
            let column = evaluate_signal(&mut window, filter)?;
            overlays.push(column.clone());
            Some(column)
        }
        None => None,
    };

    let buy_column = evaluate_rule(&mut window, &strategy.buy, Side::Buy)?;
    let sell_column = evaluate_rule(&mut window, &strategy.sell, Side::Sell)?;
    overlays.push(buy_column.clone());
    overlays.push(sell_column.clone());

    let outcome = simulate(&window, BUY_SIGNAL_COLUMN, SELL_SIGNAL_COLUMN)?;
    let chart = ChartSnapshot::build(strategy.title(), &window, &overlays, &outcome.equity);

    // from_bars never yields an empty window from non-empty input
    let time_range = match (window.bars().first(), window.last()) {
        (Some(first), Some(last)) => TimeRange {
            start: first.timestamp,
            end: last.timestamp,
        },
        _ => return Err(MarketDataError::NoData("no bars to backtest".to_string()).into()),
    };

    log::info!(
        "Backtest '{}': {} bars, {} trades, win rate {:.2}%, total return {:.2}%",
        strategy.title(),
        window.len(),
        outcome.stats.total_trades,
        outcome.stats.win_rate,
        outcome.stats.total_return_pct
    );

    Ok(BacktestReport {
        data_points: window.len(),
        time_range,
        filter_column,
        buy_column,
        sell_column,
        stats: outcome.stats,
        equity: outcome.equity,
        open_position: outcome.position,
        chart,
    })
}

/// Backtest use case
#[async_trait]
pub trait BacktestUseCase {
    async fn run(
        &self,
        identifier: &str,
        resolution: Resolution,
        count: usize,
        strategy: &StrategyDefinition,
    ) -> AppResult<BacktestReport>;
}

pub struct Backtester {
    provider: Arc<dyn MarketDataProvider>,
}

impl Backtester {
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl BacktestUseCase for Backtester {
    async fn run(
        &self,
        identifier: &str,
        resolution: Resolution,
        count: usize,
        strategy: &StrategyDefinition,
    ) -> AppResult<BacktestReport> {
        log::info!(
            "Fetching {} {} bars of {} for backtest",
            count,
            resolution,
            identifier
        );
        let bars = self
            .provider
            .fetch_history(identifier, resolution, count)
            .await?;
        run_backtest(bars, strategy)
    }
}
