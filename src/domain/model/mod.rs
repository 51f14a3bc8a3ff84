// src/domain/model/mod.rs
// Core domain models

pub mod bar;
pub mod signal;
pub mod trade;
pub mod window;

pub use bar::{resample, Bar, Resolution, TimeUnit};
pub use signal::{
    Condition, Operator, Side, SignalRule, SignalSpec, StrategyDefinition, BUY_SIGNAL_COLUMN,
    SELL_SIGNAL_COLUMN,
};
pub use trade::{
    compounded_pnl_pct, EquityCurve, EquityPoint, Execution, Position, PositionTracker, Trade,
    TradingStats, STARTING_NOTIONAL,
};
pub use window::{normalize_column_name, BarWindow, Column, Upsert};
