pub mod backtest_usecase;
pub mod signal_evaluation_usecase;
pub mod trade_simulation_usecase;

// Re-export public API
pub use backtest_usecase::{run_backtest, BacktestReport, BacktestUseCase, Backtester, TimeRange};
pub use signal_evaluation_usecase::{
    apply_condition, apply_condition_at, evaluate_rule, evaluate_signal,
};
pub use trade_simulation_usecase::{simulate, SimulationOutcome};
