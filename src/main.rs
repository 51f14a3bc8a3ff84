// src/main.rs
use signal_trader::adapter::MonitorCoordinator;
use signal_trader::application::service::SessionParams;
use signal_trader::application::usecase::{BacktestUseCase, Backtester};
use signal_trader::config::Config;
use signal_trader::domain::errors::{AppError, AppResult};
use signal_trader::domain::model::{resample, Resolution};
use signal_trader::infrastructure::{BuiltinSynthesizer, ReplayMarketData};

use futures_util::StreamExt;
use std::sync::Arc;
use tokio::signal::ctrl_c;

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration: a JSON file given as first argument, otherwise the environment
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    // Initialize logging
    config.init_logging()?;

    log::info!("Starting signal_trader v{}", env!("CARGO_PKG_VERSION"));

    let resolution = config.resolution()?;
    let provider = Arc::new(create_provider(&config, resolution)?);

    log::info!("Building strategy signals...");
    let strategy = config.build_strategy(&BuiltinSynthesizer::new()).await?;
    log::info!("Strategy: {}", strategy.title());

    // Backtest over the replayed history
    let backtester = Backtester::new(provider.clone());
    let report = backtester
        .run(
            &config.market.identifier,
            resolution,
            config.market.history_count,
            &strategy,
        )
        .await?;
    log::info!(
        "Backtest {} -> {}: {} trades, win rate {:.2}%, avg return {:.2}%, final equity {:.2}",
        report.time_range.start,
        report.time_range.end,
        report.stats.total_trades,
        report.stats.win_rate,
        report.stats.avg_return_pct,
        report.equity.final_value()
    );
    println!("{}", serde_json::to_string(&report.stats)?);

    // Live monitoring over the remaining bars
    let coordinator = MonitorCoordinator::new(provider, config.monitor_settings());
    let (session, mut events) = coordinator
        .start(SessionParams {
            identifier: config.market.identifier.clone(),
            resolution,
            strategy,
        })
        .await;
    log::info!("Monitoring session {} started, press Ctrl+C to stop", session);

    let mut stopping = false;
    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => {
                    println!("{}", serde_json::to_string(&event)?);
                    if event.is_terminal() {
                        break;
                    }
                }
                None => break,
            },
            result = ctrl_c(), if !stopping => {
                result?;
                log::info!("Shutdown signal received, stopping session {}", session);
                stopping = true;
                coordinator.stop(session).await;
            }
        }
    }

    log::info!("signal_trader stopped");
    Ok(())
}

fn create_provider(config: &Config, resolution: Resolution) -> AppResult<ReplayMarketData> {
    let path = config.market.data_file.as_ref().ok_or_else(|| {
        AppError::Config("DATA_FILE (market.data_file) must point to a JSON bar file".to_string())
    })?;

    let mut bars = ReplayMarketData::load_bars(path)?;
    bars.sort_by_key(|b| b.timestamp);
    let bars = resample(&bars, resolution);
    log::info!(
        "Replaying {} {} bars of {} ({} as history)",
        bars.len(),
        resolution,
        config.market.identifier,
        config.market.history_count.min(bars.len())
    );
    Ok(ReplayMarketData::from_bars(bars, config.market.history_count))
}
