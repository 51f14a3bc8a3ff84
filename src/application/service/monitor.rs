// src/application/service/monitor.rs
// Live monitoring session: poll, recompute, simulate, emit

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::application::dto::{ChartSnapshot, MonitorEvent, MonitorUpdate};
use crate::application::service::cancellation::CancellationFlag;
use crate::application::service::recompute::{RecomputeMode, RecomputeStrategy};
use crate::application::service::state::MonitorState;
use crate::application::usecase::signal_evaluation_usecase::{apply_condition_at, evaluate_signal};
use crate::application::usecase::trade_simulation_usecase::simulate;
use crate::domain::errors::{AppResult, MarketDataError, MarketDataResult, SignalError};
use crate::domain::model::{
    compounded_pnl_pct, BarWindow, EquityCurve, Execution, PositionTracker, Resolution, Side,
    StrategyDefinition, Trade, TradingStats, BUY_SIGNAL_COLUMN, SELL_SIGNAL_COLUMN,
    STARTING_NOTIONAL,
};
use crate::domain::repository::MarketDataProvider;

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    /// How often the stop flag is checked while waiting.
    pub stop_check: Duration,
    pub error_backoff: Duration,
    pub fetch_timeout: Duration,
    pub history_count: usize,
    /// Bars kept in the window after each update.
    pub retention: usize,
    /// Bars used by the tail recompute strategy.
    pub lookback: usize,
    pub event_buffer: usize,
    pub recompute: RecomputeMode,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            stop_check: Duration::from_millis(100),
            error_backoff: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(10),
            history_count: 100,
            retention: 100,
            lookback: 20,
            event_buffer: 16,
            recompute: RecomputeMode::Tail,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionParams {
    pub identifier: String,
    pub resolution: Resolution,
    pub strategy: StrategyDefinition,
}

/// State owned by exactly one running monitor.
#[derive(Debug)]
struct MonitorSession {
    params: SessionParams,
    window: BarWindow,
    tracker: PositionTracker,
    trades: Vec<Trade>,
    filter_column: Option<String>,
    buy_column: Option<String>,
    sell_column: Option<String>,
    last_update: Option<DateTime<Utc>>,
    last_buy_applied: Option<DateTime<Utc>>,
    last_sell_applied: Option<DateTime<Utc>>,
}

impl MonitorSession {
    fn new(params: SessionParams) -> Self {
        Self {
            params,
            window: BarWindow::new(),
            tracker: PositionTracker::new(),
            trades: Vec::new(),
            filter_column: None,
            buy_column: None,
            sell_column: None,
            last_update: None,
            last_buy_applied: None,
            last_sell_applied: None,
        }
    }

    fn overlay_columns(&self) -> Vec<String> {
        [&self.filter_column, &self.buy_column, &self.sell_column]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }

    /// Feed the newest bar's events to the live position. Each side's event
    /// is consumed once per timestamp, so a revised bar cannot trade twice.
    fn apply_newest_events(&mut self) -> AppResult<Vec<Execution>> {
        let index = match self.window.len().checked_sub(1) {
            Some(index) => index,
            None => return Ok(Vec::new()),
        };
        let buy = self.window.flags(BUY_SIGNAL_COLUMN)?[index];
        let sell = self.window.flags(SELL_SIGNAL_COLUMN)?[index];
        let (timestamp, close) = match self.window.bar(index) {
            Some(bar) => (bar.timestamp, bar.close),
            None => return Ok(Vec::new()),
        };

        let mut executions = Vec::new();
        if buy && self.last_buy_applied != Some(timestamp) {
            self.last_buy_applied = Some(timestamp);
            if let Some(execution) = self.tracker.on_buy(timestamp, close) {
                log::info!("BUY {} at {:.4} ({})", self.params.identifier, close, timestamp);
                executions.push(execution);
            }
        }
        if sell && self.last_sell_applied != Some(timestamp) {
            self.last_sell_applied = Some(timestamp);
            if let Some((execution, trade)) = self.tracker.on_sell(timestamp, close) {
                log::info!(
                    "SELL {} at {:.4} ({}), profit {:.2}%",
                    self.params.identifier,
                    close,
                    timestamp,
                    trade.profit_pct
                );
                executions.push(execution);
                self.trades.push(trade);
            }
        }
        Ok(executions)
    }

    /// Equity over the retained bars, compounded from the session's own
    /// trades. Trades closed before the first retained bar carry in.
    fn equity(&self) -> EquityCurve {
        let timestamps: Vec<DateTime<Utc>> =
            self.window.bars().iter().map(|b| b.timestamp).collect();
        let mut value = STARTING_NOTIONAL;
        let marks: Vec<(DateTime<Utc>, f64)> = self
            .trades
            .iter()
            .map(|trade| {
                value *= 1.0 + trade.profit_pct / 100.0;
                (trade.sell_time, value)
            })
            .collect();
        EquityCurve::from_marks(&timestamps, &marks)
    }

    fn build_update(&self, executions: Vec<Execution>) -> MonitorUpdate {
        let chart = ChartSnapshot::build(
            self.params.strategy.title(),
            &self.window,
            &self.overlay_columns(),
            &self.equity(),
        );
        MonitorUpdate {
            timestamp: self.window.last_timestamp(),
            latest_price: self.window.last().map(|b| b.close),
            executions,
            position: self.tracker.position(),
            cumulative_pnl_pct: compounded_pnl_pct(&self.trades),
            stats: TradingStats::from_trades(self.trades.clone()),
            chart,
        }
    }

    /// Stats and chart over what is in memory, without touching the position.
    fn snapshot(&self) -> AppResult<MonitorUpdate> {
        self.window.flags(BUY_SIGNAL_COLUMN)?;
        self.window.flags(SELL_SIGNAL_COLUMN)?;
        Ok(self.build_update(Vec::new()))
    }
}

enum CycleOutcome {
    Updated(MonitorUpdate),
    NoNewData,
    Cancelled,
}

pub struct LiveMonitor {
    provider: Arc<dyn MarketDataProvider>,
    settings: MonitorSettings,
    recompute: Arc<dyn RecomputeStrategy>,
    session: MonitorSession,
    state: MonitorState,
    cancel: CancellationFlag,
    events: mpsc::Sender<MonitorEvent>,
}

impl LiveMonitor {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        settings: MonitorSettings,
        params: SessionParams,
        cancel: CancellationFlag,
        events: mpsc::Sender<MonitorEvent>,
    ) -> Self {
        let recompute = settings.recompute.build(settings.lookback);
        Self {
            provider,
            settings,
            recompute,
            session: MonitorSession::new(params),
            state: MonitorState::Starting,
            cancel,
            events,
        }
    }

    /// Swap the per-cycle recompute strategy.
    pub fn with_recompute(mut self, recompute: Arc<dyn RecomputeStrategy>) -> Self {
        self.recompute = recompute;
        self
    }

    pub async fn run(mut self) {
        let identifier = self.session.params.identifier.clone();
        log::info!(
            "Starting monitor for {} ({}) using {} recompute",
            identifier,
            self.session.params.resolution,
            self.recompute.name()
        );
        self.emit(MonitorEvent::status(MonitorState::Starting, "session created"))
            .await;

        self.transition(MonitorState::Initializing, "fetching initial history")
            .await;
        match self.initialize().await {
            Ok(true) => {}
            Ok(false) => {
                self.finish("stopped during initialization").await;
                return;
            }
            Err(e) => {
                log::error!("Monitor for {} failed to initialize: {}", identifier, e);
                self.emit(MonitorEvent::error(MonitorState::Initializing, &e, true))
                    .await;
                self.transition(MonitorState::Error, "initialization failed")
                    .await;
                self.finish(&format!("initialization failed: {}", e)).await;
                return;
            }
        }

        self.transition(
            MonitorState::Ready,
            format!("{} bars loaded", self.session.window.len()),
        )
        .await;
        match self.session.snapshot() {
            Ok(update) => {
                self.emit(MonitorEvent::Snapshot(update)).await;
            }
            Err(e) => {
                log::warn!("Initial snapshot for {} failed: {}", identifier, e);
                self.emit(MonitorEvent::error(MonitorState::Ready, &e, false))
                    .await;
            }
        }

        while !self.cancel.is_cancelled() {
            self.transition(MonitorState::Processing, "polling latest bar")
                .await;

            match self.cycle().await {
                Ok(CycleOutcome::Updated(update)) => {
                    self.emit(MonitorEvent::Update(update)).await;
                    self.transition(MonitorState::Idle, "waiting for next poll")
                        .await;
                }
                Ok(CycleOutcome::NoNewData) => {
                    self.transition(MonitorState::Idle, "no new data").await;
                }
                Ok(CycleOutcome::Cancelled) => break,
                Err(e) => {
                    log::warn!("Monitor cycle for {} failed: {}", identifier, e);
                    self.emit(MonitorEvent::error(MonitorState::Processing, &e, false))
                        .await;
                    self.transition(MonitorState::Error, "retrying after backoff")
                        .await;
                    if !self
                        .cancel
                        .sleep(self.settings.error_backoff, self.settings.stop_check)
                        .await
                    {
                        break;
                    }
                    continue;
                }
            }

            if !self
                .cancel
                .sleep(self.settings.poll_interval, self.settings.stop_check)
                .await
            {
                break;
            }
        }

        self.finish("stop requested").await;
    }

    /// Returns `Ok(false)` when cancelled before completion.
    async fn initialize(&mut self) -> AppResult<bool> {
        let fetched = self
            .fetch(self.provider.fetch_history(
                &self.session.params.identifier,
                self.session.params.resolution,
                self.settings.history_count,
            ))
            .await?;
        let bars = match fetched {
            Some(bars) => bars,
            None => return Ok(false),
        };
        for bar in &bars {
            bar.validate()?;
        }

        let session = &mut self.session;
        session.window = BarWindow::from_bars(bars);
        session.window.retain_latest(self.settings.retention);
        session.last_update = session.window.last_timestamp();

        // Signal values give the chart context; no events are back-dated.
        if !session.window.is_empty() {
            let strategy = &session.params.strategy;
            if let Some(filter) = &strategy.filter {
                session.filter_column = Some(evaluate_signal(&mut session.window, filter)?);
            }
            session.buy_column = Some(evaluate_signal(&mut session.window, &strategy.buy.spec)?);
            session.sell_column = Some(evaluate_signal(&mut session.window, &strategy.sell.spec)?);
        }
        session.window.ensure_flag_column(BUY_SIGNAL_COLUMN)?;
        session.window.ensure_flag_column(SELL_SIGNAL_COLUMN)?;

        log::info!(
            "Monitor for {} initialized with {} bars",
            session.params.identifier,
            session.window.len()
        );
        Ok(!self.cancel.is_cancelled())
    }

    async fn cycle(&mut self) -> AppResult<CycleOutcome> {
        let fetched = self
            .fetch(
                self.provider
                    .fetch_latest(&self.session.params.identifier, self.session.params.resolution),
            )
            .await?;
        let bar = match fetched {
            None => return Ok(CycleOutcome::Cancelled),
            Some(None) => return Ok(CycleOutcome::NoNewData),
            Some(Some(bar)) => bar,
        };
        bar.validate()?;

        let timestamp = bar.timestamp;
        let session = &mut self.session;
        if let Some(last) = session.window.last_timestamp() {
            if timestamp < last {
                log::debug!("Ignoring out-of-date bar at {} (last {})", timestamp, last);
                return Ok(CycleOutcome::NoNewData);
            }
        }
        let merged = session.window.upsert(bar);
        session.window.retain_latest(self.settings.retention);
        session.last_update = Some(timestamp);
        log::debug!("Merged bar {} ({:?})", timestamp, merged);

        if self.cancel.is_cancelled() {
            return Ok(CycleOutcome::Cancelled);
        }

        let strategy = &session.params.strategy;
        if let Some(filter) = &strategy.filter {
            session.filter_column = Some(self.recompute.recompute(&mut session.window, filter)?);
        }
        let buy_column = self.recompute.recompute(&mut session.window, &strategy.buy.spec)?;
        let sell_column = self.recompute.recompute(&mut session.window, &strategy.sell.spec)?;

        if self.cancel.is_cancelled() {
            return Ok(CycleOutcome::Cancelled);
        }

        let newest = session
            .window
            .len()
            .checked_sub(1)
            .ok_or_else(|| SignalError::malformed(BUY_SIGNAL_COLUMN, "window is empty"))?;
        apply_condition_at(
            &mut session.window,
            &buy_column,
            &strategy.buy.condition,
            Side::Buy,
            newest,
        )?;
        apply_condition_at(
            &mut session.window,
            &sell_column,
            &strategy.sell.condition,
            Side::Sell,
            newest,
        )?;
        session.buy_column = Some(buy_column);
        session.sell_column = Some(sell_column);

        // Replaying the retained window checks the event columns; bars that
        // fell out of retention can orphan a sell, so the session's own
        // trades stay the source of stats and equity.
        let replay = simulate(&session.window, BUY_SIGNAL_COLUMN, SELL_SIGNAL_COLUMN)?;
        let executions = session.apply_newest_events()?;
        log::debug!(
            "Window replay for {}: {} trades in view, {} in session",
            session.params.identifier,
            replay.stats.total_trades,
            session.trades.len()
        );
        Ok(CycleOutcome::Updated(session.build_update(executions)))
    }

    /// Run a provider call bounded by the fetch timeout and the stop flag.
    /// `Ok(None)` means the session was cancelled.
    async fn fetch<T, F>(&self, call: F) -> AppResult<Option<T>>
    where
        F: Future<Output = MarketDataResult<T>>,
    {
        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        let timeout = self.settings.fetch_timeout;
        tokio::select! {
            _ = self.cancel.cancelled(self.settings.stop_check) => Ok(None),
            result = tokio::time::timeout(timeout, call) => match result {
                Ok(fetched) => Ok(Some(fetched?)),
                Err(_) => Err(MarketDataError::Fetch(format!(
                    "provider did not answer within {:?}",
                    timeout
                ))
                .into()),
            },
        }
    }

    async fn transition(&mut self, next: MonitorState, message: impl Into<String>) {
        if !self.state.can_transition_to(next) {
            log::warn!("Ignoring monitor transition {} -> {}", self.state, next);
            return;
        }
        log::debug!("Monitor state {} -> {}", self.state, next);
        self.state = next;
        self.emit(MonitorEvent::status(next, message)).await;
    }

    /// Nothing is emitted once the session is cancelled. A dropped receiver
    /// cancels the session.
    async fn emit(&self, event: MonitorEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if self.events.send(event).await.is_err() {
            log::info!(
                "Event receiver for {} dropped, stopping",
                self.session.params.identifier
            );
            self.cancel.cancel();
            return false;
        }
        true
    }

    async fn finish(&mut self, reason: &str) {
        let snapshot = match self.session.snapshot() {
            Ok(update) => Some(update),
            Err(e) => {
                log::warn!("Final snapshot unavailable: {}", e);
                None
            }
        };
        self.state = MonitorState::Stopped;
        log::info!(
            "Monitor for {} stopped: {} ({} trades, last update {:?})",
            self.session.params.identifier,
            reason,
            self.session.trades.len(),
            self.session.last_update
        );
        let stopped = MonitorEvent::Stopped {
            reason: reason.to_string(),
            snapshot,
        };
        if self.events.send(stopped).await.is_err() {
            log::debug!(
                "Receiver for {} already gone, Stopped event not delivered",
                self.session.params.identifier
            );
        }
    }
}

/// Receiving side of a session. Dropping it stops the session.
pub struct MonitorStream {
    receiver: mpsc::Receiver<MonitorEvent>,
    cancel: CancellationFlag,
}

impl MonitorStream {
    pub async fn next_event(&mut self) -> Option<MonitorEvent> {
        self.receiver.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }
}

impl Stream for MonitorStream {
    type Item = MonitorEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for MonitorStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawn a monitor task and hand back its event stream.
pub fn spawn_monitor(
    provider: Arc<dyn MarketDataProvider>,
    settings: MonitorSettings,
    params: SessionParams,
) -> (MonitorStream, JoinHandle<()>) {
    let cancel = CancellationFlag::new();
    let (sender, receiver) = mpsc::channel(settings.event_buffer.max(1));
    let monitor = LiveMonitor::new(provider, settings, params, cancel.clone(), sender);
    let handle = tokio::spawn(monitor.run());
    (MonitorStream { receiver, cancel }, handle)
}
