#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use signal_trader::application::dto::MonitorEvent;
use signal_trader::application::service::{MonitorSettings, MonitorStream, SessionParams};
use signal_trader::domain::errors::{MarketDataError, MarketDataResult};
pub use signal_trader::domain::model::Bar;
use signal_trader::domain::model::{
    BarWindow, Condition, Resolution, SignalRule, SignalSpec, StrategyDefinition,
};
use signal_trader::domain::repository::MarketDataProvider;
use signal_trader::domain::service::CalculationError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

/// What the mock returns for one `fetch_latest` call.
#[derive(Debug, Clone)]
pub enum LiveStep {
    Bar(Bar),
    Empty,
    Error(String),
    Hang,
}

pub struct MockMarketData {
    pub history: Vec<Bar>,
    pub history_error: Option<String>,
    pub live: Mutex<VecDeque<LiveStep>>,
    pub latest_calls: AtomicUsize,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self {
            history: Vec::new(),
            history_error: None,
            live: Mutex::new(VecDeque::new()),
            latest_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_history(mut self, bars: Vec<Bar>) -> Self {
        self.history = bars;
        self
    }

    pub fn with_history_error(mut self, reason: &str) -> Self {
        self.history_error = Some(reason.to_string());
        self
    }

    pub fn with_live(self, steps: Vec<LiveStep>) -> Self {
        self.live.lock().unwrap().extend(steps);
        self
    }

    pub fn with_live_bars(self, bars: Vec<Bar>) -> Self {
        self.with_live(bars.into_iter().map(LiveStep::Bar).collect())
    }

    pub fn latest_calls(&self) -> usize {
        self.latest_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataProvider for MockMarketData {
    async fn fetch_history(
        &self,
        _identifier: &str,
        _resolution: Resolution,
        count: usize,
    ) -> MarketDataResult<Vec<Bar>> {
        if let Some(reason) = &self.history_error {
            return Err(MarketDataError::Fetch(reason.clone()));
        }
        let start = self.history.len().saturating_sub(count);
        Ok(self.history[start..].to_vec())
    }

    async fn fetch_latest(
        &self,
        _identifier: &str,
        _resolution: Resolution,
    ) -> MarketDataResult<Option<Bar>> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.live.lock().unwrap().pop_front();
        match step {
            Some(LiveStep::Bar(bar)) => Ok(Some(bar)),
            Some(LiveStep::Empty) | None => Ok(None),
            Some(LiveStep::Error(reason)) => Err(MarketDataError::Fetch(reason)),
            Some(LiveStep::Hang) => std::future::pending().await,
        }
    }
}

pub fn t(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
}

pub fn make_bar(minute: i64, close: f64) -> Bar {
    Bar::new(t(minute), close, close + 1.0, close - 1.0, close, 1000.0).unwrap()
}

pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, c)| make_bar(i as i64, *c))
        .collect()
}

/// Signal whose value is the bar's close.
pub fn price_signal(name: &'static str) -> SignalSpec {
    SignalSpec::new(
        name,
        Arc::new(move |w: &mut BarWindow| -> Result<String, CalculationError> {
            let values = w.closes().into_iter().map(Some).collect();
            w.set_numeric_column(name, values)?;
            Ok(name.to_string())
        }),
    )
}

pub fn failing_signal(name: &'static str) -> SignalSpec {
    SignalSpec::new(
        name,
        Arc::new(|_: &mut BarWindow| -> Result<String, CalculationError> {
            Err("calculation blew up".into())
        }),
    )
}

/// Buy when close < `buy_below`, sell when close > `sell_above`.
pub fn threshold_strategy(buy_below: i64, sell_above: i64) -> StrategyDefinition {
    StrategyDefinition::new(
        SignalRule::new(
            price_signal("price"),
            Condition::parse("<", Decimal::from(buy_below)).unwrap(),
        ),
        SignalRule::new(
            price_signal("price"),
            Condition::parse(">", Decimal::from(sell_above)).unwrap(),
        ),
    )
}

pub fn session(strategy: StrategyDefinition) -> SessionParams {
    SessionParams {
        identifier: "TEST".to_string(),
        resolution: Resolution::default(),
        strategy,
    }
}

pub fn fast_settings() -> MonitorSettings {
    MonitorSettings {
        poll_interval: StdDuration::from_millis(5),
        stop_check: StdDuration::from_millis(2),
        error_backoff: StdDuration::from_millis(5),
        fetch_timeout: StdDuration::from_millis(500),
        ..MonitorSettings::default()
    }
}

/// Collect events until the stream ends, cancelling once `stop_after`
/// returns true for a received event.
pub async fn collect_events<F>(stream: &mut MonitorStream, mut stop_after: F) -> Vec<MonitorEvent>
where
    F: FnMut(&[MonitorEvent]) -> bool,
{
    let mut events = Vec::new();
    let collect = async {
        while let Some(event) = stream.next_event().await {
            events.push(event);
            if stop_after(&events) {
                stream.cancel();
            }
        }
    };
    tokio::time::timeout(StdDuration::from_secs(10), collect)
        .await
        .expect("monitor did not finish in time");
    events
}

pub fn updates(events: &[MonitorEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, MonitorEvent::Update(_)))
        .count()
}
