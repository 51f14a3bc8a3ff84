// src/infrastructure/market/mod.rs
// Replay market data provider backed by memory or a JSON bar file

use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::errors::{MarketDataError, MarketDataResult};
use crate::domain::model::{Bar, Resolution};
use crate::domain::repository::MarketDataProvider;

/// Serves a fixed history, then one queued bar per `fetch_latest` call.
pub struct ReplayMarketData {
    history: Vec<Bar>,
    pending: Mutex<VecDeque<Bar>>,
}

impl ReplayMarketData {
    pub fn new(history: Vec<Bar>, live: Vec<Bar>) -> Self {
        Self {
            history,
            pending: Mutex::new(live.into()),
        }
    }

    /// The first `history_len` bars form the history, the rest are replayed.
    pub fn from_bars(mut bars: Vec<Bar>, history_len: usize) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        let live = bars.split_off(history_len.min(bars.len()));
        Self::new(bars, live)
    }

    /// Load a JSON array of bars.
    pub fn load_bars(path: impl AsRef<Path>) -> MarketDataResult<Vec<Bar>> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MarketDataError::Fetch(format!("cannot read {}: {}", path.display(), e))
        })?;
        let bars: Vec<Bar> = serde_json::from_str(&content).map_err(|e| {
            MarketDataError::Fetch(format!("cannot parse {}: {}", path.display(), e))
        })?;
        for bar in &bars {
            bar.validate()?;
        }
        log::info!("Loaded {} bars from {}", bars.len(), path.display());
        Ok(bars)
    }

    pub fn from_json_file(path: impl AsRef<Path>, history_len: usize) -> MarketDataResult<Self> {
        Ok(Self::from_bars(Self::load_bars(path)?, history_len))
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub async fn remaining(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[async_trait]
impl MarketDataProvider for ReplayMarketData {
    async fn fetch_history(
        &self,
        identifier: &str,
        resolution: Resolution,
        count: usize,
    ) -> MarketDataResult<Vec<Bar>> {
        let start = self.history.len().saturating_sub(count);
        log::debug!(
            "Replaying {} {} history bars for {}",
            self.history.len() - start,
            resolution,
            identifier
        );
        Ok(self.history[start..].to_vec())
    }

    async fn fetch_latest(
        &self,
        identifier: &str,
        _resolution: Resolution,
    ) -> MarketDataResult<Option<Bar>> {
        let next = self.pending.lock().await.pop_front();
        if next.is_none() {
            log::debug!("Replay for {} exhausted", identifier);
        }
        Ok(next)
    }
}
