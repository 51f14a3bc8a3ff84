// src/domain/repository/mod.rs
// Repository interfaces for market data

use async_trait::async_trait;

use crate::domain::errors::MarketDataResult;
use crate::domain::model::{Bar, Resolution};

/// Source of historical and incremental OHLCV bars.
///
/// Empty results mean "no data right now" and are not errors. Overlapping or
/// duplicate timestamps are allowed; the bar window resolves them.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Up to `count` of the most recent bars, oldest first.
    async fn fetch_history(
        &self,
        identifier: &str,
        resolution: Resolution,
        count: usize,
    ) -> MarketDataResult<Vec<Bar>>;

    /// The most recent (possibly still forming) bar.
    async fn fetch_latest(
        &self,
        identifier: &str,
        resolution: Resolution,
    ) -> MarketDataResult<Option<Bar>>;
}
