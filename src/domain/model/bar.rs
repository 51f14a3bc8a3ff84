// src/domain/model/bar.rs
use crate::domain::errors::{MarketDataError, MarketDataResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One OHLCV observation for a fixed time bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Create a validated bar.
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> MarketDataResult<Self> {
        let bar = Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        };
        bar.validate()?;
        Ok(bar)
    }

    /// Check finiteness and `high >= max(open, close) >= min(open, close) >= low`.
    pub fn validate(&self) -> MarketDataResult<()> {
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(self.invalid(format!("{} is not finite ({})", name, value)));
        }
        // open, high and close must be positive; low may touch zero
        if let Some((name, value)) = fields[..4]
            .iter()
            .filter(|(name, _)| *name != "low")
            .find(|(_, v)| *v <= 0.0)
        {
            return Err(self.invalid(format!("{} must be positive ({})", name, value)));
        }
        if self.low < 0.0 || self.volume < 0.0 {
            return Err(self.invalid(format!(
                "low {} and volume {} must not be negative",
                self.low, self.volume
            )));
        }

        let body_high = self.open.max(self.close);
        let body_low = self.open.min(self.close);
        if self.high < body_high {
            return Err(self.invalid(format!(
                "high {} is below the candle body top {}",
                self.high, body_high
            )));
        }
        if self.low > body_low {
            return Err(self.invalid(format!(
                "low {} is above the candle body bottom {}",
                self.low, body_low
            )));
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> MarketDataError {
        MarketDataError::InvalidBar {
            timestamp: self.timestamp.to_rfc3339(),
            reason,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Minute,
    Hour,
    Day,
}

/// Bar bucket size, e.g. `15m` or `4h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub unit: TimeUnit,
    pub aggregate: u32,
}

impl Resolution {
    pub fn new(unit: TimeUnit, aggregate: u32) -> MarketDataResult<Self> {
        if aggregate == 0 {
            return Err(MarketDataError::InvalidResolution(
                "aggregate must be at least 1".to_string(),
            ));
        }
        Ok(Self { unit, aggregate })
    }

    pub fn duration(&self) -> Duration {
        let n = i64::from(self.aggregate);
        match self.unit {
            TimeUnit::Minute => Duration::minutes(n),
            TimeUnit::Hour => Duration::hours(n),
            TimeUnit::Day => Duration::days(n),
        }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            unit: TimeUnit::Minute,
            aggregate: 1,
        }
    }
}

impl FromStr for Resolution {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim().to_lowercase();
        match raw.as_str() {
            "minute" => return Resolution::new(TimeUnit::Minute, 1),
            "hour" => return Resolution::new(TimeUnit::Hour, 1),
            "day" => return Resolution::new(TimeUnit::Day, 1),
            _ => {}
        }

        let invalid = || MarketDataError::InvalidResolution(s.to_string());
        let suffix = raw.chars().last().ok_or_else(invalid)?;
        let unit = match suffix {
            'm' => TimeUnit::Minute,
            'h' => TimeUnit::Hour,
            'd' => TimeUnit::Day,
            _ => return Err(invalid()),
        };
        let aggregate: u32 = raw[..raw.len() - 1].parse().map_err(|_| invalid())?;
        Resolution::new(unit, aggregate)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let suffix = match self.unit {
            TimeUnit::Minute => "m",
            TimeUnit::Hour => "h",
            TimeUnit::Day => "d",
        };
        write!(f, "{}{}", self.aggregate, suffix)
    }
}

/// Aggregate bars into `resolution` buckets.
///
/// Open is taken from the first bar of a bucket, close from the last, high and
/// low are the extremes and volume is summed. Each output bar is stamped with
/// the start of its bucket. Input is expected in ascending timestamp order.
pub fn resample(bars: &[Bar], resolution: Resolution) -> Vec<Bar> {
    let bucket_secs = resolution.duration().num_seconds();
    let mut result: Vec<Bar> = Vec::new();

    for bar in bars {
        let start = bar.timestamp.timestamp().div_euclid(bucket_secs) * bucket_secs;
        let Some(bucket) = DateTime::<Utc>::from_timestamp(start, 0) else {
            continue;
        };

        match result.last_mut() {
            Some(current) if current.timestamp == bucket => {
                current.high = current.high.max(bar.high);
                current.low = current.low.min(bar.low);
                current.close = bar.close;
                current.volume += bar.volume;
            }
            _ => result.push(Bar {
                timestamp: bucket,
                ..bar.clone()
            }),
        }
    }

    result
}
