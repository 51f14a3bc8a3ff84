// src/infrastructure/analysis/mod.rs
// Built-in indicator calculations usable as signal routines

use std::fmt;

use ta::indicators::{ExponentialMovingAverage, RelativeStrengthIndex};
use ta::Next;

use crate::domain::model::BarWindow;
use crate::domain::service::{CalculationError, SignalCalculation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Close,
    Sma(usize),
    Ema(usize),
    Rsi(usize),
    Roc(usize),
}

impl Indicator {
    pub fn default_column(&self) -> String {
        match self {
            Indicator::Close => "close".to_string(),
            Indicator::Sma(p) => format!("sma_{}", p),
            Indicator::Ema(p) => format!("ema_{}", p),
            Indicator::Rsi(p) => format!("rsi_{}", p),
            Indicator::Roc(p) => format!("roc_{}", p),
        }
    }

    /// Closes needed for a defined newest value.
    pub fn min_history(&self) -> usize {
        match *self {
            Indicator::Close => 1,
            Indicator::Sma(p) | Indicator::Ema(p) | Indicator::Rsi(p) | Indicator::Roc(p) => p + 1,
        }
    }

    /// One value per close; `None` until the indicator has enough history.
    pub fn compute(&self, closes: &[f64]) -> Result<Vec<Option<f64>>, CalculationError> {
        match *self {
            Indicator::Close => Ok(closes.iter().copied().map(Some).collect()),
            Indicator::Sma(period) => Ok(sma(closes, check_period(period)?)),
            Indicator::Ema(period) => ema(closes, check_period(period)?),
            Indicator::Rsi(period) => rsi(closes, check_period(period)?),
            Indicator::Roc(period) => Ok(roc(closes, check_period(period)?)),
        }
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Indicator::Close => write!(f, "close"),
            Indicator::Sma(p) => write!(f, "SMA({})", p),
            Indicator::Ema(p) => write!(f, "EMA({})", p),
            Indicator::Rsi(p) => write!(f, "RSI({})", p),
            Indicator::Roc(p) => write!(f, "ROC({})", p),
        }
    }
}

fn check_period(period: usize) -> Result<usize, CalculationError> {
    if period == 0 {
        return Err("indicator period must be at least 1".into());
    }
    Ok(period)
}

// Each value is summed over its own slice so that any window ending on the
// same bars yields bit-identical results.
fn sma(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..closes.len())
        .map(|i| {
            (i + 1 >= period)
                .then(|| closes[i + 1 - period..=i].iter().sum::<f64>() / period as f64)
        })
        .collect()
}

fn roc(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..closes.len())
        .map(|i| {
            if i < period || closes[i - period] == 0.0 {
                return None;
            }
            let base = closes[i - period];
            Some((closes[i] - base) / base * 100.0)
        })
        .collect()
}

fn ema(closes: &[f64], period: usize) -> Result<Vec<Option<f64>>, CalculationError> {
    let mut indicator = ExponentialMovingAverage::new(period)
        .map_err(|e| format!("invalid EMA period {}: {:?}", period, e))?;
    Ok(closes
        .iter()
        .enumerate()
        .map(|(i, close)| {
            let value = indicator.next(*close);
            (i + 1 >= period).then_some(value)
        })
        .collect())
}

fn rsi(closes: &[f64], period: usize) -> Result<Vec<Option<f64>>, CalculationError> {
    let mut indicator = RelativeStrengthIndex::new(period)
        .map_err(|e| format!("invalid RSI period {}: {:?}", period, e))?;
    Ok(closes
        .iter()
        .enumerate()
        .map(|(i, close)| {
            let value = indicator.next(*close);
            (i >= period).then_some(value)
        })
        .collect())
}

/// An indicator bound to the column it writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorCalculation {
    indicator: Indicator,
    column: String,
}

impl IndicatorCalculation {
    pub fn new(indicator: Indicator, column: impl Into<String>) -> Self {
        Self {
            indicator,
            column: column.into(),
        }
    }

    pub fn with_default_column(indicator: Indicator) -> Self {
        let column = indicator.default_column();
        Self::new(indicator, column)
    }

    pub fn indicator(&self) -> Indicator {
        self.indicator
    }

    pub fn column(&self) -> &str {
        &self.column
    }
}

impl SignalCalculation for IndicatorCalculation {
    fn calculate(&self, window: &mut BarWindow) -> Result<String, CalculationError> {
        if let Some(existing) = window.find_numeric_column(&self.column) {
            return Ok(existing.to_string());
        }
        let values = self.indicator.compute(&window.closes())?;
        window.set_numeric_column(&self.column, values)?;
        Ok(self.column.clone())
    }

    fn min_history(&self) -> usize {
        self.indicator.min_history()
    }
}
