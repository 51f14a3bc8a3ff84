// src/application/service/recompute.rs
// Per-cycle signal refresh strategies for live monitoring

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::application::usecase::signal_evaluation_usecase::evaluate_signal;
use crate::domain::errors::SignalResult;
use crate::domain::model::{BarWindow, SignalSpec};

/// Refreshes a signal's column after new bars were merged into the window.
/// Returns the column name.
pub trait RecomputeStrategy: Send + Sync {
    fn recompute(&self, window: &mut BarWindow, spec: &SignalSpec) -> SignalResult<String>;

    fn name(&self) -> &'static str;
}

/// Recompute over the last bars and write back the newest value only. Older
/// values in the window are left untouched.
///
/// The slice covers at least `lookback` bars and at least the calculation's
/// own `min_history`. If the slice still yields no newest value while the
/// bar before it had one, the whole window is recomputed instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailRecompute {
    pub lookback: usize,
}

impl TailRecompute {
    pub fn new(lookback: usize) -> Self {
        Self {
            lookback: lookback.max(1),
        }
    }

    /// Bars evaluated for `spec`.
    pub fn span(&self, spec: &SignalSpec) -> usize {
        self.lookback.max(spec.calculation.min_history())
    }
}

fn had_previous_value(window: &BarWindow, column: &str) -> bool {
    window
        .numeric(column)
        .ok()
        .and_then(|values| values.len().checked_sub(2).and_then(|i| values[i]))
        .is_some()
}

impl RecomputeStrategy for TailRecompute {
    fn recompute(&self, window: &mut BarWindow, spec: &SignalSpec) -> SignalResult<String> {
        let mut tail = window.tail(self.span(spec));
        let column = evaluate_signal(&mut tail, spec)?;
        let newest = tail.numeric(&column)?.last().copied().flatten();

        if newest.is_none() && tail.len() < window.len() && had_previous_value(window, &column) {
            log::debug!(
                "Tail of {} bars too short for '{}', recomputing full window",
                tail.len(),
                spec.name
            );
            return FullRecompute.recompute(window, spec);
        }

        let target = window.ensure_numeric_column(&column)?;
        if let Some(slot) = target.last_mut() {
            *slot = newest;
        }
        Ok(column)
    }

    fn name(&self) -> &'static str {
        "tail"
    }
}

/// Recompute the whole window from scratch and replace the column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FullRecompute;

impl RecomputeStrategy for FullRecompute {
    fn recompute(&self, window: &mut BarWindow, spec: &SignalSpec) -> SignalResult<String> {
        let mut fresh = window.bars_only();
        let column = evaluate_signal(&mut fresh, spec)?;
        let values = fresh.numeric(&column)?.to_vec();
        window.set_numeric_column(&column, values)?;
        Ok(column)
    }

    fn name(&self) -> &'static str {
        "full"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecomputeMode {
    #[default]
    Tail,
    Full,
}

impl RecomputeMode {
    pub fn build(&self, lookback: usize) -> Arc<dyn RecomputeStrategy> {
        match self {
            RecomputeMode::Tail => Arc::new(TailRecompute::new(lookback)),
            RecomputeMode::Full => Arc::new(FullRecompute),
        }
    }
}

impl std::str::FromStr for RecomputeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tail" => Ok(RecomputeMode::Tail),
            "full" => Ok(RecomputeMode::Full),
            other => Err(format!("unknown recompute mode '{}'", other)),
        }
    }
}
