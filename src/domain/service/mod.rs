// src/domain/service/mod.rs
// Domain service interfaces

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::SignalResult;
use crate::domain::model::BarWindow;

/// Error type returned by opaque calculation routines.
pub type CalculationError = Box<dyn std::error::Error + Send + Sync>;

/// A named pure function from a bar window to one numeric column.
///
/// Implementations either write a new numeric column into the window or
/// recognise a column that is already present, and return the column name.
/// They must be idempotent.
pub trait SignalCalculation: Send + Sync {
    fn calculate(&self, window: &mut BarWindow) -> Result<String, CalculationError>;

    /// Bars needed before the newest value is defined. Zero when unknown.
    fn min_history(&self) -> usize {
        0
    }
}

impl<F> SignalCalculation for F
where
    F: Fn(&mut BarWindow) -> Result<String, CalculationError> + Send + Sync,
{
    fn calculate(&self, window: &mut BarWindow) -> Result<String, CalculationError> {
        self(window)
    }
}

/// Turns a natural-language signal description into a calculation routine.
#[async_trait]
pub trait SignalSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        description: &str,
        name: &str,
    ) -> SignalResult<Arc<dyn SignalCalculation>>;
}
