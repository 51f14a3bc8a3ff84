// src/infrastructure/strategy/mod.rs
// Built-in signal synthesizer mapping short descriptions onto indicators

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::{SignalError, SignalResult};
use crate::domain::service::{SignalCalculation, SignalSynthesizer};
use crate::infrastructure::analysis::{Indicator, IndicatorCalculation};

const DEFAULT_SMA_PERIOD: usize = 20;
const DEFAULT_EMA_PERIOD: usize = 20;
const DEFAULT_RSI_PERIOD: usize = 14;
const DEFAULT_ROC_PERIOD: usize = 10;

/// Understands descriptions such as `"rsi 14"`, `"SMA(50)"`,
/// `"exponential moving average 12"` or `"closing price"`.
pub fn parse_description(description: &str) -> SignalResult<Indicator> {
    let text = description.to_lowercase();
    let tokens: Vec<&str> = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let has = |word: &str| tokens.contains(&word);
    let period = tokens.iter().find_map(|t| t.parse::<usize>().ok());

    let indicator = if has("rsi") || text.contains("relative strength") {
        Indicator::Rsi(period.unwrap_or(DEFAULT_RSI_PERIOD))
    } else if has("ema") || text.contains("exponential") {
        Indicator::Ema(period.unwrap_or(DEFAULT_EMA_PERIOD))
    } else if has("sma") || has("ma") || text.contains("moving average") {
        Indicator::Sma(period.unwrap_or(DEFAULT_SMA_PERIOD))
    } else if has("roc") || has("momentum") || text.contains("rate of change") {
        Indicator::Roc(period.unwrap_or(DEFAULT_ROC_PERIOD))
    } else if has("close") || has("closing") || has("price") {
        Indicator::Close
    } else {
        return Err(SignalError::Synthesis(format!(
            "no built-in calculation matches '{}'",
            description
        )));
    };

    if period == Some(0) {
        return Err(SignalError::Synthesis(format!(
            "period must be at least 1 in '{}'",
            description
        )));
    }
    Ok(indicator)
}

/// Synthesizer that needs no external service.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinSynthesizer;

impl BuiltinSynthesizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SignalSynthesizer for BuiltinSynthesizer {
    async fn synthesize(
        &self,
        description: &str,
        name: &str,
    ) -> SignalResult<Arc<dyn SignalCalculation>> {
        let indicator = parse_description(description)?;
        let column = if name.trim().is_empty() {
            indicator.default_column()
        } else {
            name.to_string()
        };
        log::debug!("Synthesized {} into column '{}'", indicator, column);
        Ok(Arc::new(IndicatorCalculation::new(indicator, column)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_descriptions() {
        assert_eq!(parse_description("RSI 14").unwrap(), Indicator::Rsi(14));
        assert_eq!(parse_description("SMA(50)").unwrap(), Indicator::Sma(50));
        assert_eq!(
            parse_description("exponential moving average 12").unwrap(),
            Indicator::Ema(12)
        );
        assert_eq!(parse_description("simple moving average").unwrap(), Indicator::Sma(20));
        assert_eq!(parse_description("rate of change 5").unwrap(), Indicator::Roc(5));
        assert_eq!(parse_description("closing price").unwrap(), Indicator::Close);
    }

    #[test]
    fn unknown_or_zero_period_fails() {
        assert!(matches!(
            parse_description("moon phase"),
            Err(SignalError::Synthesis(_))
        ));
        assert!(matches!(
            parse_description("sma 0"),
            Err(SignalError::Synthesis(_))
        ));
    }

    #[tokio::test]
    async fn synthesized_routine_writes_requested_column() {
        use crate::domain::model::{Bar, BarWindow};
        use chrono::{Duration, TimeZone, Utc};

        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut window = BarWindow::from_bars((0..5).map(|i| {
            let c = 10.0 + i as f64;
            Bar::new(start + Duration::hours(i), c, c, c, c, 1.0).unwrap()
        }));

        let calc = BuiltinSynthesizer::new()
            .synthesize("sma 2", "fast average")
            .await
            .unwrap();
        assert_eq!(calc.calculate(&mut window).unwrap(), "fast average");
        assert_eq!(window.numeric("fast average").unwrap()[4], Some(13.5));
    }
}
