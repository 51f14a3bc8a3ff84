// src/domain/model/signal.rs
use crate::domain::errors::{SignalError, SignalResult};
use crate::domain::service::SignalCalculation;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub const BUY_SIGNAL_COLUMN: &str = "buy_signal";
pub const SELL_SIGNAL_COLUMN: &str = "sell_signal";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Name of the event column this side writes to.
    pub fn event_column(&self) -> &'static str {
        match self {
            Side::Buy => BUY_SIGNAL_COLUMN,
            Side::Sell => SELL_SIGNAL_COLUMN,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Greater => ">",
            Operator::Less => "<",
            Operator::GreaterOrEqual => ">=",
            Operator::LessOrEqual => "<=",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
        }
    }

    pub fn compare(&self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::Greater => value > threshold,
            Operator::Less => value < threshold,
            Operator::GreaterOrEqual => value >= threshold,
            Operator::LessOrEqual => value <= threshold,
            Operator::Equal => value == threshold,
            Operator::NotEqual => value != threshold,
        }
    }
}

impl FromStr for Operator {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" => Ok(Operator::Greater),
            "<" => Ok(Operator::Less),
            ">=" => Ok(Operator::GreaterOrEqual),
            "<=" => Ok(Operator::LessOrEqual),
            "==" => Ok(Operator::Equal),
            "!=" => Ok(Operator::NotEqual),
            other => Err(SignalError::InvalidCondition(format!(
                "unknown operator '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// `value <operator> threshold`, with the decimal threshold converted once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    pub operator: Operator,
    pub threshold: Decimal,
    #[serde(skip)]
    threshold_value: f64,
}

impl Condition {
    pub fn new(operator: Operator, threshold: Decimal) -> SignalResult<Self> {
        let threshold_value = threshold.to_f64().ok_or_else(|| {
            SignalError::InvalidCondition(format!("threshold {} is not representable", threshold))
        })?;
        Ok(Self {
            operator,
            threshold,
            threshold_value,
        })
    }

    pub fn parse(operator: &str, threshold: Decimal) -> SignalResult<Self> {
        Self::new(operator.parse()?, threshold)
    }

    /// A missing value never satisfies a condition.
    pub fn holds(&self, value: Option<f64>) -> bool {
        match value {
            Some(v) => self.operator.compare(v, self.threshold_value),
            None => false,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.operator, self.threshold)
    }
}

/// A named, opaque calculation producing one numeric column.
#[derive(Clone)]
pub struct SignalSpec {
    pub name: String,
    pub calculation: Arc<dyn SignalCalculation>,
}

impl SignalSpec {
    pub fn new(name: impl Into<String>, calculation: Arc<dyn SignalCalculation>) -> Self {
        Self {
            name: name.into(),
            calculation,
        }
    }
}

impl fmt::Debug for SignalSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SignalSpec")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A signal together with the condition that turns it into events.
#[derive(Debug, Clone)]
pub struct SignalRule {
    pub spec: SignalSpec,
    pub condition: Condition,
}

impl SignalRule {
    pub fn new(spec: SignalSpec, condition: Condition) -> Self {
        Self { spec, condition }
    }
}

#[derive(Debug, Clone)]
pub struct StrategyDefinition {
    /// Evaluated for charting context only; never produces events.
    pub filter: Option<SignalSpec>,
    pub buy: SignalRule,
    pub sell: SignalRule,
}

impl StrategyDefinition {
    pub fn new(buy: SignalRule, sell: SignalRule) -> Self {
        Self {
            filter: None,
            buy,
            sell,
        }
    }

    pub fn with_filter(mut self, filter: SignalSpec) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn title(&self) -> String {
        format!(
            "{} {} (Buy) + {} {} (Sell)",
            self.buy.spec.name, self.buy.condition, self.sell.spec.name, self.sell.condition
        )
    }
}
