// src/infrastructure/mod.rs
pub mod analysis;
pub mod market;
pub mod strategy;

pub use analysis::{Indicator, IndicatorCalculation};
pub use market::ReplayMarketData;
pub use strategy::{parse_description, BuiltinSynthesizer};
