// src/application/dto/chart.rs
// Serializable chart description handed to rendering consumers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::model::{Bar, BarWindow, EquityCurve, EquityPoint, Side};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlaySeries {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Everything needed to draw price, events, indicator overlays and equity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChartSnapshot {
    pub title: String,
    pub candles: Vec<Bar>,
    pub buy_markers: Vec<Marker>,
    pub sell_markers: Vec<Marker>,
    pub overlays: Vec<OverlaySeries>,
    pub equity: Vec<EquityPoint>,
}

impl ChartSnapshot {
    /// Columns listed in `overlay_columns` that are missing or not numeric are
    /// skipped, as are absent event columns.
    pub fn build(
        title: impl Into<String>,
        window: &BarWindow,
        overlay_columns: &[String],
        equity: &EquityCurve,
    ) -> Self {
        let mut overlays: Vec<OverlaySeries> = Vec::new();
        for name in overlay_columns {
            if overlays.iter().any(|o| &o.name == name) {
                continue;
            }
            if let Ok(values) = window.numeric(name) {
                overlays.push(OverlaySeries {
                    name: name.clone(),
                    values: values.to_vec(),
                });
            }
        }

        Self {
            title: title.into(),
            candles: window.bars().to_vec(),
            buy_markers: markers(window, Side::Buy),
            sell_markers: markers(window, Side::Sell),
            overlays,
            equity: equity.points.clone(),
        }
    }
}

fn markers(window: &BarWindow, side: Side) -> Vec<Marker> {
    match window.flags(side.event_column()) {
        Ok(flags) => window
            .bars()
            .iter()
            .zip(flags)
            .filter(|(_, fired)| **fired)
            .map(|(bar, _)| Marker {
                timestamp: bar.timestamp,
                price: bar.close,
            })
            .collect(),
        Err(_) => Vec::new(),
    }
}
