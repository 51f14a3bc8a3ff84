// src/application/dto/event.rs
// Events emitted by a live monitoring session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::dto::chart::ChartSnapshot;
use crate::application::service::state::MonitorState;
use crate::domain::model::{Execution, Position, TradingStats};

/// Result of one processed cycle (or of the initial/final snapshot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorUpdate {
    pub timestamp: Option<DateTime<Utc>>,
    pub latest_price: Option<f64>,
    /// Executions accepted on the newest bar during this cycle.
    pub executions: Vec<Execution>,
    pub position: Position,
    pub cumulative_pnl_pct: f64,
    pub stats: TradingStats,
    pub chart: ChartSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    Status {
        state: MonitorState,
        message: String,
    },
    /// Emitted once after initialisation, before the first live bar.
    Snapshot(MonitorUpdate),
    Update(MonitorUpdate),
    Error {
        stage: MonitorState,
        message: String,
        fatal: bool,
    },
    /// Always the last event of a session.
    Stopped {
        reason: String,
        snapshot: Option<MonitorUpdate>,
    },
}

impl MonitorEvent {
    pub fn status(state: MonitorState, message: impl Into<String>) -> Self {
        MonitorEvent::Status {
            state,
            message: message.into(),
        }
    }

    pub fn error(stage: MonitorState, message: impl ToString, fatal: bool) -> Self {
        MonitorEvent::Error {
            stage,
            message: message.to_string(),
            fatal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MonitorEvent::Stopped { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MonitorEvent::Status { .. } => "status",
            MonitorEvent::Snapshot(_) => "snapshot",
            MonitorEvent::Update(_) => "update",
            MonitorEvent::Error { .. } => "error",
            MonitorEvent::Stopped { .. } => "stopped",
        }
    }
}
