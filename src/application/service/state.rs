// src/application/service/state.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a live monitoring session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Starting,
    Initializing,
    Ready,
    Processing,
    Idle,
    Error,
    Stopped,
}

impl MonitorState {
    /// Stopped is reachable from everywhere and left from nowhere.
    pub fn can_transition_to(&self, next: MonitorState) -> bool {
        use MonitorState::*;
        match (self, next) {
            (Stopped, _) => false,
            (_, Stopped) => true,
            (Starting, Initializing) => true,
            (Initializing, Ready) | (Initializing, Error) => true,
            (Ready, Processing) => true,
            (Processing, Idle) | (Processing, Error) => true,
            (Idle, Processing) => true,
            (Error, Processing) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MonitorState::Stopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorState::Starting => "starting",
            MonitorState::Initializing => "initializing",
            MonitorState::Ready => "ready",
            MonitorState::Processing => "processing",
            MonitorState::Idle => "idle",
            MonitorState::Error => "error",
            MonitorState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
