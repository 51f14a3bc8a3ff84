// src/application/service/mod.rs
// Application services

pub mod cancellation;
pub mod monitor;
pub mod recompute;
pub mod state;

pub use cancellation::CancellationFlag;
pub use monitor::{spawn_monitor, LiveMonitor, MonitorSettings, MonitorStream, SessionParams};
pub use recompute::{FullRecompute, RecomputeMode, RecomputeStrategy, TailRecompute};
pub use state::MonitorState;
