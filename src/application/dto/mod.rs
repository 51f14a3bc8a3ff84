// src/application/dto/mod.rs
// Data transfer objects leaving the application layer

pub mod chart;
pub mod event;

pub use chart::{ChartSnapshot, Marker, OverlaySeries};
pub use event::{MonitorEvent, MonitorUpdate};
