//! Monitoring engine: the facade callers use and the per-task workers it spawns.

pub mod control;
pub mod monitor;

pub use control::{Engine, EngineConfig, MonitorRequest};
pub use monitor::MonitorExit;
