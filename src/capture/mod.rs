//! Frame capture: the frame type, health state and the rate-governed loop

mod frame;
mod health;
mod runner;

pub use frame::Frame;
pub use health::{health_channel, HealthMonitor, HealthReporter, HealthSnapshot, SourceKind};
pub use runner::{CaptureLoop, CaptureStats};
