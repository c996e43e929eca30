//! HTTP surface
//!
//! ```text
//!   GET /stream ──► StreamHandler ◄── Broadcaster ◄── CaptureLoop ◄── Source
//!   GET /config ──► Arc<Config>
//!   GET /health ──► HealthMonitor ◄──────────────────── CaptureLoop
//! ```

mod listener;
mod routes;

pub use listener::App;
pub use routes::{router, AppState, HealthReport};
