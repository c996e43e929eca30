//! camcast: camera capture with MJPEG streaming over HTTP
//!
//! One capture task pulls JPEG frames from a [`source::Source`] at the
//! configured rate and publishes them to a [`broadcast::Broadcaster`]. Each
//! `/stream` client gets its own subscription and receives the frames as a
//! `multipart/x-mixed-replace` body. `/config` and `/health` expose
//! read-only snapshots.
//!
//! ```text
//!   Source ──► CaptureLoop ──► Broadcaster ──┬──► StreamHandler ──► client
//!                  │                         ├──► StreamHandler ──► client
//!                  ▼                         └──► StreamHandler ──► client
//!            HealthMonitor ──► /health
//! ```
//!
//! # Example
//!
//! ```no_run
//! use camcast::{App, Config};
//!
//! #[tokio::main]
//! async fn main() -> camcast::Result<()> {
//!     let config = Config::from_env()?;
//!     let app = App::bind(config).await?;
//!     app.run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod capture;
pub mod config;
pub mod error;
pub mod server;
pub mod source;
pub mod stream;

pub use broadcast::{Broadcaster, Subscription};
pub use capture::{CaptureLoop, Frame, HealthMonitor, HealthSnapshot, SourceKind};
pub use config::Config;
pub use error::{CaptureError, Error, OpenError, Result};
pub use server::App;
pub use source::{FrameSource, Source};
pub use stream::StreamHandler;
