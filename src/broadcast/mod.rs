//! Frame fan-out to connected viewers
//!
//! One capture task publishes; any number of stream handlers subscribe.
//! Frames travel through `tokio::sync::broadcast`, and `Frame` wraps
//! `bytes::Bytes`, so every subscriber reads the same buffer.
//!
//! ```text
//!                      Broadcaster (Arc<Shared>)
//!                 ┌──────────────────────────────┐
//!  CaptureLoop ──►│ tx: broadcast::Sender<Frame> │
//!   publish()     │ subscribers: Mutex<HashMap<  │
//!                 │   SubscriberId, entry>>      │
//!                 └──────────────┬───────────────┘
//!              ┌─────────────────┼─────────────────┐
//!              ▼                 ▼                 ▼
//!        Subscription      Subscription      Subscription
//!          recv()            recv()            recv()
//!              │                 │                 │
//!              ▼                 ▼                 ▼
//!        StreamHandler     StreamHandler     StreamHandler
//! ```
//!
//! Each subscription buffers at most `capacity` frames. A subscriber that
//! falls further behind loses its oldest frames; everyone else is unaffected.

mod hub;
mod subscriber;

pub use hub::{BroadcastStats, Broadcaster};
pub use subscriber::{SubscriberId, Subscription};
