//! Broadcaster implementation
//!
//! The registry lock is only taken to insert, remove or count subscribers.
//! `publish` never touches it and never waits: a full subscriber buffer
//! drops that subscriber's oldest frame instead of blocking the sender.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::capture::Frame;

use super::subscriber::{Kick, SubscriberEntry, SubscriberId, Subscription};

/// Broadcaster counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastStats {
    /// Currently registered subscribers
    pub subscribers: usize,
    /// Frames published since creation
    pub frames_published: u64,
}

pub(super) struct Shared {
    tx: broadcast::Sender<Frame>,
    subscribers: Mutex<HashMap<SubscriberId, SubscriberEntry>>,
    next_id: AtomicU64,
    frames_published: AtomicU64,
    closed: AtomicBool,
}

impl Shared {
    /// Remove a subscriber and wake it if it is waiting. Idempotent.
    pub(super) fn remove(&self, id: SubscriberId) -> bool {
        let entry = self.subscribers.lock().remove(&id);

        match entry {
            Some(entry) => {
                entry.kick.fire();
                tracing::debug!(
                    subscriber = %id,
                    connected_secs = entry.connected_at.elapsed().as_secs(),
                    "Subscriber removed"
                );
                true
            }
            None => false,
        }
    }
}

/// Fan-out hub from the capture loop to every connected viewer
///
/// Cheap to clone; all clones share one subscriber registry.
#[derive(Clone)]
pub struct Broadcaster {
    shared: Arc<Shared>,
}

impl Broadcaster {
    /// Create a broadcaster buffering up to `capacity` frames per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));

        Self {
            shared: Arc::new(Shared {
                tx,
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                frames_published: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Deliver a frame to every current subscriber
    ///
    /// Returns the number of receivers the frame was queued for.
    pub fn publish(&self, frame: Frame) -> usize {
        self.shared.frames_published.fetch_add(1, Ordering::Relaxed);
        // send() only errors when nobody is listening
        self.shared.tx.send(frame).unwrap_or(0)
    }

    /// Register a new subscriber
    ///
    /// After [`close`](Self::close) the returned subscription is already
    /// ended and is not registered.
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriberId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let kick = Arc::new(Kick::default());

        // Receiver is created under the lock so registry and channel agree
        let (rx, count) = {
            let mut subscribers = self.shared.subscribers.lock();
            if self.shared.closed.load(Ordering::Acquire) {
                kick.fire();
                (self.shared.tx.subscribe(), None)
            } else {
                subscribers.insert(
                    id,
                    SubscriberEntry {
                        connected_at: Instant::now(),
                        kick: Arc::clone(&kick),
                    },
                );
                (self.shared.tx.subscribe(), Some(subscribers.len()))
            }
        };

        match count {
            Some(count) => {
                tracing::debug!(subscriber = %id, subscribers = count, "Subscriber added")
            }
            None => tracing::debug!(subscriber = %id, "Subscribe after close, ending at once"),
        }

        Subscription::new(id, rx, Arc::downgrade(&self.shared), kick)
    }

    /// Remove a subscriber. Safe to call repeatedly or after the handle is dropped.
    ///
    /// Returns `true` if the subscriber was registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.shared.remove(id)
    }

    /// Close the broadcaster: remove every subscriber, ending their streams,
    /// and end any later subscription immediately
    ///
    /// Returns the number of subscribers removed.
    pub fn close(&self) -> usize {
        let drained: Vec<_> = {
            let mut subscribers = self.shared.subscribers.lock();
            self.shared.closed.store(true, Ordering::Release);
            subscribers.drain().collect()
        };
        for (_, entry) in &drained {
            entry.kick.fire();
        }

        tracing::info!(subscribers = drained.len(), "Broadcaster closed");
        drained.len()
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Whether a subscriber is registered
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.shared.subscribers.lock().contains_key(&id)
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.lock().len()
    }

    /// Current counters
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            subscribers: self.subscriber_count(),
            frames_published: self.shared.frames_published.load(Ordering::Relaxed),
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(4)
    }
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster").field("stats", &self.stats()).finish()
    }
}
