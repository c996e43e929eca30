//! Subscriber side of the broadcaster

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, Notify};

use crate::capture::Frame;

use super::hub::Shared;

/// Unique identifier of one connected subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Removal signal shared by a registry entry and its subscription
#[derive(Debug, Default)]
pub(super) struct Kick {
    removed: AtomicBool,
    notify: Notify,
}

impl Kick {
    /// Mark the subscription removed and wake it if it is waiting
    pub(super) fn fire(&self) {
        self.removed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    fn fired(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }
}

/// Registry record for one subscriber
#[derive(Debug)]
pub(super) struct SubscriberEntry {
    pub(super) connected_at: Instant,
    pub(super) kick: Arc<Kick>,
}

/// Handle returned by [`Broadcaster::subscribe`](super::Broadcaster::subscribe)
///
/// Receives frames published after it was created, in publish order. If the
/// holder falls more than the channel capacity behind, the oldest frames are
/// skipped. Dropping the handle deregisters it.
pub struct Subscription {
    id: SubscriberId,
    rx: broadcast::Receiver<Frame>,
    shared: Weak<Shared>,
    kick: Arc<Kick>,
    closed: bool,
    skipped: u64,
    received: u64,
}

impl Subscription {
    pub(super) fn new(
        id: SubscriberId,
        rx: broadcast::Receiver<Frame>,
        shared: Weak<Shared>,
        kick: Arc<Kick>,
    ) -> Self {
        Self {
            id,
            rx,
            shared,
            kick,
            closed: false,
            skipped: 0,
            received: 0,
        }
    }

    /// This subscriber's id
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Frames dropped because this subscriber fell behind
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Frames delivered to this subscriber
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Wait for the next frame
    ///
    /// Returns `None` once the subscription has been removed (from either
    /// side) or the broadcaster is gone.
    pub async fn recv(&mut self) -> Option<Frame> {
        if self.closed || self.kick.fired() {
            self.closed = true;
            return None;
        }

        loop {
            tokio::select! {
                biased;
                _ = self.kick.notify.notified() => {
                    self.closed = true;
                    return None;
                }
                result = self.rx.recv() => match result {
                    Ok(frame) => {
                        self.received += 1;
                        return Some(frame);
                    }
                    Err(RecvError::Lagged(missed)) => self.record_lag(missed),
                    Err(RecvError::Closed) => {
                        self.closed = true;
                        return None;
                    }
                },
            }
        }
    }

    /// Take the next frame if one is already waiting
    ///
    /// Like [`recv`](Self::recv), returns `None` once the subscription has
    /// been removed, even if frames are still buffered.
    pub fn try_recv(&mut self) -> Option<Frame> {
        if self.closed || self.kick.fired() {
            self.closed = true;
            return None;
        }

        loop {
            match self.rx.try_recv() {
                Ok(frame) => {
                    self.received += 1;
                    return Some(frame);
                }
                Err(TryRecvError::Lagged(missed)) => self.record_lag(missed),
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Closed) => {
                    self.closed = true;
                    return None;
                }
            }
        }
    }

    fn record_lag(&mut self, missed: u64) {
        self.skipped += missed;
        tracing::debug!(
            subscriber = %self.id,
            missed,
            total_skipped = self.skipped,
            "Subscriber lagging, skipped frames"
        );
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .field("skipped", &self.skipped)
            .field("received", &self.received)
            .finish()
    }
}
