//! Captured frame type
//!
//! A `Frame` is immutable once created. Cloning it only bumps the reference
//! count of the underlying `Bytes`, so every subscriber shares one buffer.

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// One encoded still image from the active source
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position in publish order, starting at 1
    pub sequence: u64,
    /// Wall-clock capture time
    pub captured_at: DateTime<Utc>,
    /// Encoded JPEG data
    pub data: Bytes,
}

impl Frame {
    /// Create a frame captured now
    pub fn new(sequence: u64, data: Bytes) -> Self {
        Self {
            sequence,
            captured_at: Utc::now(),
            data,
        }
    }

    /// Encoded size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the frame carries no data
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
