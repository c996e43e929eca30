//! Frame sources
//!
//! A frame source produces one encoded JPEG per call. Production code uses
//! exactly two: a physical capture device and a synthetic test pattern.
//! Which one runs is decided once, at startup, by [`Source::select`].
//!
//! ```text
//!   camera_device set? ──no──────────────────────┐
//!         │ yes                                  ▼
//!   DeviceSource::open ──DeviceUnavailable──► SyntheticSource
//!         │ ok
//!         ▼
//!   DeviceSource
//! ```

mod convert;
mod device;
mod synthetic;
#[cfg(all(feature = "v4l2", target_os = "linux"))]
mod v4l2;

use bytes::Bytes;

pub use convert::{encode_jpeg, yuyv_to_rgb};
pub use device::{DeviceSettings, DeviceSource};
pub use synthetic::SyntheticSource;

use crate::capture::SourceKind;
use crate::config::Config;
use crate::error::{CaptureError, OpenError};

/// Something that can produce encoded frames on demand
#[allow(async_fn_in_trait)]
pub trait FrameSource: Send {
    /// Kind reported in health snapshots
    fn kind(&self) -> SourceKind;

    /// Produce the next encoded frame
    async fn next_frame(&mut self) -> Result<Bytes, CaptureError>;

    /// Release and re-acquire the underlying resource
    async fn reopen(&mut self) -> Result<(), OpenError>;

    /// Release the underlying resource. Idempotent.
    fn close(&mut self);
}

/// The source chosen at startup
#[derive(Debug)]
pub enum Source {
    /// Physical capture device
    Device(DeviceSource),
    /// Generated test pattern
    Synthetic(SyntheticSource),
}

impl Source {
    /// Choose the source for this process
    ///
    /// Uses the configured device when it opens; otherwise falls back to the
    /// synthetic generator. Never fails, and is not retried per frame.
    pub fn select(config: &Config) -> Self {
        let Some(device) = config.camera_device.as_deref() else {
            tracing::warn!("No camera device configured; using synthetic source");
            return Source::Synthetic(SyntheticSource::open(config));
        };

        match DeviceSource::open(config) {
            Ok(source) => {
                tracing::info!(device, "Using capture device");
                Source::Device(source)
            }
            Err(e) => {
                tracing::error!(device, error = %e, "Falling back to synthetic source");
                Source::Synthetic(SyntheticSource::open(config))
            }
        }
    }
}

impl FrameSource for Source {
    fn kind(&self) -> SourceKind {
        match self {
            Source::Device(source) => source.kind(),
            Source::Synthetic(source) => source.kind(),
        }
    }

    async fn next_frame(&mut self) -> Result<Bytes, CaptureError> {
        match self {
            Source::Device(source) => source.next_frame().await,
            Source::Synthetic(source) => source.next_frame().await,
        }
    }

    async fn reopen(&mut self) -> Result<(), OpenError> {
        match self {
            Source::Device(source) => source.reopen().await,
            Source::Synthetic(source) => source.reopen().await,
        }
    }

    fn close(&mut self) {
        match self {
            Source::Device(source) => source.close(),
            Source::Synthetic(source) => source.close(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_without_device() {
        let source = Source::select(&Config::default());

        assert!(matches!(source, Source::Synthetic(_)));
        assert_eq!(source.kind(), SourceKind::Synthetic);
    }

    #[test]
    fn test_select_unreachable_device_falls_back() {
        let config = Config::default().camera_device("/dev/camcast-missing-video");
        let source = Source::select(&config);

        assert!(matches!(source, Source::Synthetic(_)));
    }

    #[tokio::test]
    async fn test_selected_source_produces_frames() {
        let config = Config::default().resolution(32, 24);
        let mut source = Source::select(&config);

        let jpeg = source.next_frame().await.unwrap();
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);

        source.close();
        assert!(source.reopen().await.is_ok());
    }
}
