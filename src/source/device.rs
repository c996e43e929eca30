//! Physical capture device source
//!
//! Device reads block, so each read runs on tokio's blocking pool. The open
//! device lives behind an `Arc<Mutex<_>>`; dropping the last reference
//! releases it, which `close()` does for the source's own reference.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::task;

use crate::capture::SourceKind;
use crate::config::Config;
use crate::error::{CaptureError, OpenError};

use super::FrameSource;

#[cfg(all(feature = "v4l2", target_os = "linux"))]
use super::v4l2::DeviceCapture;

/// Capture parameters requested from the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSettings {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Requested frames per second
    pub fps: u32,
    /// JPEG quality used when frames need re-encoding
    pub quality: u8,
    /// Upper bound on a single blocking read
    pub read_timeout: Duration,
}

impl DeviceSettings {
    /// Derive device settings from the service configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            width: config.resolution_width,
            height: config.resolution_height,
            fps: config.frame_rate.round().max(1.0) as u32,
            quality: config.jpeg_quality,
            read_timeout: config.read_timeout,
        }
    }
}

/// Frame source backed by a capture device
pub struct DeviceSource {
    path: String,
    settings: DeviceSettings,
    capture: Option<Arc<Mutex<DeviceCapture>>>,
}

impl DeviceSource {
    /// Open the configured device
    ///
    /// Fails with `DeviceUnavailable` if no path is configured, the path does
    /// not exist, or the device rejects the requested format. Blocks while
    /// the device is negotiated.
    pub fn open(config: &Config) -> Result<Self, OpenError> {
        let path = config
            .camera_device
            .as_deref()
            .ok_or_else(|| OpenError::DeviceUnavailable("no device path configured".into()))?;

        Self::open_path(path, DeviceSettings::from_config(config))
    }

    /// Open a device by path with explicit settings
    pub fn open_path(path: &str, settings: DeviceSettings) -> Result<Self, OpenError> {
        let capture = open_capture(path, &settings)?;

        tracing::info!(
            device = path,
            width = settings.width,
            height = settings.height,
            fps = settings.fps,
            "Capture device opened"
        );

        Ok(Self {
            path: path.to_string(),
            settings,
            capture: Some(Arc::new(Mutex::new(capture))),
        })
    }

    /// Device path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the device is currently open
    pub fn is_open(&self) -> bool {
        self.capture.is_some()
    }
}

impl FrameSource for DeviceSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Device
    }

    async fn next_frame(&mut self) -> Result<Bytes, CaptureError> {
        let capture = self
            .capture
            .clone()
            .ok_or_else(|| CaptureError::DeviceLost(format!("{} is closed", self.path)))?;

        task::spawn_blocking(move || capture.lock().read())
            .await
            .map_err(|e| CaptureError::ReadFailed(format!("capture task failed: {}", e)))?
    }

    async fn reopen(&mut self) -> Result<(), OpenError> {
        self.close();

        let path = self.path.clone();
        let settings = self.settings.clone();
        let capture = task::spawn_blocking(move || open_capture(&path, &settings))
            .await
            .map_err(|e| OpenError::DeviceUnavailable(format!("reopen task failed: {}", e)))??;

        self.capture = Some(Arc::new(Mutex::new(capture)));
        tracing::info!(device = %self.path, "Capture device reopened");
        Ok(())
    }

    fn close(&mut self) {
        if self.capture.take().is_some() {
            tracing::debug!(device = %self.path, "Capture device closed");
        }
    }
}

impl std::fmt::Debug for DeviceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSource")
            .field("path", &self.path)
            .field("settings", &self.settings)
            .field("open", &self.is_open())
            .finish()
    }
}

fn open_capture(path: &str, settings: &DeviceSettings) -> Result<DeviceCapture, OpenError> {
    if path.trim().is_empty() {
        return Err(OpenError::DeviceUnavailable("device path is empty".into()));
    }
    if !Path::new(path).exists() {
        return Err(OpenError::DeviceUnavailable(format!("{} does not exist", path)));
    }

    DeviceCapture::open(path, settings)
}

/// Stand-in when the crate is built without device support. It can never be
/// constructed, so every open attempt falls back to the synthetic source.
#[cfg(not(all(feature = "v4l2", target_os = "linux")))]
enum DeviceCapture {}

#[cfg(not(all(feature = "v4l2", target_os = "linux")))]
impl DeviceCapture {
    fn open(path: &str, _settings: &DeviceSettings) -> Result<Self, OpenError> {
        Err(OpenError::DeviceUnavailable(format!(
            "{}: built without v4l2 capture support",
            path
        )))
    }

    fn read(&mut self) -> Result<Bytes, CaptureError> {
        match *self {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_device_configured() {
        let config = Config::default();
        let result = DeviceSource::open(&config);

        assert!(matches!(result, Err(OpenError::DeviceUnavailable(_))));
    }

    #[test]
    fn test_empty_path() {
        let settings = DeviceSettings::from_config(&Config::default());
        let result = DeviceSource::open_path("  ", settings);

        assert!(matches!(result, Err(OpenError::DeviceUnavailable(_))));
    }

    #[test]
    fn test_missing_path() {
        let config = Config::default().camera_device("/dev/camcast-does-not-exist");
        let err = DeviceSource::open(&config).unwrap_err();

        assert_eq!(
            err,
            OpenError::DeviceUnavailable("/dev/camcast-does-not-exist does not exist".into())
        );
    }

    #[test]
    fn test_settings_from_config() {
        let config = Config::default().frame_rate(29.6).resolution(640, 480);
        let settings = DeviceSettings::from_config(&config);

        assert_eq!(settings.fps, 30);
        assert_eq!((settings.width, settings.height), (640, 480));
        assert_eq!(settings.quality, config.jpeg_quality);
    }
}
