//! Error types
//!
//! Device-level errors (`OpenError`, `CaptureError`) never escape the capture
//! loop; they are folded into health state. The crate-level `Error` covers
//! startup failures (configuration, socket binding).

use std::fmt;

use crate::config::ConfigError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Failure to open a frame source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenError {
    /// The device path is empty, missing, or the device rejected the requested format
    DeviceUnavailable(String),
}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenError::DeviceUnavailable(reason) => write!(f, "Device unavailable: {}", reason),
        }
    }
}

impl std::error::Error for OpenError {}

/// Failure to produce a single frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Transient read or encode failure; retried on the next tick
    ReadFailed(String),
    /// The device is gone (unplugged, closed, or too many consecutive failures)
    DeviceLost(String),
}

impl CaptureError {
    /// Whether this error means the device can no longer produce frames
    pub fn is_device_lost(&self) -> bool {
        matches!(self, CaptureError::DeviceLost(_))
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::ReadFailed(reason) => write!(f, "Frame read failed: {}", reason),
            CaptureError::DeviceLost(reason) => write!(f, "Device lost: {}", reason),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Top-level error
#[derive(Debug)]
pub enum Error {
    /// Socket or filesystem error
    Io(std::io::Error),
    /// Invalid configuration
    Config(ConfigError),
    /// Source could not be opened
    Open(OpenError),
    /// Frame could not be captured
    Capture(CaptureError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Open(e) => write!(f, "{}", e),
            Error::Capture(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Config(e) => Some(e),
            Error::Open(e) => Some(e),
            Error::Capture(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<OpenError> for Error {
    fn from(e: OpenError) -> Self {
        Error::Open(e)
    }
}

impl From<CaptureError> for Error {
    fn from(e: CaptureError) -> Self {
        Error::Capture(e)
    }
}
