//! Process configuration
//!
//! Loaded once at startup from the environment and never mutated afterwards.
//! The capture loop, the broadcaster and the HTTP handlers all read the same
//! `Arc<Config>`.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

/// Lowest accepted target frame rate
pub const MIN_FRAME_RATE: f32 = 1.0;

/// Highest accepted target frame rate
pub const MAX_FRAME_RATE: f32 = 60.0;

/// Service configuration
///
/// Only the listener, rate, resolution and device fields are part of the
/// public `/config` document; the tunables below them are internal.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Address to bind the HTTP listener to
    pub listen_address: IpAddr,

    /// Port to bind the HTTP listener to (0 = ephemeral)
    pub port: u16,

    /// Target frame rate, always within 1..=60
    pub frame_rate: f32,

    /// Frame width in pixels
    pub resolution_width: u32,

    /// Frame height in pixels
    pub resolution_height: u32,

    /// Capture device path; `None` forces the synthetic source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_device: Option<String>,

    /// Consecutive capture failures before the source is reported degraded
    #[serde(skip)]
    pub failure_threshold: u32,

    /// Minimum delay between device reopen attempts while degraded
    #[serde(skip)]
    pub reopen_interval: Duration,

    /// Upper bound on a single blocking device read
    #[serde(skip)]
    pub read_timeout: Duration,

    /// Frames buffered per subscriber before the oldest are dropped
    #[serde(skip)]
    pub stream_buffer: usize,

    /// Maximum concurrent stream clients (0 = unlimited)
    #[serde(skip)]
    pub max_clients: usize,

    /// JPEG quality for frames this service encodes itself (1..=100)
    #[serde(skip)]
    pub jpeg_quality: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            frame_rate: 12.0,
            resolution_width: 1280,
            resolution_height: 720,
            camera_device: None,
            failure_threshold: 5,
            reopen_interval: Duration::from_secs(5),
            read_timeout: Duration::from_millis(2000),
            stream_buffer: 4,
            max_clients: 0, // Unlimited
            jpeg_quality: 80,
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// Unset keys fall back to defaults. Out-of-range frame rates and JPEG
    /// qualities are clamped; anything unparseable is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let listen_address = parse_var(&lookup, "BACKEND_HOST")?.unwrap_or(defaults.listen_address);
        let port = parse_var(&lookup, "BACKEND_PORT")?.unwrap_or(defaults.port);

        let frame_rate: f32 = parse_var(&lookup, "FRAME_RATE")?.unwrap_or(defaults.frame_rate);
        if !frame_rate.is_finite() {
            return Err(ConfigError::invalid(
                "FRAME_RATE",
                frame_rate.to_string(),
                "must be a finite number",
            ));
        }
        let clamped_rate = frame_rate.clamp(MIN_FRAME_RATE, MAX_FRAME_RATE);
        if clamped_rate != frame_rate {
            tracing::warn!(
                requested = frame_rate,
                applied = clamped_rate,
                "FRAME_RATE out of range, clamping"
            );
        }

        let resolution_width =
            parse_var(&lookup, "FRAME_WIDTH")?.unwrap_or(defaults.resolution_width);
        let resolution_height =
            parse_var(&lookup, "FRAME_HEIGHT")?.unwrap_or(defaults.resolution_height);
        if resolution_width == 0 {
            return Err(ConfigError::invalid("FRAME_WIDTH", "0", "must be greater than zero"));
        }
        if resolution_height == 0 {
            return Err(ConfigError::invalid("FRAME_HEIGHT", "0", "must be greater than zero"));
        }

        let camera_device = lookup("CAMERA_DEVICE")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let failure_threshold: u32 = parse_var(&lookup, "CAPTURE_FAILURE_THRESHOLD")?
            .unwrap_or(defaults.failure_threshold);
        if failure_threshold == 0 {
            return Err(ConfigError::invalid(
                "CAPTURE_FAILURE_THRESHOLD",
                "0",
                "must be at least 1",
            ));
        }

        let reopen_interval = parse_var(&lookup, "DEVICE_REOPEN_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.reopen_interval);
        let read_timeout = parse_var(&lookup, "DEVICE_READ_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.read_timeout);

        let stream_buffer: usize =
            parse_var(&lookup, "STREAM_BUFFER_FRAMES")?.unwrap_or(defaults.stream_buffer);
        if stream_buffer == 0 {
            return Err(ConfigError::invalid(
                "STREAM_BUFFER_FRAMES",
                "0",
                "must be at least 1",
            ));
        }

        let max_clients = parse_var(&lookup, "MAX_STREAM_CLIENTS")?.unwrap_or(defaults.max_clients);
        // Parsed wide so out-of-range values clamp instead of failing
        let jpeg_quality: u32 = parse_var(&lookup, "JPEG_QUALITY")?
            .unwrap_or(u32::from(defaults.jpeg_quality));

        Ok(Self {
            listen_address,
            port,
            frame_rate: clamped_rate,
            resolution_width,
            resolution_height,
            camera_device,
            failure_threshold,
            reopen_interval,
            read_timeout,
            stream_buffer,
            max_clients,
            jpeg_quality: jpeg_quality.clamp(1, 100) as u8,
        })
    }

    /// Target time between two published frames
    pub fn frame_interval(&self) -> Duration {
        let rate = self.frame_rate.clamp(MIN_FRAME_RATE, MAX_FRAME_RATE);
        Duration::from_secs_f64(1.0 / rate as f64)
    }

    /// Socket address the HTTP listener binds to
    pub fn listen_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.port)
    }

    /// Set the bind address and port
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.listen_address = addr.ip();
        self.port = addr.port();
        self
    }

    /// Set the target frame rate (clamped to 1..=60)
    pub fn frame_rate(mut self, rate: f32) -> Self {
        self.frame_rate = rate.clamp(MIN_FRAME_RATE, MAX_FRAME_RATE);
        self
    }

    /// Set the frame resolution
    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution_width = width.max(1);
        self.resolution_height = height.max(1);
        self
    }

    /// Set the capture device path
    pub fn camera_device(mut self, device: impl Into<String>) -> Self {
        let device = device.into();
        self.camera_device = if device.trim().is_empty() {
            None
        } else {
            Some(device)
        };
        self
    }

    /// Set the consecutive-failure threshold (minimum 1)
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Set the per-subscriber frame backlog (minimum 1)
    pub fn stream_buffer(mut self, frames: usize) -> Self {
        self.stream_buffer = frames.max(1);
        self
    }

    /// Set maximum concurrent stream clients
    pub fn max_clients(mut self, max: usize) -> Self {
        self.max_clients = max;
        self
    }

    /// Set the delay between device reopen attempts
    pub fn reopen_interval(mut self, interval: Duration) -> Self {
        self.reopen_interval = interval;
        self
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::invalid(var, raw.clone(), e.to_string())),
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment value could not be used
    Invalid {
        /// Variable name
        var: &'static str,
        /// Raw value as found
        value: String,
        /// Why it was rejected
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            var,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { var, value, reason } => {
                write!(f, "Invalid {}={:?}: {}", var, value, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.port, 8080);
        assert_eq!(config.frame_rate, 12.0);
        assert_eq!(config.resolution_width, 1280);
        assert_eq!(config.resolution_height, 720);
        assert!(config.camera_device.is_none());
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.stream_buffer, 4);
    }

    #[test]
    fn test_empty_environment_uses_defaults() {
        let config = Config::from_lookup(|_| None).unwrap();

        assert_eq!(config.listen_socket_addr(), "0.0.0.0:8080".parse().unwrap());
        assert!(config.camera_device.is_none());
    }

    #[test]
    fn test_from_lookup_parses_values() {
        let config = Config::from_lookup(lookup_from(&[
            ("BACKEND_HOST", "127.0.0.1"),
            ("BACKEND_PORT", "9000"),
            ("FRAME_RATE", "30"),
            ("FRAME_WIDTH", "640"),
            ("FRAME_HEIGHT", "480"),
            ("CAMERA_DEVICE", "/dev/video2"),
            ("CAPTURE_FAILURE_THRESHOLD", "3"),
            ("STREAM_BUFFER_FRAMES", "8"),
            ("MAX_STREAM_CLIENTS", "16"),
        ]))
        .unwrap();

        assert_eq!(config.listen_socket_addr(), "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.frame_rate, 30.0);
        assert_eq!(config.resolution_width, 640);
        assert_eq!(config.resolution_height, 480);
        assert_eq!(config.camera_device.as_deref(), Some("/dev/video2"));
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.stream_buffer, 8);
        assert_eq!(config.max_clients, 16);
    }

    #[test]
    fn test_frame_rate_clamped() {
        let high = Config::from_lookup(lookup_from(&[("FRAME_RATE", "240")])).unwrap();
        assert_eq!(high.frame_rate, MAX_FRAME_RATE);

        let low = Config::from_lookup(lookup_from(&[("FRAME_RATE", "0.2")])).unwrap();
        assert_eq!(low.frame_rate, MIN_FRAME_RATE);
    }

    #[test]
    fn test_frame_rate_not_finite() {
        let result = Config::from_lookup(lookup_from(&[("FRAME_RATE", "NaN")]));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { var: "FRAME_RATE", .. })
        ));
    }

    #[test]
    fn test_blank_device_forces_none() {
        let config = Config::from_lookup(lookup_from(&[("CAMERA_DEVICE", "   ")])).unwrap();
        assert!(config.camera_device.is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let port = Config::from_lookup(lookup_from(&[("BACKEND_PORT", "http")]));
        assert!(matches!(port, Err(ConfigError::Invalid { var: "BACKEND_PORT", .. })));

        let width = Config::from_lookup(lookup_from(&[("FRAME_WIDTH", "0")]));
        assert!(matches!(width, Err(ConfigError::Invalid { var: "FRAME_WIDTH", .. })));

        let buffer = Config::from_lookup(lookup_from(&[("STREAM_BUFFER_FRAMES", "0")]));
        assert!(matches!(
            buffer,
            Err(ConfigError::Invalid { var: "STREAM_BUFFER_FRAMES", .. })
        ));
    }

    #[test]
    fn test_jpeg_quality_clamped() {
        let config = Config::from_lookup(lookup_from(&[("JPEG_QUALITY", "0")])).unwrap();
        assert_eq!(config.jpeg_quality, 1);

        let config = Config::from_lookup(lookup_from(&[("JPEG_QUALITY", "300")])).unwrap();
        assert_eq!(config.jpeg_quality, 100);

        let invalid = Config::from_lookup(lookup_from(&[("JPEG_QUALITY", "high")]));
        assert!(matches!(
            invalid,
            Err(ConfigError::Invalid { var: "JPEG_QUALITY", .. })
        ));
    }

    #[test]
    fn test_frame_interval() {
        let config = Config::default().frame_rate(4.0);
        assert_eq!(config.frame_interval(), Duration::from_millis(250));

        let config = Config::default().frame_rate(1.0);
        assert_eq!(config.frame_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let config = Config::default()
            .bind(addr)
            .frame_rate(100.0)
            .resolution(320, 240)
            .camera_device("")
            .failure_threshold(0)
            .stream_buffer(0)
            .max_clients(2);

        assert_eq!(config.listen_socket_addr(), addr);
        assert_eq!(config.frame_rate, MAX_FRAME_RATE);
        assert_eq!((config.resolution_width, config.resolution_height), (320, 240));
        assert!(config.camera_device.is_none());
        assert_eq!(config.failure_threshold, 1);
        assert_eq!(config.stream_buffer, 1);
        assert_eq!(config.max_clients, 2);
    }

    #[test]
    fn test_serialized_fields() {
        let config = Config::default();
        let json = serde_json::to_value(&config).unwrap();
        let object = json.as_object().unwrap();

        assert_eq!(object.len(), 5);
        assert!(object.get("camera_device").is_none());
        assert_eq!(object["resolution_width"], 1280);

        let json = serde_json::to_value(Config::default().camera_device("/dev/video0")).unwrap();
        assert_eq!(json["camera_device"], "/dev/video0");
    }
}
