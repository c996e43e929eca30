//! Video4Linux2 capture backend
//!
//! Negotiates MJPEG first so frames pass through untouched; devices that
//! only offer YUYV are converted to RGB and re-encoded.

use std::io;

use bytes::Bytes;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::error::{CaptureError, OpenError};

use super::convert::{encode_jpeg, yuyv_to_rgb};
use super::device::DeviceSettings;

/// Number of mmap buffers queued with the driver
const BUFFER_COUNT: u32 = 4;

/// `ENODEV`: the device node went away
const ENODEV: i32 = 19;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
    Mjpeg,
    Yuyv,
}

impl PixelFormat {
    fn fourcc(self) -> FourCC {
        match self {
            PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
            PixelFormat::Yuyv => FourCC::new(b"YUYV"),
        }
    }
}

/// An open, streaming capture device
pub(super) struct DeviceCapture {
    // Declared before the device so buffers are unmapped first
    stream: Stream<'static>,
    _device: Device,
    format: PixelFormat,
    settings: DeviceSettings,
}

impl DeviceCapture {
    pub(super) fn open(path: &str, settings: &DeviceSettings) -> Result<Self, OpenError> {
        let unavailable =
            |what: &str, e: io::Error| OpenError::DeviceUnavailable(format!("{}: {}: {}", path, what, e));

        let device = Device::with_path(path).map_err(|e| unavailable("open failed", e))?;
        let format = negotiate_format(&device, path, settings)?;

        if let Err(e) = device.set_params(&Parameters::with_fps(settings.fps)) {
            tracing::warn!(
                device = path,
                fps = settings.fps,
                error = %e,
                "Frame interval not accepted, using device default"
            );
        }

        let mut stream = Stream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| unavailable("buffer setup failed", e))?;
        stream.set_timeout(settings.read_timeout);

        tracing::debug!(device = path, format = ?format, "Capture stream started");

        Ok(Self {
            stream,
            _device: device,
            format,
            settings: settings.clone(),
        })
    }

    pub(super) fn read(&mut self) -> Result<Bytes, CaptureError> {
        let (data, meta) = self.stream.next().map_err(classify_read_error)?;

        let used = (meta.bytesused as usize).min(data.len());
        let data = if used == 0 { data } else { &data[..used] };

        match self.format {
            PixelFormat::Mjpeg => Ok(Bytes::copy_from_slice(data)),
            PixelFormat::Yuyv => {
                let rgb = yuyv_to_rgb(data, self.settings.width, self.settings.height)?;
                encode_jpeg(&rgb, self.settings.quality)
            }
        }
    }
}

fn negotiate_format(
    device: &Device,
    path: &str,
    settings: &DeviceSettings,
) -> Result<PixelFormat, OpenError> {
    let mut rejected = Vec::new();

    for candidate in [PixelFormat::Mjpeg, PixelFormat::Yuyv] {
        let mut requested = device.format().map_err(|e| {
            OpenError::DeviceUnavailable(format!("{}: cannot query format: {}", path, e))
        })?;
        requested.width = settings.width;
        requested.height = settings.height;
        requested.fourcc = candidate.fourcc();

        match device.set_format(&requested) {
            Ok(applied)
                if applied.fourcc == candidate.fourcc()
                    && applied.width == settings.width
                    && applied.height == settings.height =>
            {
                return Ok(candidate);
            }
            Ok(applied) => {
                rejected.push(format!(
                    "{:?} negotiated to {}x{} {}",
                    candidate, applied.width, applied.height, applied.fourcc
                ));
            }
            Err(e) => rejected.push(format!("{:?}: {}", candidate, e)),
        }

        tracing::warn!(
            device = path,
            format = ?candidate,
            width = settings.width,
            height = settings.height,
            "Format not accepted by device"
        );
    }

    Err(OpenError::DeviceUnavailable(format!(
        "{} rejected requested format ({})",
        path,
        rejected.join("; ")
    )))
}

fn classify_read_error(e: io::Error) -> CaptureError {
    if e.raw_os_error() == Some(ENODEV) {
        CaptureError::DeviceLost(e.to_string())
    } else {
        CaptureError::ReadFailed(e.to_string())
    }
}
