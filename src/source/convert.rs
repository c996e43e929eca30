//! Pixel conversion and JPEG encoding

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, Rgb, RgbImage};

use crate::error::CaptureError;

/// Encode an RGB image as JPEG
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Bytes, CaptureError> {
    let mut cursor = Cursor::new(Vec::with_capacity(
        (image.width() * image.height()) as usize / 4,
    ));
    let mut encoder = JpegEncoder::new_with_quality(&mut cursor, quality.clamp(1, 100));
    encoder
        .encode_image(image)
        .map_err(|e| CaptureError::ReadFailed(format!("JPEG encode failed: {}", e)))?;

    Ok(Bytes::from(cursor.into_inner()))
}

/// Convert a packed YUYV (YUV 4:2:2) buffer to RGB
///
/// Trailing bytes past `width * height * 2` are ignored.
pub fn yuyv_to_rgb(frame: &[u8], width: u32, height: u32) -> Result<RgbImage, CaptureError> {
    let expected_len = (width as usize) * (height as usize) * 2;
    if frame.len() < expected_len {
        return Err(CaptureError::ReadFailed(format!(
            "YUYV frame length {} smaller than expected {} for {}x{}",
            frame.len(),
            expected_len,
            width,
            height
        )));
    }

    let mut rgb = Vec::with_capacity((width as usize) * (height as usize) * 3);
    for chunk in frame[..expected_len].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;

        rgb.extend_from_slice(&yuv_to_rgb(chunk[0] as f32, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(chunk[2] as f32, u, v));
    }

    ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, rgb).ok_or_else(|| {
        CaptureError::ReadFailed(format!("odd frame width {} for YUYV", width))
    })
}

// BT.601 full range
fn yuv_to_rgb(y: f32, u: f32, v: f32) -> [u8; 3] {
    let r = y + 1.402 * v;
    let g = y - 0.344_136 * u - 0.714_136 * v;
    let b = y + 1.772 * u;

    [clamp_u8(r), clamp_u8(g), clamp_u8(b)]
}

fn clamp_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_grey() {
        // Neutral chroma yields grey pixels equal to luma
        let frame = [16, 128, 200, 128, 0, 128, 255, 128];
        let image = yuyv_to_rgb(&frame, 2, 2).unwrap();

        assert_eq!(image.get_pixel(0, 0).0, [16, 16, 16]);
        assert_eq!(image.get_pixel(1, 0).0, [200, 200, 200]);
        assert_eq!(image.get_pixel(0, 1).0, [0, 0, 0]);
        assert_eq!(image.get_pixel(1, 1).0, [255, 255, 255]);
    }

    #[test]
    fn test_yuyv_saturated_red() {
        let frame = [82, 90, 82, 240];
        let image = yuyv_to_rgb(&frame, 2, 1).unwrap();
        let [r, g, b] = image.get_pixel(0, 0).0;

        assert!(r > 230);
        assert!(g < 20);
        assert!(b < 20);
    }

    #[test]
    fn test_yuyv_short_frame() {
        let result = yuyv_to_rgb(&[0u8; 6], 2, 2);
        assert!(matches!(result, Err(CaptureError::ReadFailed(_))));
    }

    #[test]
    fn test_encode_jpeg_magic() {
        let image = RgbImage::from_pixel(8, 8, Rgb([10, 200, 30]));
        let jpeg = encode_jpeg(&image, 80).unwrap();

        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }
}
