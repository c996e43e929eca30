//! Synthetic test-pattern source
//!
//! Draws every frame on demand: a moving colour gradient, a vertical grid,
//! a progress bar driven by the frame counter, and the current UTC time
//! rendered with a small built-in bitmap font. Nothing is pre-rendered.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use image::{Rgb, RgbImage};
use tokio::task;

use crate::capture::SourceKind;
use crate::config::Config;
use crate::error::{CaptureError, OpenError};

use super::convert::encode_jpeg;
use super::FrameSource;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const SHADE: Rgb<u8> = Rgb([16, 16, 16]);

/// Glyph cell width in font pixels (3 columns + 1 spacing)
const GLYPH_ADVANCE: u32 = 4;
const GLYPH_ROWS: u32 = 5;

/// Procedural frame generator used when no capture device is available
#[derive(Debug)]
pub struct SyntheticSource {
    width: u32,
    height: u32,
    quality: u8,
    counter: u64,
}

impl SyntheticSource {
    /// Create a generator for the configured resolution. Never fails.
    pub fn open(config: &Config) -> Self {
        Self::new(
            config.resolution_width,
            config.resolution_height,
            config.jpeg_quality,
        )
    }

    /// Create a generator with explicit dimensions
    pub fn new(width: u32, height: u32, quality: u8) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            quality,
            counter: 0,
        }
    }

    /// Frames generated so far
    pub fn frames_generated(&self) -> u64 {
        self.counter
    }
}

impl FrameSource for SyntheticSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Synthetic
    }

    async fn next_frame(&mut self) -> Result<Bytes, CaptureError> {
        self.counter += 1;
        let (width, height, quality, counter) = (self.width, self.height, self.quality, self.counter);

        task::spawn_blocking(move || {
            let image = render_pattern(width, height, counter, Utc::now());
            encode_jpeg(&image, quality)
        })
        .await
        .map_err(|e| CaptureError::ReadFailed(format!("frame render task failed: {}", e)))?
    }

    async fn reopen(&mut self) -> Result<(), OpenError> {
        Ok(())
    }

    fn close(&mut self) {}
}

/// Render one test-pattern frame
pub(crate) fn render_pattern(width: u32, height: u32, counter: u64, at: DateTime<Utc>) -> RgbImage {
    let t = (counter % 1024) as f32;
    let mut image = RgbImage::from_fn(width, height, |x, y| {
        let xf = x as f32 / width as f32;
        let yf = y as f32 / height as f32;
        let r = ((xf * 255.0 + t) % 255.0) as u8;
        let g = ((yf * 255.0 + t * 0.5) % 255.0) as u8;
        let b = (((xf + yf) * 127.0 + t * 0.25) % 255.0) as u8;
        Rgb([r, g, b])
    });

    let step = (width / 10).max(1) as usize;
    for x in (0..width).step_by(step) {
        for y in 0..height {
            image.put_pixel(x, y, WHITE);
        }
    }

    // Progress bar along the bottom edge, one sweep per 100 frames
    let bar_height = (height / 40).max(1);
    let bar_width = ((counter % 100) as u32 + 1) * width / 100;
    fill_rect(&mut image, 0, height - bar_height, bar_width, bar_height, WHITE);

    let text = at.format("%H:%M:%S%.3f").to_string();
    let scale = (height / 60).max(1);
    let text_width = text.len() as u32 * GLYPH_ADVANCE * scale;
    let margin = scale * 2;
    fill_rect(
        &mut image,
        0,
        0,
        text_width + margin * 2,
        GLYPH_ROWS * scale + margin * 2,
        SHADE,
    );
    draw_text(&mut image, &text, margin, margin, scale);

    image
}

fn fill_rect(image: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    let x_end = x.saturating_add(w).min(image.width());
    let y_end = y.saturating_add(h).min(image.height());
    for py in y..y_end {
        for px in x..x_end {
            image.put_pixel(px, py, color);
        }
    }
}

fn draw_text(image: &mut RgbImage, text: &str, x: u32, y: u32, scale: u32) {
    let mut cursor = x;
    for ch in text.chars() {
        if let Some(rows) = glyph(ch) {
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..3u32 {
                    if bits >> (2 - col) & 1 == 1 {
                        fill_rect(
                            image,
                            cursor + col * scale,
                            y + row as u32 * scale,
                            scale,
                            scale,
                            WHITE,
                        );
                    }
                }
            }
        }
        cursor += GLYPH_ADVANCE * scale;
    }
}

/// 3x5 bitmap glyphs, one byte per row, high bit on the left
fn glyph(ch: char) -> Option<[u8; 5]> {
    let rows = match ch {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b001, 0b001, 0b001],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        _ => return None,
    };
    Some(rows)
}
