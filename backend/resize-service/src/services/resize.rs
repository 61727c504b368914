//! Image resizer - scales source images and re-encodes them as JPEG
//!
//! A zero width or height keeps the aspect ratio relative to the other dimension;
//! both zero keeps the original size. Resize targets wider or taller than
//! `max_dimension` are rejected.
//!
//! Resizing is CPU-bound. Callers on the async runtime should run it through
//! `spawn_blocking`.

use crate::config::ResizeConfig;
use crate::error::ResizeError;
use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat};
use std::io::Cursor;
use tracing::debug;

pub trait Resizer: Send + Sync {
    fn resize(&self, data: &[u8], width: u32, height: u32) -> Result<Bytes, ResizeError>;
}

/// Resizer producing JPEG output
pub struct JpegResizer {
    config: ResizeConfig,
}

impl JpegResizer {
    pub fn new(config: ResizeConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ResizeConfig::default())
    }

    fn encode_jpeg(&self, img: &DynamicImage) -> Result<Bytes, ResizeError> {
        let mut buf = Vec::new();
        // JPEG has no alpha channel
        let rgb = DynamicImage::ImageRgb8(img.to_rgb8());

        rgb.write_to(
            &mut Cursor::new(&mut buf),
            ImageOutputFormat::Jpeg(self.config.jpeg_quality),
        )
        .map_err(|e| ResizeError::Encode(e.to_string()))?;

        Ok(Bytes::from(buf))
    }
}

impl Resizer for JpegResizer {
    fn resize(&self, data: &[u8], width: u32, height: u32) -> Result<Bytes, ResizeError> {
        let img =
            image::load_from_memory(data).map_err(|e| ResizeError::Decode(e.to_string()))?;

        let (orig_w, orig_h) = img.dimensions();
        let (new_w, new_h) = target_dimensions(orig_w, orig_h, width, height);

        // a resize allocates its output buffer up front; refuse before it does
        let limit = self.config.max_dimension;
        let unchanged = (new_w, new_h) == (orig_w, orig_h);
        if !unchanged && (new_w > limit || new_h > limit) {
            return Err(ResizeError::TooLarge {
                width: new_w,
                height: new_h,
                limit,
            });
        }

        let resized = if unchanged {
            img
        } else {
            img.resize_exact(new_w, new_h, FilterType::Lanczos3)
        };

        let data = self.encode_jpeg(&resized)?;
        debug!(
            original_width = orig_w,
            original_height = orig_h,
            width = new_w,
            height = new_h,
            size = data.len(),
            "Image resized"
        );
        Ok(data)
    }
}

/// Output dimensions for a requested width/height, honoring the zero rules
pub fn target_dimensions(orig_w: u32, orig_h: u32, width: u32, height: u32) -> (u32, u32) {
    let scaled = |value: u32, num: u32, den: u32| -> u32 {
        if den == 0 {
            return value.max(1);
        }
        ((value as f64) * (num as f64) / (den as f64)).round().max(1.0) as u32
    };

    match (width, height) {
        (0, 0) => (orig_w, orig_h),
        (w, 0) => (w, scaled(orig_h, w, orig_w)),
        (0, h) => (scaled(orig_w, h, orig_h), h),
        (w, h) => (w, h),
    }
}
