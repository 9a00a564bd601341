//! Transcode Module
//!
//! Decode, resize, and re-encode of fetched images. Work runs on the blocking
//! pool; callers fall back to the original bytes on any error.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use thiserror::Error;

use crate::assets::{AssetFormat, Dimensions, LoadOptions};

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Transcode task failed: {0}")]
    Task(String),
}

// == Plan ==
/// Resolved transform for one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodePlan {
    pub quality: u8,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub format: Option<AssetFormat>,
}

impl TranscodePlan {
    pub fn from_options(options: &LoadOptions, default_quality: u8) -> Self {
        Self {
            quality: options.target_quality.unwrap_or(default_quality).clamp(1, 100),
            max_width: options.max_width,
            max_height: options.max_height,
            format: options.format,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Transcoded {
    pub bytes: Vec<u8>,
    pub format: AssetFormat,
    pub dimensions: Dimensions,
    pub resized: bool,
}

/// Small assets are stored as fetched unless the caller asked for a transform.
pub fn needs_transcode(size: usize, options: &LoadOptions, small_asset_bytes: usize) -> bool {
    size > small_asset_bytes || options.has_override()
}

/// Reads format and dimensions without decoding pixels.
pub fn sniff(bytes: &[u8]) -> Option<(AssetFormat, Dimensions)> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format().ok()?;
    let format = reader.format().and_then(AssetFormat::from_image_format)?;
    let (width, height) = reader.into_dimensions().ok()?;
    Some((format, Dimensions { width, height }))
}

/// Size that fits within the bounds, keeping aspect ratio. `None` if
/// the image already fits.
pub fn fit_within(current: Dimensions, max_width: Option<u32>, max_height: Option<u32>) -> Option<Dimensions> {
    let max_w = max_width.unwrap_or(u32::MAX);
    let max_h = max_height.unwrap_or(u32::MAX);
    if current.width <= max_w && current.height <= max_h {
        return None;
    }

    let scale = f64::min(
        max_w as f64 / current.width as f64,
        max_h as f64 / current.height as f64,
    );
    Some(Dimensions {
        width: ((current.width as f64 * scale).round() as u32).max(1),
        height: ((current.height as f64 * scale).round() as u32).max(1),
    })
}

/// Picks the output container: the requested one, else PNG for images with
/// transparency and JPEG otherwise.
pub fn negotiate_format(image: &DynamicImage, requested: Option<AssetFormat>) -> AssetFormat {
    match requested {
        Some(format) => format,
        None if image.color().has_alpha() => AssetFormat::Png,
        None => AssetFormat::Jpeg,
    }
}

// == Transcode ==
/// Decodes `bytes`, shrinks to the plan's bounds, and re-encodes.
pub fn transcode(bytes: &[u8], plan: &TranscodePlan) -> Result<Transcoded, TranscodeError> {
    let mut image = image::load_from_memory(bytes)?;
    let original = Dimensions {
        width: image.width(),
        height: image.height(),
    };

    let resized = match fit_within(original, plan.max_width, plan.max_height) {
        Some(target) => {
            image = image.resize_exact(target.width, target.height, FilterType::Triangle);
            true
        }
        None => false,
    };

    let format = negotiate_format(&image, plan.format);
    let bytes = encode(&image, format, plan.quality)?;

    Ok(Transcoded {
        bytes,
        format,
        dimensions: Dimensions {
            width: image.width(),
            height: image.height(),
        },
        resized,
    })
}

/// [`transcode`] on the blocking pool.
pub async fn transcode_blocking(bytes: Vec<u8>, plan: TranscodePlan) -> Result<Transcoded, TranscodeError> {
    tokio::task::spawn_blocking(move || transcode(&bytes, &plan))
        .await
        .map_err(|e| TranscodeError::Task(e.to_string()))?
}

fn encode(image: &DynamicImage, format: AssetFormat, quality: u8) -> Result<Vec<u8>, TranscodeError> {
    let mut buf = Vec::new();
    match format {
        AssetFormat::Jpeg => {
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
            encoder.encode_image(&image.to_rgb8())?;
        }
        AssetFormat::Png => {
            image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
        }
        AssetFormat::Webp => {
            // The WebP encoder only takes 8-bit RGB(A)
            DynamicImage::ImageRgba8(image.to_rgba8())
                .write_to(&mut Cursor::new(&mut buf), ImageFormat::WebP)?;
        }
    }
    Ok(buf)
}
