//! Asset Entry Module
//!
//! Load options, asset formats, and the cached image entry.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::assets::ObjectHandle;
use crate::cache::current_timestamp_ms;

// == Priority ==
/// Eviction priority. Low goes first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl AssetPriority {
    pub fn rank(&self) -> u8 {
        match self {
            AssetPriority::Low => 0,
            AssetPriority::Medium => 1,
            AssetPriority::High => 2,
        }
    }
}

// == Format ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetFormat {
    Jpeg,
    Png,
    Webp,
}

impl AssetFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            AssetFormat::Jpeg => "image/jpeg",
            AssetFormat::Png => "image/png",
            AssetFormat::Webp => "image/webp",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetFormat::Jpeg => "jpeg",
            AssetFormat::Png => "png",
            AssetFormat::Webp => "webp",
        }
    }

    pub fn image_format(&self) -> image::ImageFormat {
        match self {
            AssetFormat::Jpeg => image::ImageFormat::Jpeg,
            AssetFormat::Png => image::ImageFormat::Png,
            AssetFormat::Webp => image::ImageFormat::WebP,
        }
    }

    /// Maps a sniffed container format, when it is one we cache.
    pub fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(AssetFormat::Jpeg),
            image::ImageFormat::Png => Some(AssetFormat::Png),
            image::ImageFormat::WebP => Some(AssetFormat::Webp),
            _ => None,
        }
    }
}

impl fmt::Display for AssetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(AssetFormat::Jpeg),
            "png" => Ok(AssetFormat::Png),
            "webp" => Ok(AssetFormat::Webp),
            other => Err(format!("Unknown asset format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

// == Load Options ==
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    #[serde(default)]
    pub priority: AssetPriority,
    /// Overrides the cache's default quality, 1-100
    pub target_quality: Option<u8>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub format: Option<AssetFormat>,
}

impl LoadOptions {
    pub fn with_priority(mut self, priority: AssetPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.target_quality = Some(quality);
        self
    }

    pub fn with_max_size(mut self, width: u32, height: u32) -> Self {
        self.max_width = Some(width);
        self.max_height = Some(height);
        self
    }

    pub fn with_format(mut self, format: AssetFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Whether the caller asked for anything beyond the defaults.
    pub fn has_override(&self) -> bool {
        self.target_quality.is_some()
            || self.max_width.is_some()
            || self.max_height.is_some()
            || self.format.is_some()
    }

    /// Cache key for `url` under these options.
    ///
    /// Priority is excluded: the same bytes at a different priority are the
    /// same asset.
    pub fn fingerprint(&self, url: &str) -> String {
        fn opt<T: fmt::Display>(value: &Option<T>) -> String {
            value.as_ref().map(|v| v.to_string()).unwrap_or_default()
        }

        format!(
            "{}|q={}|w={}|h={}|f={}",
            url,
            opt(&self.target_quality),
            opt(&self.max_width),
            opt(&self.max_height),
            opt(&self.format),
        )
    }
}

// == Asset Ref ==
/// What a load hands back to the application.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetRef {
    pub url: String,
    /// Host URI of the cached blob; `None` when the asset was too large to cache
    pub handle_uri: Option<String>,
    /// Bytes of an uncached asset, so the caller still gets its data
    #[serde(skip)]
    pub inline: Option<Arc<[u8]>>,
    pub mime: String,
    pub format: Option<AssetFormat>,
    pub dimensions: Option<Dimensions>,
    pub size_bytes: usize,
    pub priority: AssetPriority,
    pub transcoded: bool,
}

impl AssetRef {
    pub fn is_cached(&self) -> bool {
        self.handle_uri.is_some()
    }
}

// == Image Cache Entry ==
#[derive(Debug)]
pub struct ImageCacheEntry {
    pub key: String,
    pub url: String,
    pub handle: ObjectHandle,
    pub mime: String,
    pub format: Option<AssetFormat>,
    pub dimensions: Option<Dimensions>,
    pub size_bytes: usize,
    pub priority: AssetPriority,
    pub transcoded: bool,
    pub created_at: u64,
    pub last_access_at: u64,
    pub access_count: u64,
    /// Logical recency; higher is more recent
    pub access_seq: u64,
}

impl ImageCacheEntry {
    pub fn touch(&mut self, seq: u64) {
        self.last_access_at = current_timestamp_ms();
        self.access_count += 1;
        self.access_seq = seq;
    }

    /// Eviction rank: lowest priority first, then least recent.
    pub fn rank(&self) -> (u8, u64) {
        (self.priority.rank(), self.access_seq)
    }

    /// Gives the handle back to the host. Consumes the entry.
    pub fn release(self) {
        self.handle.release();
    }

    pub fn to_ref(&self) -> AssetRef {
        AssetRef {
            url: self.url.clone(),
            handle_uri: Some(self.handle.uri()),
            inline: None,
            mime: self.mime.clone(),
            format: self.format,
            dimensions: self.dimensions,
            size_bytes: self.size_bytes,
            priority: self.priority,
            transcoded: self.transcoded,
        }
    }
}
