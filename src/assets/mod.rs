//! Assets Module
//!
//! Binary (image) asset caching: host handles, transcoding, and the
//! priority-aware cache.

mod cache;
mod entry;
mod handle;
mod transcode;

pub use cache::{AssetCacheStats, BinaryAssetCache};
pub use entry::{AssetFormat, AssetPriority, AssetRef, Dimensions, ImageCacheEntry, LoadOptions};
pub use handle::{BlobRegistry, HandleHost, HandleId, HostError, ObjectHandle, RegistryStats};
pub use transcode::{
    fit_within, needs_transcode, negotiate_format, sniff, transcode, transcode_blocking, TranscodeError,
    TranscodePlan, Transcoded,
};
