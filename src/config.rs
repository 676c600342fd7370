//! Open-time configuration and per-call decode options.

use std::sync::Arc;

use crate::error::RegionError;
use crate::{HeapAllocator, PixelAllocator, PixelFormat, ResourceLimits};

/// Default edge length of the tiles a full-decode index is split into.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Settings fixed when a region decoder is opened.
///
/// ```
/// use zenregion::{RegionConfig, ResourceLimits};
///
/// let config = RegionConfig::new()
///     .with_limits(ResourceLimits::none().with_max_pixels(50_000_000))
///     .with_tile_size(512);
/// assert_eq!(config.tile_size(), 512);
/// ```
#[derive(Clone)]
pub struct RegionConfig {
    limits: ResourceLimits,
    tile_size: u32,
    allocator: Arc<dyn PixelAllocator>,
}

impl RegionConfig {
    /// No limits, 256-pixel tiles, heap allocator.
    pub fn new() -> Self {
        Self {
            limits: ResourceLimits::none(),
            tile_size: DEFAULT_TILE_SIZE,
            allocator: Arc::new(HeapAllocator),
        }
    }

    /// Set resource limits.
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the tile edge for full-decode indexes. Clamped to at least 1.
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size.max(1);
        self
    }

    /// Install the allocator that backs freshly decoded bitmaps.
    pub fn with_allocator(mut self, allocator: Arc<dyn PixelAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn allocator(&self) -> &Arc<dyn PixelAllocator> {
        &self.allocator
    }
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for RegionConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegionConfig")
            .field("limits", &self.limits)
            .field("tile_size", &self.tile_size)
            .finish_non_exhaustive()
    }
}

/// Parameters for one region decode.
///
/// Immutable per call: a decode reads these and never writes back. Resolved
/// values come out in [`RegionInfo`](crate::RegionInfo).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct DecodeOptions {
    /// Downsampling factor per axis. Must be at least 1.
    pub sample_size: u32,
    /// Output format, or `None` to let the decoder choose.
    pub preferred_format: Option<PixelFormat>,
    /// Ordered dithering when reducing to RGB565.
    pub dither: bool,
    /// Box-average each sample block instead of picking its centre pixel.
    pub prefer_quality_over_speed: bool,
    /// Premultiply color by alpha.
    pub premultiplied: bool,
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample_size(mut self, sample_size: u32) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.preferred_format = Some(format);
        self
    }

    pub fn with_dither(mut self, dither: bool) -> Self {
        self.dither = dither;
        self
    }

    pub fn with_quality_over_speed(mut self, quality: bool) -> Self {
        self.prefer_quality_over_speed = quality;
        self
    }

    /// Request straight (non-premultiplied) alpha.
    pub fn with_unpremultiplied(mut self) -> Self {
        self.premultiplied = false;
        self
    }

    /// Reject values no decode can honor.
    pub fn validate(&self) -> Result<(), RegionError> {
        if self.sample_size == 0 {
            return Err(RegionError::InvalidSampleSize);
        }
        Ok(())
    }
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            sample_size: 1,
            preferred_format: None,
            dither: true,
            prefer_quality_over_speed: false,
            premultiplied: true,
        }
    }
}
