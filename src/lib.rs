//! Tile-indexed region decoding over a single open image stream.
//!
//! Open an encoded image once, build a random-access tile index over it,
//! then serve any number of independently parameterized rectangle decodes
//! without re-parsing the whole image each time:
//!
//! - [`RegionDecoder`] is the owned handle: open, query size, decode
//!   regions, drop
//! - [`RegionJob`] carries one request: rectangle, [`DecodeOptions`],
//!   optional reusable [`Bitmap`], and a [`Stop`] token
//! - [`HandleTable`] exposes the same lifecycle through opaque
//!   [`RegionHandle`] integers
//! - [`SourceStream`] adapts bytes, readers, file descriptors and
//!   [`Asset`]s
//! - [`PixelAllocator`] supplies storage for freshly decoded bitmaps
//! - [`ResourceLimits`] caps source size, dimensions and allocations
//!
//! PNG, JPEG, GIF, WebP and BMP are decoded once into RGBA8 tiles. Binary
//! PNM and farbfeld are indexed by row offset and read on demand.
//!
//! Cancellation is cooperative: the token is checked before a decode starts
//! and before every output row, and a cancelled decode returns
//! [`RegionOutcome::Cancelled`].

#![forbid(unsafe_code)]

mod allocator;
mod bitmap;
mod cancel;
mod config;
mod decoder;
mod error;
mod format;
mod index;
mod limits;
mod pixel;
mod rect;
mod region;
mod registry;
mod stream;

#[cfg(test)]
mod test_util;

pub use allocator::{HeapAllocator, PixelAllocator};
pub use bitmap::Bitmap;
pub use cancel::CancelToken;
pub use config::{DEFAULT_TILE_SIZE, DecodeOptions, RegionConfig};
pub use decoder::{DecodedRegion, Decoder, IndexedDecoder, RegionInfo, RegionOutcome};
pub use error::{RegionError, Result};
pub use format::ImageFormat;
pub use limits::{Limit, LimitExceeded, ResourceLimits};
pub use pixel::PixelFormat;
pub use rect::Rect;
pub use region::{RegionDecoder, RegionJob};
pub use registry::{HandleTable, RegionHandle};
pub use stream::{Asset, SourceStream};

// Re-exports for callers.
pub use enough::{Stop, StopReason, Unstoppable};
pub use imgref::{ImgRef, ImgVec};
pub use rgb;
pub use rgb::Rgba;
