//! Tile indexes: per-format random access into an opened stream.
//!
//! An index is built once, right after probing, and then answers row reads
//! for any sub-rectangle. Streamable formats (PNM, farbfeld) index by row
//! offset and read only the rows a region touches; everything else is
//! decoded once and kept as fixed-size RGBA8 tiles.

mod farbfeld;
mod pnm;
mod raster;

use rgb::Rgba;

use crate::error::Result;
use crate::{ImageFormat, PixelFormat, RegionConfig, SourceStream};

/// Random access into a decoded image's rows.
pub(crate) trait TileIndex: Send {
    /// Full image dimensions.
    fn dimensions(&self) -> (u32, u32);

    /// Format the decoder picks when the caller has no preference.
    fn native_format(&self) -> PixelFormat;

    /// Fill `out` with straight-alpha pixels of row `y`, starting at
    /// column `x0`. `x0 + out.len()` must not exceed the width.
    fn read_row(&mut self, y: u32, x0: u32, out: &mut [Rgba<u8>]) -> Result<()>;
}

/// Build the index matching `format`, taking ownership of `stream` when the
/// index keeps reading from it.
pub(crate) fn build(
    format: ImageFormat,
    stream: SourceStream,
    config: &RegionConfig,
) -> Result<Box<dyn TileIndex>> {
    Ok(match format {
        ImageFormat::Pnm => Box::new(pnm::PnmIndex::build(stream, config.limits())?),
        ImageFormat::Farbfeld => {
            Box::new(farbfeld::FarbfeldIndex::build(stream, config.limits())?)
        }
        _ => Box::new(raster::RasterIndex::build(format, stream, config)?),
    })
}

/// Rescale a sample in `0..=maxval` to `0..=255`, rounding to nearest.
#[inline]
fn scale_to_u8(v: u32, maxval: u32) -> u8 {
    ((v.min(maxval) * 255 + maxval / 2) / maxval) as u8
}
