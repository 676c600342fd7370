//! Tiled index for formats without row-level random access.
//!
//! The stream is decoded once through the `image` crate and the result is
//! split into `tile_size × tile_size` RGBA8 tiles. Region reads then copy
//! out of the tiles without touching the stream again.

use std::io::{BufReader, Seek};

use image::{DynamicImage, ImageDecoder, ImageReader};
use rgb::{FromSlice, Rgba};
use whereat::at;

use super::TileIndex;
use crate::error::{RegionError, Result};
use crate::{ImageFormat, PixelFormat, RegionConfig, SourceStream};

fn codec(format: ImageFormat) -> Option<image::ImageFormat> {
    Some(match format {
        ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        ImageFormat::Png => image::ImageFormat::Png,
        ImageFormat::Gif => image::ImageFormat::Gif,
        ImageFormat::WebP => image::ImageFormat::WebP,
        ImageFormat::Bmp => image::ImageFormat::Bmp,
        _ => return None,
    })
}

pub(crate) struct RasterIndex {
    // Held for the index's lifetime so the source is released with the
    // decoder, like the streaming indexes.
    _stream: SourceStream,
    width: u32,
    height: u32,
    tile_size: u32,
    tiles_across: u32,
    tiles: Vec<Vec<Rgba<u8>>>,
    native: PixelFormat,
}

impl RasterIndex {
    pub fn build(
        format: ImageFormat,
        mut stream: SourceStream,
        config: &RegionConfig,
    ) -> Result<Self> {
        let fail = |reason: String| at(RegionError::index(format, reason));
        let codec = codec(format).ok_or_else(|| fail("no decoder backend".into()))?;
        let limits = config.limits();

        stream.rewind().map_err(|e| fail(e.to_string()))?;
        let decoder = ImageReader::with_format(BufReader::new(&mut stream), codec)
            .into_decoder()
            .map_err(|e| fail(e.to_string()))?;
        let (width, height) = decoder.dimensions();
        if width == 0 || height == 0 {
            return Err(fail("zero dimension".into()));
        }
        limits
            .check_image(width, height)
            .map_err(|e| at(RegionError::from(e)))?;
        limits
            .check_index(width as u64 * height as u64 * 4)
            .map_err(|e| at(RegionError::from(e)))?;

        let native = match decoder.color_type() {
            image::ColorType::L8 | image::ColorType::L16 => PixelFormat::Gray8,
            _ => PixelFormat::Rgba8,
        };
        let decoded = DynamicImage::from_decoder(decoder)
            .map_err(|e| fail(e.to_string()))?
            .into_rgba8();
        let pixels = decoded.as_raw().as_rgba();

        let tile_size = config.tile_size();
        let tiles_across = width.div_ceil(tile_size);
        let tiles_down = height.div_ceil(tile_size);
        let mut tiles = Vec::with_capacity((tiles_across * tiles_down) as usize);
        for ty in 0..tiles_down {
            let y0 = ty * tile_size;
            let th = tile_size.min(height - y0);
            for tx in 0..tiles_across {
                let x0 = tx * tile_size;
                let tw = tile_size.min(width - x0);
                let mut tile = Vec::with_capacity((tw * th) as usize);
                for y in y0..y0 + th {
                    let start = (y * width + x0) as usize;
                    tile.extend_from_slice(&pixels[start..start + tw as usize]);
                }
                tiles.push(tile);
            }
        }
        log::debug!(
            "{format} index: {width}x{height} in {} tiles of {tile_size}",
            tiles.len()
        );
        Ok(Self {
            _stream: stream,
            width,
            height,
            tile_size,
            tiles_across,
            tiles,
            native,
        })
    }

    fn tile_width(&self, tx: u32) -> u32 {
        self.tile_size.min(self.width - tx * self.tile_size)
    }
}

impl TileIndex for RasterIndex {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn native_format(&self) -> PixelFormat {
        self.native
    }

    fn read_row(&mut self, y: u32, x0: u32, out: &mut [Rgba<u8>]) -> Result<()> {
        if y >= self.height || x0 as usize + out.len() > self.width as usize {
            return Err(at(RegionError::DecodeFailed(format!(
                "row {y} from column {x0} is outside the tiled image"
            ))));
        }
        let ts = self.tile_size;
        let ty = y / ts;
        let row_in_tile = y % ts;
        let mut x = x0;
        let mut filled = 0;
        while filled < out.len() {
            let tx = x / ts;
            let col = x % ts;
            let tw = self.tile_width(tx);
            let tile = &self.tiles[(ty * self.tiles_across + tx) as usize];
            let n = ((tw - col) as usize).min(out.len() - filled);
            let start = (row_in_tile * tw + col) as usize;
            out[filled..filled + n].copy_from_slice(&tile[start..start + n]);
            filled += n;
            x += n as u32;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResourceLimits;
    use crate::test_util;

    fn build_png(width: u32, height: u32, config: &RegionConfig) -> Result<RasterIndex> {
        let bytes = test_util::png_gradient(width, height);
        RasterIndex::build(ImageFormat::Png, SourceStream::from_vec(bytes), config)
    }

    #[test]
    fn rows_cross_tile_boundaries() {
        let config = RegionConfig::new().with_tile_size(4);
        let mut index = build_png(11, 9, &config).unwrap();
        assert_eq!(index.dimensions(), (11, 9));
        assert_eq!(index.tiles.len(), 3 * 3);

        let mut row = vec![Rgba::default(); 9];
        index.read_row(6, 2, &mut row).unwrap();
        for (i, px) in row.iter().enumerate() {
            assert_eq!(*px, test_util::gradient_pixel(2 + i as u32, 6), "x={}", 2 + i);
        }

        let mut last = [Rgba::default(); 1];
        index.read_row(8, 10, &mut last).unwrap();
        assert_eq!(last[0], test_util::gradient_pixel(10, 8));
    }

    #[test]
    fn out_of_range_rows_fail() {
        let mut index = build_png(4, 4, &RegionConfig::new()).unwrap();
        let mut row = [Rgba::default(); 2];
        assert!(index.read_row(4, 0, &mut row).is_err());
        assert!(index.read_row(0, 3, &mut row).is_err());
    }

    #[test]
    fn gray_sources_prefer_gray_output() {
        let bytes = test_util::png_gray(8, 8);
        let config = RegionConfig::new();
        let index =
            RasterIndex::build(ImageFormat::Png, SourceStream::from_vec(bytes), &config).unwrap();
        assert_eq!(index.native_format(), PixelFormat::Gray8);
        let rgba = build_png(2, 2, &config).unwrap();
        assert_eq!(rgba.native_format(), PixelFormat::Rgba8);
    }

    #[test]
    fn corrupt_stream_names_the_decoder() {
        let mut bytes = test_util::png_gradient(32, 32);
        bytes.truncate(40);
        let config = RegionConfig::new();
        let err = RasterIndex::build(ImageFormat::Png, SourceStream::from_vec(bytes), &config)
            .err()
            .unwrap()
            .decompose().0;
        assert!(
            matches!(
                err,
                RegionError::IndexBuildFailed {
                    format: ImageFormat::Png,
                    ..
                }
            ),
            "{err}"
        );
    }

    #[test]
    fn memory_limit_checked_before_decode() {
        let limits = ResourceLimits::none().with_max_index_bytes(16 * 16 * 4 - 1);
        let config = RegionConfig::new().with_limits(limits);
        let err = build_png(16, 16, &config).err().unwrap().decompose().0;
        assert!(matches!(err, RegionError::LimitExceeded(_)));
    }
}
