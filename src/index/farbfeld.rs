//! Row-offset index over farbfeld: `"farbfeld"`, width and height as
//! big-endian u32, then big-endian RGBA16 pixels.

use rgb::Rgba;
use whereat::at;

use super::{TileIndex, scale_to_u8};
use crate::error::{RegionError, Result};
use crate::{ImageFormat, PixelFormat, ResourceLimits, SourceStream};

const HEADER_BYTES: u64 = 16;
const PIXEL_BYTES: usize = 8;

fn fail(reason: impl Into<String>) -> whereat::At<RegionError> {
    at(RegionError::index(ImageFormat::Farbfeld, reason))
}

pub(crate) struct FarbfeldIndex {
    stream: SourceStream,
    width: u32,
    height: u32,
    scratch: Vec<u8>,
}

impl FarbfeldIndex {
    pub fn build(mut stream: SourceStream, limits: &ResourceLimits) -> Result<Self> {
        let mut header = [0u8; HEADER_BYTES as usize];
        stream
            .read_exact_at(0, &mut header)
            .map_err(|_| fail("truncated header"))?;
        if &header[..8] != b"farbfeld" {
            return Err(fail("missing farbfeld magic"));
        }
        let width = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
        let height = u32::from_be_bytes([header[12], header[13], header[14], header[15]]);
        if width == 0 || height == 0 {
            return Err(fail("zero dimension"));
        }
        limits
            .check_image(width, height)
            .map_err(|e| at(RegionError::from(e)))?;

        let needed = (width as u64 * height as u64)
            .saturating_mul(PIXEL_BYTES as u64)
            .saturating_add(HEADER_BYTES);
        if stream.len() < needed {
            return Err(fail(format!(
                "pixel data truncated: {} of {needed} bytes",
                stream.len()
            )));
        }
        log::debug!("farbfeld index: {width}x{height}");
        Ok(Self {
            stream,
            width,
            height,
            scratch: Vec::new(),
        })
    }
}

impl TileIndex for FarbfeldIndex {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn native_format(&self) -> PixelFormat {
        PixelFormat::Rgba8
    }

    fn read_row(&mut self, y: u32, x0: u32, out: &mut [Rgba<u8>]) -> Result<()> {
        let row_bytes = self.width as u64 * PIXEL_BYTES as u64;
        let offset = HEADER_BYTES + y as u64 * row_bytes + x0 as u64 * PIXEL_BYTES as u64;
        self.scratch.resize(out.len() * PIXEL_BYTES, 0);
        self.stream
            .read_exact_at(offset, &mut self.scratch)
            .map_err(|e| at(RegionError::DecodeFailed(format!("farbfeld row {y}: {e}"))))?;

        let channel = |hi: u8, lo: u8| scale_to_u8(u16::from_be_bytes([hi, lo]) as u32, 65535);
        for (px, raw) in out.iter_mut().zip(self.scratch.chunks_exact(PIXEL_BYTES)) {
            *px = Rgba {
                r: channel(raw[0], raw[1]),
                g: channel(raw[2], raw[3]),
                b: channel(raw[4], raw[5]),
                a: channel(raw[6], raw[7]),
            };
        }
        Ok(())
    }
}
