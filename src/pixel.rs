//! Output pixel formats and row conversion.
//!
//! Index readers produce straight-alpha RGBA8 rows. [`RowWriter`] turns
//! those into the requested output format, applying premultiplication and
//! ordered dithering on the way.

use rgb::Rgba;

/// Pixel format of a decoded region.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit R, G, B, A.
    Rgba8,
    /// 16-bit 5-6-5 RGB, little-endian. Opaque.
    Rgb565,
    /// 8-bit luminance. Opaque.
    Gray8,
    /// 8-bit alpha mask.
    Alpha8,
}

impl PixelFormat {
    /// Bytes per pixel.
    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8 => 4,
            Self::Rgb565 => 2,
            Self::Gray8 | Self::Alpha8 => 1,
        }
    }

    /// Whether this format stores alpha.
    #[inline]
    pub const fn has_alpha(self) -> bool {
        matches!(self, Self::Rgba8 | Self::Alpha8)
    }

    /// Tightly packed row length in bytes.
    #[inline]
    pub const fn row_bytes(self, width: u32) -> usize {
        width as usize * self.bytes_per_pixel()
    }
}

impl core::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Rgba8 => "RGBA8",
            Self::Rgb565 => "RGB565",
            Self::Gray8 => "Gray8",
            Self::Alpha8 => "Alpha8",
        })
    }
}

/// 4×4 Bayer thresholds, 0..16.
const BAYER_4X4: [[u8; 4]; 4] = [
    [0, 8, 2, 10],
    [12, 4, 14, 6],
    [3, 11, 1, 9],
    [15, 7, 13, 5],
];

/// Rounding bias when not dithering: round to nearest.
const ROUND_BIAS: u32 = 127;

/// Converts straight RGBA8 rows into an output format.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RowWriter {
    pub format: PixelFormat,
    pub premultiply: bool,
    pub dither: bool,
}

impl RowWriter {
    /// Write `src` into `dst`, which must hold `format.row_bytes(src.len())`.
    ///
    /// `y` is the output row index, used to phase the dither matrix.
    pub fn write(&self, src: &[Rgba<u8>], dst: &mut [u8], y: u32) {
        match self.format {
            PixelFormat::Rgba8 => {
                for (px, out) in src.iter().zip(dst.chunks_exact_mut(4)) {
                    if self.premultiply && px.a != 255 {
                        out[0] = premultiply(px.r, px.a);
                        out[1] = premultiply(px.g, px.a);
                        out[2] = premultiply(px.b, px.a);
                    } else {
                        out[0] = px.r;
                        out[1] = px.g;
                        out[2] = px.b;
                    }
                    out[3] = px.a;
                }
            }
            PixelFormat::Rgb565 => {
                let thresholds = &BAYER_4X4[(y & 3) as usize];
                for (x, (px, out)) in src.iter().zip(dst.chunks_exact_mut(2)).enumerate() {
                    let bias = if self.dither {
                        thresholds[x & 3] as u32 * 255 / 16
                    } else {
                        ROUND_BIAS
                    };
                    let r = quantize(px.r, 5, bias);
                    let g = quantize(px.g, 6, bias);
                    let b = quantize(px.b, 5, bias);
                    let packed = (r << 11) | (g << 5) | b;
                    out.copy_from_slice(&packed.to_le_bytes());
                }
            }
            PixelFormat::Gray8 => {
                for (px, out) in src.iter().zip(dst.iter_mut()) {
                    *out = luma(*px);
                }
            }
            PixelFormat::Alpha8 => {
                for (px, out) in src.iter().zip(dst.iter_mut()) {
                    *out = px.a;
                }
            }
        }
    }
}

#[inline]
pub(crate) fn premultiply(c: u8, a: u8) -> u8 {
    ((c as u32 * a as u32 + 127) / 255) as u8
}

/// BT.601 luma, weights sum to 256 so gray input maps to itself.
#[inline]
pub(crate) fn luma(px: Rgba<u8>) -> u8 {
    ((77 * px.r as u32 + 150 * px.g as u32 + 29 * px.b as u32) >> 8) as u8
}

/// Reduce an 8-bit channel to `bits` bits. `bias` is in 0..255.
#[inline]
fn quantize(v: u8, bits: u32, bias: u32) -> u16 {
    let max = (1u32 << bits) - 1;
    ((v as u32 * max + bias) / 255) as u16
}
