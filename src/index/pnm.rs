//! Row-offset index over binary PNM (P5 graymap, P6 pixmap).

use rgb::Rgba;
use whereat::at;

use super::{TileIndex, scale_to_u8};
use crate::error::{RegionError, Result};
use crate::{ImageFormat, PixelFormat, ResourceLimits, SourceStream};

/// Headers longer than this are rejected. Comments are the only way to get
/// anywhere near it.
const MAX_HEADER_BYTES: usize = 4096;

#[derive(Debug, PartialEq, Eq)]
struct Header {
    channels: u32,
    width: u32,
    height: u32,
    maxval: u32,
    data_offset: u64,
}

impl Header {
    fn bytes_per_sample(&self) -> u32 {
        if self.maxval > 255 { 2 } else { 1 }
    }

    fn row_bytes(&self) -> u64 {
        self.width as u64 * self.channels as u64 * self.bytes_per_sample() as u64
    }
}

fn fail(reason: impl Into<String>) -> whereat::At<RegionError> {
    at(RegionError::index(ImageFormat::Pnm, reason))
}

/// Parse `P5`/`P6` followed by width, height and maxval, each separated by
/// whitespace or `#` comments, then exactly one whitespace byte.
fn parse_header(buf: &[u8]) -> Result<Header> {
    let channels = match buf.get(..2) {
        Some(b"P5") => 1,
        Some(b"P6") => 3,
        Some([b'P', kind @ b'1'..=b'7']) => {
            return Err(fail(format!(
                "P{} is not a binary graymap or pixmap",
                *kind as char
            )));
        }
        _ => return Err(fail("missing PNM magic")),
    };

    let mut pos = 2;
    let mut fields = [0u32; 3];
    for field in &mut fields {
        let start = pos;
        loop {
            match buf.get(pos) {
                Some(b'#') => {
                    while !matches!(buf.get(pos), Some(b'\n' | b'\r') | None) {
                        pos += 1;
                    }
                }
                Some(c) if c.is_ascii_whitespace() => pos += 1,
                _ => break,
            }
        }
        if pos == start {
            return Err(fail("expected whitespace between header fields"));
        }
        let digits = buf[pos..].iter().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return Err(fail("truncated header"));
        }
        *field = core::str::from_utf8(&buf[pos..pos + digits])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| fail("header value out of range"))?;
        pos += digits;
    }
    match buf.get(pos) {
        Some(c) if c.is_ascii_whitespace() => pos += 1,
        _ => return Err(fail("truncated header")),
    }

    let [width, height, maxval] = fields;
    if width == 0 || height == 0 {
        return Err(fail("zero dimension"));
    }
    if maxval == 0 || maxval > 65535 {
        return Err(fail(format!("maxval {maxval} out of range")));
    }
    Ok(Header {
        channels,
        width,
        height,
        maxval,
        data_offset: pos as u64,
    })
}

pub(crate) struct PnmIndex {
    stream: SourceStream,
    header: Header,
    scratch: Vec<u8>,
}

impl PnmIndex {
    pub fn build(mut stream: SourceStream, limits: &ResourceLimits) -> Result<Self> {
        let mut buf = vec![0u8; (stream.len() as usize).min(MAX_HEADER_BYTES)];
        stream
            .read_exact_at(0, &mut buf)
            .map_err(|e| fail(e.to_string()))?;
        let header = parse_header(&buf)?;
        limits
            .check_image(header.width, header.height)
            .map_err(|e| at(RegionError::from(e)))?;

        let needed = header
            .row_bytes()
            .saturating_mul(header.height as u64)
            .saturating_add(header.data_offset);
        if stream.len() < needed {
            return Err(fail(format!(
                "pixel data truncated: {} of {needed} bytes",
                stream.len()
            )));
        }
        log::debug!(
            "pnm index: {}x{} channels={} maxval={} data@{}",
            header.width,
            header.height,
            header.channels,
            header.maxval,
            header.data_offset
        );
        Ok(Self {
            stream,
            header,
            scratch: Vec::new(),
        })
    }
}

impl TileIndex for PnmIndex {
    fn dimensions(&self) -> (u32, u32) {
        (self.header.width, self.header.height)
    }

    fn native_format(&self) -> PixelFormat {
        if self.header.channels == 1 {
            PixelFormat::Gray8
        } else {
            PixelFormat::Rgba8
        }
    }

    fn read_row(&mut self, y: u32, x0: u32, out: &mut [Rgba<u8>]) -> Result<()> {
        let h = &self.header;
        let bps = h.bytes_per_sample() as usize;
        let pixel_bytes = h.channels as usize * bps;
        let offset = h.data_offset + y as u64 * h.row_bytes() + x0 as u64 * pixel_bytes as u64;
        self.scratch.resize(out.len() * pixel_bytes, 0);
        self.stream
            .read_exact_at(offset, &mut self.scratch)
            .map_err(|e| at(RegionError::DecodeFailed(format!("pnm row {y}: {e}"))))?;

        let maxval = h.maxval;
        let sample = |bytes: &[u8]| -> u8 {
            let v = if bps == 2 {
                u16::from_be_bytes([bytes[0], bytes[1]]) as u32
            } else {
                bytes[0] as u32
            };
            scale_to_u8(v, maxval)
        };
        for (px, raw) in out.iter_mut().zip(self.scratch.chunks_exact(pixel_bytes)) {
            *px = if h.channels == 1 {
                let v = sample(raw);
                Rgba {
                    r: v,
                    g: v,
                    b: v,
                    a: 255,
                }
            } else {
                Rgba {
                    r: sample(&raw[..bps]),
                    g: sample(&raw[bps..2 * bps]),
                    b: sample(&raw[2 * bps..]),
                    a: 255,
                }
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;

    #[test]
    fn header_with_comments() {
        let h = parse_header(b"P6\n# made by hand\n3 2 # trailing\n255\nxxxx").unwrap();
        assert_eq!(
            h,
            Header {
                channels: 3,
                width: 3,
                height: 2,
                maxval: 255,
                data_offset: 37,
            }
        );
        assert_eq!(h.row_bytes(), 9);
    }

    #[test]
    fn header_sixteen_bit() {
        let h = parse_header(b"P5 4 4 65535\n").unwrap();
        assert_eq!(h.bytes_per_sample(), 2);
        assert_eq!(h.row_bytes(), 8);
        assert_eq!(h.data_offset, 13);
    }

    #[test]
    fn header_rejects_ascii_and_bad_values() {
        for bad in [
            &b"P3 1 1 255\n"[..],
            b"P5 0 1 255\n",
            b"P5 1 1 0\n",
            b"P5 1 1 70000\n",
            b"P5 1 1",
            b"P51 1 255\n",
            b"XX",
        ] {
            let err = parse_header(bad).unwrap_err().decompose().0;
            assert!(
                matches!(
                    err,
                    RegionError::IndexBuildFailed {
                        format: ImageFormat::Pnm,
                        ..
                    }
                ),
                "{err}"
            );
        }
    }

    #[test]
    fn reads_rows_at_offsets() {
        let bytes = test_util::pnm_gradient(6, 4);
        let mut index =
            PnmIndex::build(SourceStream::from_vec(bytes), &ResourceLimits::none()).unwrap();
        assert_eq!(index.dimensions(), (6, 4));
        assert_eq!(index.native_format(), PixelFormat::Rgba8);

        let mut row = [Rgba::default(); 3];
        index.read_row(2, 3, &mut row).unwrap();
        for (i, px) in row.iter().enumerate() {
            assert_eq!(*px, test_util::gradient_pixel(3 + i as u32, 2));
        }
    }

    #[test]
    fn gray_sixteen_bit_scales_down() {
        let mut bytes = b"P5 2 1 65535\n".to_vec();
        bytes.extend_from_slice(&0xFFFFu16.to_be_bytes());
        bytes.extend_from_slice(&0x8080u16.to_be_bytes());
        let mut index =
            PnmIndex::build(SourceStream::from_vec(bytes), &ResourceLimits::none()).unwrap();
        assert_eq!(index.native_format(), PixelFormat::Gray8);
        let mut row = [Rgba::default(); 2];
        index.read_row(0, 0, &mut row).unwrap();
        assert_eq!(row[0], Rgba::new(255, 255, 255, 255));
        assert_eq!(row[1], Rgba::new(128, 128, 128, 255));
    }

    #[test]
    fn truncated_data_fails_at_build() {
        let mut bytes = test_util::pnm_gradient(4, 4);
        bytes.truncate(bytes.len() - 1);
        let err = PnmIndex::build(SourceStream::from_vec(bytes), &ResourceLimits::none())
            .err()
            .unwrap()
            .decompose().0;
        assert!(err.to_string().contains("truncated"), "{err}");
    }

    #[test]
    fn dimension_limits_apply() {
        let bytes = test_util::pnm_gradient(64, 8);
        let limits = ResourceLimits::none().with_max_width(32);
        let err = PnmIndex::build(SourceStream::from_vec(bytes), &limits)
            .err()
            .unwrap()
            .decompose().0;
        assert!(matches!(err, RegionError::LimitExceeded(_)));
    }
}
