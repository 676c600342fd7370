//! Probing, index building and the region decode core.
//!
//! [`Decoder`] is the probed, not-yet-indexed stage: it knows the format
//! and carries the pixel allocator. [`Decoder::build_tile_index`] consumes
//! it together with the stream and yields an [`IndexedDecoder`], which
//! serves any number of sub-rectangle decodes.

use std::sync::Arc;

use enough::{Stop, StopReason};
use rgb::Rgba;
use whereat::at;

use crate::error::{RegionError, Result};
use crate::index::{self, TileIndex};
use crate::pixel::RowWriter;
use crate::{
    Bitmap, DecodeOptions, HeapAllocator, ImageFormat, PixelAllocator, PixelFormat, Rect,
    RegionConfig, ResourceLimits, SourceStream,
};

/// Result of a region decode that may have been cancelled.
#[derive(Debug)]
#[must_use]
pub enum RegionOutcome<T> {
    /// The region was fully decoded.
    Decoded(T),
    /// Cancellation was observed at a safe point; nothing was produced.
    Cancelled(StopReason),
}

impl<T> RegionOutcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// The decoded value, if not cancelled.
    pub fn decoded(self) -> Option<T> {
        match self {
            Self::Decoded(value) => Some(value),
            Self::Cancelled(_) => None,
        }
    }

    /// Treat cancellation as an error.
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Decoded(value) => Ok(value),
            Self::Cancelled(reason) => Err(at(RegionError::from(reason))),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RegionOutcome<U> {
        match self {
            Self::Decoded(value) => RegionOutcome::Decoded(f(value)),
            Self::Cancelled(reason) => RegionOutcome::Cancelled(reason),
        }
    }
}

/// What a successful region decode resolved to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct RegionInfo {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Output pixel format.
    pub format: PixelFormat,
    /// The requested rectangle after clamping to the image.
    pub rect: Rect,
    /// Sample size that was applied.
    pub sample_size: u32,
    /// Encoded format of the source.
    pub source_format: ImageFormat,
}

impl RegionInfo {
    /// MIME type of the source, for diagnostics.
    pub fn mime_type(&self) -> &'static str {
        self.source_format.mime_type()
    }

    /// Bytes of pixel data the output bitmap holds.
    pub fn byte_len(&self) -> usize {
        self.format.row_bytes(self.width) * self.height as usize
    }
}

/// A freshly decoded region.
#[derive(Debug)]
#[non_exhaustive]
pub struct DecodedRegion {
    pub bitmap: Bitmap,
    pub info: RegionInfo,
}

/// A format-specific decoder chosen by probing the stream's magic bytes.
pub struct Decoder {
    format: ImageFormat,
    allocator: Arc<dyn PixelAllocator>,
}

impl Decoder {
    /// Pick a decoder for the stream.
    ///
    /// Only the first [`ImageFormat::MAGIC_BYTES`] bytes are read.
    pub fn probe(stream: &mut SourceStream) -> Result<Self> {
        let n = (stream.len() as usize).min(ImageFormat::MAGIC_BYTES);
        let mut magic = [0u8; ImageFormat::MAGIC_BYTES];
        stream
            .read_exact_at(0, &mut magic[..n])
            .map_err(|e| at(RegionError::SourceUnreadable(e)))?;
        let format =
            ImageFormat::detect(&magic[..n]).ok_or_else(|| at(RegionError::FormatUnrecognized))?;
        Ok(Self {
            format,
            allocator: Arc::new(HeapAllocator),
        })
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Install the allocator that backs freshly decoded bitmaps.
    pub fn with_allocator(mut self, allocator: Arc<dyn PixelAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    /// Build the tile index over the whole stream.
    ///
    /// On failure the decoder and the stream are both dropped before the
    /// error is returned.
    pub fn build_tile_index(
        self,
        stream: SourceStream,
        config: &RegionConfig,
    ) -> Result<IndexedDecoder> {
        let index = index::build(self.format, stream, config)?;
        Ok(IndexedDecoder {
            format: self.format,
            allocator: self.allocator,
            limits: *config.limits(),
            index,
        })
    }
}

impl core::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Decoder")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// A decoder with a built tile index. Owns the source stream.
pub struct IndexedDecoder {
    format: ImageFormat,
    allocator: Arc<dyn PixelAllocator>,
    limits: ResourceLimits,
    index: Box<dyn TileIndex>,
}

impl IndexedDecoder {
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Full image dimensions from the index.
    pub fn dimensions(&self) -> (u32, u32) {
        self.index.dimensions()
    }

    /// Decode `rect` into a new bitmap from the allocator.
    ///
    /// Sample size is validated first, then `stop` is checked before any
    /// other work. `stop` is polled again before each output row.
    pub fn decode_subset(
        &mut self,
        rect: Rect,
        options: &DecodeOptions,
        stop: &dyn Stop,
    ) -> Result<RegionOutcome<DecodedRegion>> {
        let info = match self.plan(rect, options, stop)? {
            RegionOutcome::Decoded(info) => info,
            RegionOutcome::Cancelled(reason) => return Ok(RegionOutcome::Cancelled(reason)),
        };
        let storage = self.allocator.allocate(info.byte_len()).map_err(at)?;
        let mut bitmap = Bitmap::from_storage(
            storage,
            info.width,
            info.height,
            info.format,
            options.premultiplied,
        );
        let outcome = self.fill(&info, options, &mut bitmap, stop)?;
        Ok(outcome.map(|()| DecodedRegion { bitmap, info }))
    }

    /// Decode `rect` into `target`, reusing its storage without allocating.
    ///
    /// A cancel requested before the call leaves `target` untouched. Once
    /// rows start being written, `target`'s generation is bumped whether the
    /// decode finishes, fails or is cancelled part way.
    pub fn decode_subset_into(
        &mut self,
        rect: Rect,
        options: &DecodeOptions,
        target: &mut Bitmap,
        stop: &dyn Stop,
    ) -> Result<RegionOutcome<RegionInfo>> {
        let info = match self.plan(rect, options, stop)? {
            RegionOutcome::Decoded(info) => info,
            RegionOutcome::Cancelled(reason) => return Ok(RegionOutcome::Cancelled(reason)),
        };
        target
            .reconfigure(info.width, info.height, info.format, options.premultiplied)
            .map_err(at)?;
        let filled = self.fill(&info, options, target, stop);
        target.notify_pixels_changed();
        Ok(filled?.map(|()| info))
    }

    /// Resolve the output geometry and format, and check it against limits.
    fn plan(
        &self,
        rect: Rect,
        options: &DecodeOptions,
        stop: &dyn Stop,
    ) -> Result<RegionOutcome<RegionInfo>> {
        options.validate().map_err(at)?;
        if let Err(reason) = stop.check() {
            return Ok(RegionOutcome::Cancelled(reason));
        }

        let (width, height) = self.index.dimensions();
        let clamped = Rect::of_size(width, height)
            .intersect(&rect)
            .ok_or_else(|| at(RegionError::EmptyRegion(rect)))?;
        let sample = options.sample_size;
        let (out_w, out_h) = clamped.sampled_size(sample);
        let format = options
            .preferred_format
            .unwrap_or_else(|| self.index.native_format());
        let info = RegionInfo {
            width: out_w,
            height: out_h,
            format,
            rect: clamped,
            sample_size: sample,
            source_format: self.format,
        };
        self.limits
            .check_region(info.byte_len() as u64)
            .map_err(|e| at(RegionError::from(e)))?;
        log::debug!(
            "decode {} region {rect} -> {clamped} @1/{sample}: {out_w}x{out_h} {format}",
            self.format
        );
        Ok(RegionOutcome::Decoded(info))
    }

    fn fill(
        &mut self,
        info: &RegionInfo,
        options: &DecodeOptions,
        bitmap: &mut Bitmap,
        stop: &dyn Stop,
    ) -> Result<RegionOutcome<()>> {
        let writer = RowWriter {
            format: info.format,
            premultiply: options.premultiplied,
            dither: options.dither,
        };
        let sampler = Sampler {
            rect: info.rect,
            sample: info.sample_size,
            quality: options.prefer_quality_over_speed,
            out_width: info.width,
        };
        let outcome = sampler.fill(self.index.as_mut(), bitmap, writer, stop)?;
        if let RegionOutcome::Cancelled(reason) = &outcome {
            log::debug!("{} region decode cancelled: {reason}", self.format);
        }
        Ok(outcome)
    }
}

impl core::fmt::Debug for IndexedDecoder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let (width, height) = self.index.dimensions();
        f.debug_struct("IndexedDecoder")
            .field("format", &self.format)
            .field("width", &width)
            .field("height", &height)
            .finish_non_exhaustive()
    }
}

/// Maps output pixels to blocks of source pixels.
struct Sampler {
    rect: Rect,
    sample: u32,
    quality: bool,
    out_width: u32,
}

impl Sampler {
    /// Source span `[start, end)` covered by output index `i` along an axis
    /// that starts at `origin` and ends (exclusive) at `limit`.
    ///
    /// `i` is below `ceil((limit - origin) / sample)`, so `start < limit`;
    /// only the block end can run past `u32::MAX` for huge sample sizes.
    fn block(&self, origin: i32, limit: i32, i: u32) -> (u32, u32) {
        let start = origin as u32 + i * self.sample;
        let end = start.saturating_add(self.sample).min(limit as u32);
        (start, end)
    }

    /// Centre of a block, which never lies past its clamped end.
    fn centre(&self, (start, end): (u32, u32)) -> u32 {
        start.saturating_add(self.sample / 2).min(end - 1)
    }

    /// Write every output row, polling `stop` before each.
    fn fill(
        &self,
        index: &mut dyn TileIndex,
        bitmap: &mut Bitmap,
        writer: RowWriter,
        stop: &dyn Stop,
    ) -> Result<RegionOutcome<()>> {
        let src_width = self.rect.width() as usize;
        let x0 = self.rect.left as u32;
        let mut src = vec![Rgba::<u8>::default(); src_width];
        let mut out = vec![Rgba::<u8>::default(); self.out_width as usize];
        let mut acc = vec![[0u64; 4]; if self.quality { out.len() } else { 0 }];

        let stride = bitmap.stride();
        for (oy, dst) in bitmap.as_bytes_mut().chunks_exact_mut(stride).enumerate() {
            if let Err(reason) = stop.check() {
                return Ok(RegionOutcome::Cancelled(reason));
            }
            let oy = oy as u32;
            let rows = self.block(self.rect.top, self.rect.bottom, oy);

            if self.quality {
                acc.fill([0; 4]);
                for sy in rows.0..rows.1 {
                    index.read_row(sy, x0, &mut src)?;
                    for (ox, sum) in acc.iter_mut().enumerate() {
                        let (c0, c1) = self.block(0, src_width as i32, ox as u32);
                        for px in &src[c0 as usize..c1 as usize] {
                            let a = px.a as u64;
                            sum[0] += px.r as u64 * a;
                            sum[1] += px.g as u64 * a;
                            sum[2] += px.b as u64 * a;
                            sum[3] += a;
                        }
                    }
                }
                for (ox, (sum, px)) in acc.iter().zip(out.iter_mut()).enumerate() {
                    let (c0, c1) = self.block(0, src_width as i32, ox as u32);
                    let count = (c1 - c0) as u64 * (rows.1 - rows.0) as u64;
                    *px = average(sum, count);
                }
            } else {
                index.read_row(self.centre(rows), x0, &mut src)?;
                for (ox, px) in out.iter_mut().enumerate() {
                    let cols = self.block(0, src_width as i32, ox as u32);
                    *px = src[self.centre(cols) as usize];
                }
            }
            writer.write(&out, dst, oy);
        }
        Ok(RegionOutcome::Decoded(()))
    }
}

/// Alpha-weighted box average, so transparent pixels do not tint the result.
fn average(sum: &[u64; 4], count: u64) -> Rgba<u8> {
    let alpha = sum[3];
    if alpha == 0 {
        return Rgba::new(0, 0, 0, 0);
    }
    let channel = |s: u64| ((s + alpha / 2) / alpha) as u8;
    Rgba {
        r: channel(sum[0]),
        g: channel(sum[1]),
        b: channel(sum[2]),
        a: ((alpha + count / 2) / count) as u8,
    }
}
