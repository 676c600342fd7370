//! Region decoder handles: open once, decode many rectangles.
//!
//! ```
//! use zenregion::{DecodeOptions, Rect, RegionConfig, RegionDecoder};
//!
//! // 4x2 binary graymap
//! let mut pgm = b"P5 4 2 255\n".to_vec();
//! pgm.extend_from_slice(&[0, 50, 100, 150, 200, 250, 255, 255]);
//!
//! let mut decoder = RegionDecoder::from_bytes(&pgm, &RegionConfig::new())?;
//! assert_eq!((decoder.width(), decoder.height()), (4, 2));
//!
//! let region = decoder
//!     .region(Rect::new(1, 0, 3, 2))
//!     .with_options(DecodeOptions::new().with_sample_size(1))
//!     .decode()?
//!     .decoded()
//!     .expect("not cancelled");
//! assert_eq!(region.bitmap.as_bytes(), &[50, 100, 250, 255]);
//! # Ok::<(), whereat::At<zenregion::RegionError>>(())
//! ```

use std::io::Read;

use enough::{Stop, Unstoppable};
use whereat::at;

use crate::decoder::{DecodedRegion, Decoder, IndexedDecoder, RegionInfo, RegionOutcome};
use crate::error::{RegionError, Result};
use crate::{
    Asset, Bitmap, DecodeOptions, ImageFormat, PixelFormat, Rect, RegionConfig, SourceStream,
};

/// An opened, indexed image that serves region decodes.
///
/// Owns the decoder and, through it, the source stream; both are released
/// when the handle is dropped or [`close`](Self::close)d. Decoding takes
/// `&mut self`, so a handle runs one decode at a time. Distinct handles are
/// independent and can live on different threads.
#[derive(Debug)]
pub struct RegionDecoder {
    decoder: IndexedDecoder,
    width: u32,
    height: u32,
}

impl RegionDecoder {
    /// Wrap an already indexed decoder.
    pub fn new(decoder: IndexedDecoder, width: u32, height: u32) -> Self {
        Self {
            decoder,
            width,
            height,
        }
    }

    /// Probe `stream`, build its tile index and return a handle.
    ///
    /// Every failure releases the stream before returning.
    pub fn open(mut stream: SourceStream, config: &RegionConfig) -> Result<Self> {
        if let Err(e) = config.limits().check_source(stream.len()) {
            log::warn!("region open rejected: {e}");
            return Err(at(RegionError::from(e)));
        }

        let decoder = Decoder::probe(&mut stream)
            .inspect_err(|e| log::warn!("region open failed: {e:?}"))?
            .with_allocator(config.allocator().clone());
        let format = decoder.format();

        let indexed = decoder
            .build_tile_index(stream, config)
            .inspect_err(|e| log::warn!("{format} tile index failed: {e:?}"))?;
        let (width, height) = indexed.dimensions();
        log::debug!(
            "opened {format} region decoder: {width}x{height}, random access: {}",
            format.has_random_access()
        );
        Ok(Self::new(indexed, width, height))
    }

    /// Open from in-memory bytes. The bytes are copied.
    pub fn from_bytes(bytes: &[u8], config: &RegionConfig) -> Result<Self> {
        Self::open(SourceStream::from_bytes(bytes), config)
    }

    /// Open from a file descriptor without moving its offset.
    #[cfg(unix)]
    pub fn from_fd<F: std::os::fd::AsFd>(fd: F, config: &RegionConfig) -> Result<Self> {
        Self::open(SourceStream::from_fd(fd)?, config)
    }

    /// Open from any reader, which is drained into memory.
    pub fn from_reader<R: Read>(reader: R, config: &RegionConfig) -> Result<Self> {
        Self::open(SourceStream::from_reader(reader)?, config)
    }

    /// Open from a packaged asset.
    pub fn from_asset<A: Asset + ?Sized>(asset: &mut A, config: &RegionConfig) -> Result<Self> {
        Self::open(SourceStream::from_asset(asset)?, config)
    }

    /// Full image width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Full image height.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Detected source format.
    pub fn format(&self) -> ImageFormat {
        self.decoder.format()
    }

    /// Decode `rect` with default options apart from format and sample size.
    ///
    /// Returns the fresh bitmap, or `None` when `target` was reused. This
    /// entry point cannot be cancelled; use [`region`](Self::region) for
    /// full control.
    pub fn decode_region(
        &mut self,
        target: Option<&mut Bitmap>,
        rect: Rect,
        preferred_format: Option<PixelFormat>,
        sample_size: u32,
    ) -> Result<Option<Bitmap>> {
        let mut options = DecodeOptions::new().with_sample_size(sample_size);
        options.preferred_format = preferred_format;
        match target {
            Some(bitmap) => {
                self.decoder
                    .decode_subset_into(rect, &options, bitmap, &Unstoppable)?
                    .into_result()?;
                Ok(None)
            }
            None => {
                let region = self
                    .decoder
                    .decode_subset(rect, &options, &Unstoppable)?
                    .into_result()?;
                Ok(Some(region.bitmap))
            }
        }
    }

    /// Start a decode of `rect`.
    pub fn region(&mut self, rect: Rect) -> RegionJob<'_> {
        RegionJob {
            decoder: self,
            rect,
            options: DecodeOptions::default(),
            stop: &Unstoppable,
        }
    }

    /// Release the decoder and its stream.
    pub fn close(self) {
        log::debug!("closing {} region decoder", self.format());
    }
}

/// One parameterized region decode against a [`RegionDecoder`].
pub struct RegionJob<'a> {
    decoder: &'a mut RegionDecoder,
    rect: Rect,
    options: DecodeOptions,
    stop: &'a dyn Stop,
}

impl<'a> RegionJob<'a> {
    /// Replace the decode options.
    pub fn with_options(mut self, options: DecodeOptions) -> Self {
        self.options = options;
        self
    }

    /// Poll `stop` before the decode and at every output row.
    pub fn with_stop(mut self, stop: &'a dyn Stop) -> Self {
        self.stop = stop;
        self
    }

    /// Decode into a new bitmap from the decoder's allocator.
    pub fn decode(self) -> Result<RegionOutcome<DecodedRegion>> {
        self.decoder
            .decoder
            .decode_subset(self.rect, &self.options, self.stop)
    }

    /// Decode into `target`, reusing its storage.
    ///
    /// No allocation happens; if `target` is too small the decode fails and
    /// `target` is left as it was.
    pub fn decode_into(self, target: &mut Bitmap) -> Result<RegionOutcome<RegionInfo>> {
        self.decoder
            .decoder
            .decode_subset_into(self.rect, &self.options, target, self.stop)
    }
}
