//! Owned pixel buffer that region decodes write into.
//!
//! A [`Bitmap`] is either produced fresh by a region decode (its storage
//! came from the decoder's [`PixelAllocator`](crate::PixelAllocator)) or
//! supplied by the caller for reuse, in which case the decode reconfigures
//! it in place without touching the allocator.

use imgref::{ImgRef, ImgVec};
use rgb::{FromSlice, Rgba};

use crate::PixelFormat;
use crate::error::RegionError;

/// Owned pixel buffer with format metadata.
///
/// Rows are tightly packed (`stride == width * bytes_per_pixel`). The
/// backing `Vec<u8>` may be longer than the current image when the bitmap
/// has been reused for a smaller region; that spare capacity is what makes
/// reuse allocation-free.
pub struct Bitmap {
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
    premultiplied: bool,
    generation: u64,
}

impl Bitmap {
    /// Allocate a zero-filled bitmap, typically to be reused as a decode target.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = format.row_bytes(width) * height as usize;
        Self {
            data: vec![0u8; len],
            width,
            height,
            format,
            premultiplied: true,
            generation: 0,
        }
    }

    /// Wrap storage produced by an allocator.
    ///
    /// `data` must hold at least `row_bytes(width) * height` bytes.
    pub(crate) fn from_storage(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        premultiplied: bool,
    ) -> Self {
        debug_assert!(data.len() >= format.row_bytes(width) * height as usize);
        Self {
            data,
            width,
            height,
            format,
            premultiplied,
            generation: 0,
        }
    }

    /// Image width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Byte stride between row starts.
    #[inline]
    pub fn stride(&self) -> usize {
        self.format.row_bytes(self.width)
    }

    /// Pixel format.
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Whether color channels are premultiplied by alpha.
    ///
    /// Reflects the decode request, also for formats without alpha.
    #[inline]
    pub fn is_premultiplied(&self) -> bool {
        self.premultiplied
    }

    /// Bytes of backing storage, which bounds what a reuse can hold.
    #[inline]
    pub fn capacity_bytes(&self) -> usize {
        self.data.len()
    }

    /// Counter bumped every time the pixel content changes.
    ///
    /// Caches keyed on a bitmap should compare this to detect stale entries.
    #[inline]
    pub fn generation_id(&self) -> u64 {
        self.generation
    }

    /// Record that the pixel content changed.
    pub fn notify_pixels_changed(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    /// Pixel bytes of the current image, without spare capacity.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.stride() * self.height as usize]
    }

    /// Mutable pixel bytes of the current image.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let len = self.stride() * self.height as usize;
        &mut self.data[..len]
    }

    /// Borrow row `y`.
    ///
    /// # Panics
    ///
    /// Panics if `y >= height`.
    pub fn row(&self, y: u32) -> &[u8] {
        assert!(y < self.height, "row {y} out of bounds (height: {})", self.height);
        let stride = self.stride();
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    /// Zero-copy RGBA8 view, if that is the bitmap's format.
    pub fn as_rgba8(&self) -> Option<ImgRef<'_, Rgba<u8>>> {
        if self.format != PixelFormat::Rgba8 {
            return None;
        }
        Some(ImgRef::new(
            self.as_bytes().as_rgba(),
            self.width as usize,
            self.height as usize,
        ))
    }

    /// Copy into an `ImgVec` of RGBA8, expanding other formats.
    ///
    /// RGB565 channels are widened by bit replication, gray is replicated
    /// to R=G=B, and alpha masks become black with that alpha.
    pub fn to_rgba8(&self) -> ImgVec<Rgba<u8>> {
        let pixels: Vec<Rgba<u8>> = match self.format {
            PixelFormat::Rgba8 => self.as_bytes().as_rgba().to_vec(),
            PixelFormat::Rgb565 => self
                .as_bytes()
                .chunks_exact(2)
                .map(|c| {
                    let v = u16::from_le_bytes([c[0], c[1]]);
                    let r = ((v >> 11) & 0x1F) as u8;
                    let g = ((v >> 5) & 0x3F) as u8;
                    let b = (v & 0x1F) as u8;
                    Rgba {
                        r: (r << 3) | (r >> 2),
                        g: (g << 2) | (g >> 4),
                        b: (b << 3) | (b >> 2),
                        a: 255,
                    }
                })
                .collect(),
            PixelFormat::Gray8 => self
                .as_bytes()
                .iter()
                .map(|&v| Rgba {
                    r: v,
                    g: v,
                    b: v,
                    a: 255,
                })
                .collect(),
            PixelFormat::Alpha8 => self
                .as_bytes()
                .iter()
                .map(|&a| Rgba { r: 0, g: 0, b: 0, a })
                .collect(),
        };
        ImgVec::new(pixels, self.width as usize, self.height as usize)
    }

    /// Consume the bitmap and return the backing `Vec<u8>`.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Change dimensions and format in place, keeping the backing storage.
    ///
    /// Fails without modifying anything if the storage is too small.
    pub(crate) fn reconfigure(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
        premultiplied: bool,
    ) -> Result<(), RegionError> {
        let required = format.row_bytes(width) * height as usize;
        if required > self.data.len() {
            return Err(RegionError::ReuseBufferTooSmall {
                required,
                capacity: self.data.len(),
            });
        }
        self.width = width;
        self.height = height;
        self.format = format;
        self.premultiplied = premultiplied;
        Ok(())
    }
}

impl core::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "Bitmap({}x{}, {}{}, gen {})",
            self.width,
            self.height,
            self.format,
            if self.premultiplied { " premul" } else { "" },
            self.generation
        )
    }
}
