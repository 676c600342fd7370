//! Fixture images and helpers shared by the unit tests.

use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rgb::Rgba;

use crate::Asset;

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Opaque test pattern; every fixture encodes this.
pub(crate) fn gradient_pixel(x: u32, y: u32) -> Rgba<u8> {
    Rgba {
        r: (x * 3 + y) as u8,
        g: (y * 5 + x / 2) as u8,
        b: ((x ^ y) * 7) as u8,
        a: 255,
    }
}

/// The same pattern with varying alpha.
pub(crate) fn gradient_pixel_alpha(x: u32, y: u32) -> Rgba<u8> {
    Rgba {
        a: (x * 37 + y * 11 + 30) as u8,
        ..gradient_pixel(x, y)
    }
}

fn encode(image: image::DynamicImage, format: image::ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).unwrap();
    out.into_inner()
}

pub(crate) fn png_gradient(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(width, height, |x, y| {
        let p = gradient_pixel(x, y);
        image::Rgba([p.r, p.g, p.b, p.a])
    });
    encode(img.into(), image::ImageFormat::Png)
}

pub(crate) fn png_gray(width: u32, height: u32) -> Vec<u8> {
    let img = image::GrayImage::from_fn(width, height, |x, y| image::Luma([(x * 16 + y) as u8]));
    encode(img.into(), image::ImageFormat::Png)
}

fn rgb_gradient(width: u32, height: u32) -> image::DynamicImage {
    image::RgbImage::from_fn(width, height, |x, y| {
        let p = gradient_pixel(x, y);
        image::Rgb([p.r, p.g, p.b])
    })
    .into()
}

/// Lossy, so only geometry is meaningful.
pub(crate) fn jpeg_gradient(width: u32, height: u32) -> Vec<u8> {
    encode(rgb_gradient(width, height), image::ImageFormat::Jpeg)
}

/// Palette-quantized, so only geometry and opacity are meaningful.
pub(crate) fn gif_gradient(width: u32, height: u32) -> Vec<u8> {
    encode(rgb_gradient(width, height), image::ImageFormat::Gif)
}

/// Lossless WebP.
pub(crate) fn webp_gradient(width: u32, height: u32) -> Vec<u8> {
    encode(rgb_gradient(width, height), image::ImageFormat::WebP)
}

/// 24-bit BMP.
pub(crate) fn bmp_gradient(width: u32, height: u32) -> Vec<u8> {
    encode(rgb_gradient(width, height), image::ImageFormat::Bmp)
}

/// Binary 8-bit pixmap (P6).
pub(crate) fn pnm_gradient(width: u32, height: u32) -> Vec<u8> {
    let mut out = format!("P6\n{width} {height}\n255\n").into_bytes();
    for y in 0..height {
        for x in 0..width {
            let p = gradient_pixel(x, y);
            out.extend_from_slice(&[p.r, p.g, p.b]);
        }
    }
    out
}

pub(crate) fn farbfeld_gradient(width: u32, height: u32) -> Vec<u8> {
    let mut out = b"farbfeld".to_vec();
    out.extend_from_slice(&width.to_be_bytes());
    out.extend_from_slice(&height.to_be_bytes());
    for y in 0..height {
        for x in 0..width {
            let p = gradient_pixel_alpha(x, y);
            for c in [p.r, p.g, p.b, p.a] {
                out.extend_from_slice(&(c as u16 * 257).to_be_bytes());
            }
        }
    }
    out
}

/// Write `bytes` to a fresh file under the temp dir.
pub(crate) fn temp_file(tag: &str, bytes: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "zenregion-{tag}-{}-{:?}",
        std::process::id(),
        std::thread::current().id()
    ));
    std::fs::write(&path, bytes).unwrap();
    path
}

/// An [`Asset`] over owned bytes that reports their true length.
pub(crate) struct MemoryAsset(Cursor<Vec<u8>>);

impl MemoryAsset {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Cursor::new(bytes))
    }
}

impl Read for MemoryAsset {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Asset for MemoryAsset {
    fn length(&self) -> u64 {
        self.0.get_ref().len() as u64
    }
}

/// In-memory source that counts how often it has been dropped.
pub(crate) struct DropCounted {
    inner: Cursor<Vec<u8>>,
    drops: Arc<AtomicUsize>,
}

impl DropCounted {
    pub fn new(bytes: Vec<u8>, drops: &Arc<AtomicUsize>) -> Self {
        Self {
            inner: Cursor::new(bytes),
            drops: Arc::clone(drops),
        }
    }
}

impl Read for DropCounted {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for DropCounted {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl Drop for DropCounted {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}
