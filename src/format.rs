//! Source format detection.

/// Encoded formats a region decoder can be opened on.
///
/// Detection only looks at magic bytes. Whether a tile index can actually be
/// built (e.g. ASCII PNM is recognized but not indexable) is decided later.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
    Bmp,
    Pnm,
    Farbfeld,
}

impl ImageFormat {
    /// Bytes needed by [`detect`](Self::detect) to recognize every format.
    pub const MAGIC_BYTES: usize = 12;

    /// Detect format from magic bytes. Returns `None` if unrecognized.
    pub fn detect(data: &[u8]) -> Option<Self> {
        // JPEG: FF D8 FF
        if data.len() >= 3 && data[0] == 0xFF && data[1] == 0xD8 && data[2] == 0xFF {
            return Some(ImageFormat::Jpeg);
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.len() >= 8 && data[..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A] {
            return Some(ImageFormat::Png);
        }

        // GIF: "GIF87a" or "GIF89a"
        if data.len() >= 6
            && data[..3] == *b"GIF"
            && data[3] == b'8'
            && (data[4] == b'7' || data[4] == b'9')
            && data[5] == b'a'
        {
            return Some(ImageFormat::Gif);
        }

        // WebP: "RIFF....WEBP"
        if data.len() >= 12 && data[..4] == *b"RIFF" && data[8..12] == *b"WEBP" {
            return Some(ImageFormat::WebP);
        }

        // farbfeld: literal magic, checked before BMP/PNM which use short prefixes
        if data.len() >= 8 && data[..8] == *b"farbfeld" {
            return Some(ImageFormat::Farbfeld);
        }

        // BMP: "BM" followed by a little-endian file size
        if data.len() >= 6 && data[..2] == *b"BM" {
            return Some(ImageFormat::Bmp);
        }

        // PNM family: P1-P7
        if data.len() >= 2 && data[0] == b'P' && matches!(data[1], b'1'..=b'7') {
            return Some(ImageFormat::Pnm);
        }

        None
    }

    /// MIME type string, reported back after a successful region decode.
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Pnm => "image/x-portable-anymap",
            ImageFormat::Farbfeld => "image/x-farbfeld",
        }
    }

    /// Whether the tile index for this format reads rows straight from the
    /// stream, instead of holding a full decode split into tiles.
    pub fn has_random_access(self) -> bool {
        matches!(self, ImageFormat::Pnm | ImageFormat::Farbfeld)
    }
}

impl core::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Png => "PNG",
            ImageFormat::Gif => "GIF",
            ImageFormat::WebP => "WebP",
            ImageFormat::Bmp => "BMP",
            ImageFormat::Pnm => "PNM",
            ImageFormat::Farbfeld => "farbfeld",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_jpeg() {
        assert_eq!(
            ImageFormat::detect(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some(ImageFormat::Jpeg)
        );
    }

    #[test]
    fn detect_png() {
        assert_eq!(
            ImageFormat::detect(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
            Some(ImageFormat::Png)
        );
    }

    #[test]
    fn detect_gif() {
        assert_eq!(
            ImageFormat::detect(b"GIF89a\x00\x00"),
            Some(ImageFormat::Gif)
        );
    }

    #[test]
    fn detect_webp() {
        assert_eq!(
            ImageFormat::detect(b"RIFF\x00\x00\x00\x00WEBP"),
            Some(ImageFormat::WebP)
        );
    }

    #[test]
    fn detect_bmp() {
        assert_eq!(
            ImageFormat::detect(b"BM\x36\x00\x00\x00"),
            Some(ImageFormat::Bmp)
        );
    }

    #[test]
    fn detect_farbfeld() {
        assert_eq!(
            ImageFormat::detect(b"farbfeld\x00\x00\x00\x01"),
            Some(ImageFormat::Farbfeld)
        );
    }

    #[test]
    fn detect_pnm_binary_and_ascii() {
        assert_eq!(ImageFormat::detect(b"P5\n3 2\n255\n"), Some(ImageFormat::Pnm));
        assert_eq!(ImageFormat::detect(b"P6\n3 2\n255\n"), Some(ImageFormat::Pnm));
        // ASCII variants are recognized here and rejected at index time.
        assert_eq!(ImageFormat::detect(b"P3\n3 2\n"), Some(ImageFormat::Pnm));
        assert_eq!(ImageFormat::detect(b"P8"), None);
    }

    #[test]
    fn detect_unknown() {
        assert_eq!(ImageFormat::detect(b"nope"), None);
        assert_eq!(ImageFormat::detect(&[]), None);
        assert_eq!(ImageFormat::detect(b"B"), None);
    }

    #[test]
    fn mime_types() {
        assert_eq!(ImageFormat::Jpeg.mime_type(), "image/jpeg");
        assert_eq!(ImageFormat::Png.mime_type(), "image/png");
        assert_eq!(ImageFormat::Pnm.mime_type(), "image/x-portable-anymap");
    }

    #[test]
    fn random_access() {
        assert!(ImageFormat::Pnm.has_random_access());
        assert!(ImageFormat::Farbfeld.has_random_access());
        assert!(!ImageFormat::Png.has_random_access());
        assert!(!ImageFormat::Jpeg.has_random_access());
    }

    #[test]
    fn display_format() {
        assert_eq!(format!("{}", ImageFormat::Jpeg), "JPEG");
        assert_eq!(format!("{}", ImageFormat::WebP), "WebP");
        assert_eq!(format!("{}", ImageFormat::Farbfeld), "farbfeld");
    }
}
