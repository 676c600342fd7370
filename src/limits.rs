//! Caps on what a region decoder may read and allocate.
//!
//! Each stage of a decoder's life has its own check: the encoded source
//! before probing, the image geometry and the tile index while the index is
//! built, and the output bitmap before every region decode.

/// Resource caps for one region decoder. `None` leaves a resource unbounded.
///
/// ```
/// use zenregion::ResourceLimits;
///
/// let limits = ResourceLimits::none()
///     .with_max_pixels(64 * 1024 * 1024)
///     .with_max_index_bytes(256 * 1024 * 1024)
///     .with_max_region_bytes(16 * 1024 * 1024);
/// assert!(limits.check_region(4096 * 1024).is_ok());
/// assert!(limits.check_region(32 * 1024 * 1024).is_err());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct ResourceLimits {
    /// Length of the encoded source.
    pub max_source_bytes: Option<u64>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    /// Width × height of the full image.
    pub max_pixels: Option<u64>,
    /// Decoded pixels a tiled index keeps for the lifetime of the handle.
    /// Row-offset indexes hold no pixels and are never charged.
    pub max_index_bytes: Option<u64>,
    /// Bytes of a single region's output bitmap.
    pub max_region_bytes: Option<u64>,
}

impl ResourceLimits {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_max_source_bytes(mut self, bytes: u64) -> Self {
        self.max_source_bytes = Some(bytes);
        self
    }

    pub fn with_max_width(mut self, width: u32) -> Self {
        self.max_width = Some(width);
        self
    }

    pub fn with_max_height(mut self, height: u32) -> Self {
        self.max_height = Some(height);
        self
    }

    pub fn with_max_pixels(mut self, pixels: u64) -> Self {
        self.max_pixels = Some(pixels);
        self
    }

    pub fn with_max_index_bytes(mut self, bytes: u64) -> Self {
        self.max_index_bytes = Some(bytes);
        self
    }

    pub fn with_max_region_bytes(mut self, bytes: u64) -> Self {
        self.max_region_bytes = Some(bytes);
        self
    }

    /// Checked before the source is probed.
    pub fn check_source(&self, len: u64) -> Result<(), LimitExceeded> {
        cap(Limit::SourceBytes, len, self.max_source_bytes)
    }

    /// Checked as soon as a header yields the image size.
    pub fn check_image(&self, width: u32, height: u32) -> Result<(), LimitExceeded> {
        cap(Limit::Width, width.into(), self.max_width.map(u64::from))?;
        cap(Limit::Height, height.into(), self.max_height.map(u64::from))?;
        cap(
            Limit::Pixels,
            u64::from(width) * u64::from(height),
            self.max_pixels,
        )
    }

    /// Checked before a tiled index decodes the full image.
    pub fn check_index(&self, bytes: u64) -> Result<(), LimitExceeded> {
        cap(Limit::IndexBytes, bytes, self.max_index_bytes)
    }

    /// Checked before a region's bitmap is allocated or reconfigured.
    pub fn check_region(&self, bytes: u64) -> Result<(), LimitExceeded> {
        cap(Limit::RegionBytes, bytes, self.max_region_bytes)
    }
}

fn cap(limit: Limit, actual: u64, max: Option<u64>) -> Result<(), LimitExceeded> {
    match max {
        Some(max) if actual > max => Err(LimitExceeded { limit, actual, max }),
        _ => Ok(()),
    }
}

/// Which cap a [`LimitExceeded`] refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Limit {
    SourceBytes,
    Width,
    Height,
    Pixels,
    IndexBytes,
    RegionBytes,
}

impl Limit {
    fn describe(self) -> (&'static str, &'static str) {
        match self {
            Self::SourceBytes => ("source", "bytes"),
            Self::Width => ("image width", "px"),
            Self::Height => ("image height", "px"),
            Self::Pixels => ("image area", "pixels"),
            Self::IndexBytes => ("tile index", "bytes"),
            Self::RegionBytes => ("region output", "bytes"),
        }
    }
}

/// A value went over one of the [`ResourceLimits`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct LimitExceeded {
    pub limit: Limit,
    pub actual: u64,
    pub max: u64,
}

impl core::fmt::Display for LimitExceeded {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let (what, unit) = self.limit.describe();
        write!(f, "{what} of {} {unit} is over the cap of {}", self.actual, self.max)
    }
}

impl core::error::Error for LimitExceeded {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DecodeOptions, Rect, RegionConfig, RegionDecoder, RegionError, test_util};

    fn open_with(bytes: &[u8], limits: ResourceLimits) -> Result<RegionDecoder, LimitExceeded> {
        let config = RegionConfig::new().with_limits(limits);
        RegionDecoder::from_bytes(bytes, &config).map_err(|e| match e.decompose().0 {
            RegionError::LimitExceeded(hit) => hit,
            other => panic!("expected a limit error, got {other}"),
        })
    }

    #[test]
    fn source_length_is_capped_before_probing() {
        let bytes = test_util::pnm_gradient(8, 8);
        let len = bytes.len() as u64;
        assert!(open_with(&bytes, ResourceLimits::none().with_max_source_bytes(len)).is_ok());

        let hit = open_with(&bytes, ResourceLimits::none().with_max_source_bytes(len - 1))
            .unwrap_err();
        assert_eq!(hit.limit, Limit::SourceBytes);
        assert_eq!((hit.actual, hit.max), (len, len - 1));
    }

    #[test]
    fn image_geometry_caps_apply_to_every_format() {
        let fixtures = [
            test_util::pnm_gradient(40, 10),
            test_util::farbfeld_gradient(40, 10),
            test_util::png_gradient(40, 10),
        ];
        for bytes in &fixtures {
            let hit = open_with(bytes, ResourceLimits::none().with_max_width(39)).unwrap_err();
            assert_eq!(hit.limit, Limit::Width);
            let hit = open_with(bytes, ResourceLimits::none().with_max_height(9)).unwrap_err();
            assert_eq!(hit.limit, Limit::Height);
            let hit = open_with(bytes, ResourceLimits::none().with_max_pixels(399)).unwrap_err();
            assert_eq!((hit.limit, hit.actual), (Limit::Pixels, 400));

            let exact = ResourceLimits::none()
                .with_max_width(40)
                .with_max_height(10)
                .with_max_pixels(400);
            assert!(open_with(bytes, exact).is_ok());
        }
    }

    #[test]
    fn index_cap_only_charges_tiled_sources() {
        let limits = ResourceLimits::none().with_max_index_bytes(20 * 20 * 4 - 1);
        let hit = open_with(&test_util::png_gradient(20, 20), limits).unwrap_err();
        assert_eq!((hit.limit, hit.actual), (Limit::IndexBytes, 1600));

        // Row-offset indexes read on demand and keep no pixels.
        assert!(open_with(&test_util::pnm_gradient(20, 20), limits).is_ok());
    }

    #[test]
    fn region_cap_is_checked_per_decode() {
        let limits = ResourceLimits::none().with_max_region_bytes(10 * 10 * 4);
        let mut d = open_with(&test_util::pnm_gradient(40, 40), limits).unwrap();

        let ok = d.region(Rect::of_size(10, 10)).decode().unwrap();
        assert!(!ok.is_cancelled());
        // Half-size output of a 20x20 area fits too.
        let opts = DecodeOptions::new().with_sample_size(2);
        assert!(d.region(Rect::of_size(20, 20)).with_options(opts).decode().is_ok());

        let err = d.region(Rect::of_size(11, 10)).decode().unwrap_err().decompose().0;
        let hit = match err {
            RegionError::LimitExceeded(hit) => hit,
            other => panic!("expected a limit error, got {other}"),
        };
        assert_eq!((hit.limit, hit.actual, hit.max), (Limit::RegionBytes, 440, 400));

        // The handle stays usable after a rejected region.
        assert!(d.region(Rect::of_size(5, 5)).decode().is_ok());
    }

    #[test]
    fn messages_name_the_cap() {
        let hit = LimitExceeded {
            limit: Limit::RegionBytes,
            actual: 4096,
            max: 1024,
        };
        assert_eq!(
            hit.to_string(),
            "region output of 4096 bytes is over the cap of 1024"
        );
        let hit = LimitExceeded {
            limit: Limit::Width,
            actual: 5000,
            max: 4096,
        };
        assert_eq!(hit.to_string(), "image width of 5000 px is over the cap of 4096");
    }
}
