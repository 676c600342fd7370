//! Error type shared by open, region decode and the handle table.
//!
//! Errors travel as [`At<RegionError>`](whereat::At) so the origin of a
//! failure deep inside an index reader is kept. Borrow the variant with
//! [`At::error`](whereat::At::error), or take it apart with
//! [`At::decompose`](whereat::At::decompose) to keep the trace as well.

use std::io;

use enough::StopReason;
use whereat::At;

use crate::registry::RegionHandle;
use crate::{ImageFormat, LimitExceeded, Rect};

/// Result alias used throughout the crate.
pub type Result<T, E = At<RegionError>> = core::result::Result<T, E>;

/// Failure opening a region decoder or decoding a region.
///
/// Open failures (`SourceUnreadable`, `FormatUnrecognized`,
/// `IndexBuildFailed`) mean no handle was produced and every resource
/// acquired for the attempt has been released. Every other variant is a
/// per-call failure: the handle stays valid.
#[derive(Debug)]
#[non_exhaustive]
pub enum RegionError {
    /// The source medium could not produce a stream (broken descriptor,
    /// short asset read, reader I/O error).
    SourceUnreadable(io::Error),
    /// No decoder recognizes the stream's magic bytes.
    FormatUnrecognized,
    /// The format was recognized but its tile index could not be built.
    IndexBuildFailed {
        /// Format of the decoder that attempted the index.
        format: ImageFormat,
        /// Decoder-specific cause.
        reason: String,
    },
    /// The decoder failed while producing region pixels.
    DecodeFailed(String),
    /// Sample size was zero.
    InvalidSampleSize,
    /// The requested rectangle does not intersect the image.
    EmptyRegion(Rect),
    /// A reused bitmap's storage cannot hold the decoded region.
    ReuseBufferTooSmall {
        /// Bytes the region needs.
        required: usize,
        /// Bytes the bitmap owns.
        capacity: usize,
    },
    /// The pixel allocator could not provide storage.
    OutOfMemory {
        /// Bytes requested.
        requested: usize,
    },
    /// A configured resource limit was hit.
    LimitExceeded(LimitExceeded),
    /// Cancellation was observed at a safe point.
    ///
    /// Region decodes report this as
    /// [`RegionOutcome::Cancelled`](crate::RegionOutcome::Cancelled) rather
    /// than as an error.
    Cancelled(StopReason),
    /// The handle is not (or no longer) present in the handle table.
    UnknownHandle(RegionHandle),
}

impl RegionError {
    /// Whether this error came from building a handle (no handle exists).
    pub fn is_open_failure(&self) -> bool {
        matches!(
            self,
            Self::SourceUnreadable(_) | Self::FormatUnrecognized | Self::IndexBuildFailed { .. }
        )
    }

    pub(crate) fn index(format: ImageFormat, reason: impl Into<String>) -> Self {
        Self::IndexBuildFailed {
            format,
            reason: reason.into(),
        }
    }
}

impl core::fmt::Display for RegionError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::SourceUnreadable(err) => write!(f, "source unreadable: {err}"),
            Self::FormatUnrecognized => f.write_str("image format not supported"),
            Self::IndexBuildFailed { format, reason } => {
                write!(f, "image failed to decode using {format} decoder: {reason}")
            }
            Self::DecodeFailed(reason) => write!(f, "region decode failed: {reason}"),
            Self::InvalidSampleSize => f.write_str("sample size must be at least 1"),
            Self::EmptyRegion(rect) => write!(f, "region {rect} does not intersect the image"),
            Self::ReuseBufferTooSmall { required, capacity } => write!(
                f,
                "reused bitmap holds {capacity} bytes, region needs {required}"
            ),
            Self::OutOfMemory { requested } => {
                write!(f, "pixel allocator failed to provide {requested} bytes")
            }
            Self::LimitExceeded(err) => write!(f, "limit exceeded: {err}"),
            Self::Cancelled(reason) => write!(f, "stopped: {reason}"),
            Self::UnknownHandle(handle) => write!(f, "unknown region decoder handle {handle}"),
        }
    }
}

impl core::error::Error for RegionError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::SourceUnreadable(err) => Some(err),
            Self::LimitExceeded(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LimitExceeded> for RegionError {
    fn from(err: LimitExceeded) -> Self {
        Self::LimitExceeded(err)
    }
}

impl From<StopReason> for RegionError {
    fn from(reason: StopReason) -> Self {
        Self::Cancelled(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_failures_are_classified() {
        assert!(RegionError::FormatUnrecognized.is_open_failure());
        assert!(RegionError::index(ImageFormat::Png, "truncated").is_open_failure());
        assert!(
            RegionError::SourceUnreadable(io::Error::other("broken file descriptor"))
                .is_open_failure()
        );
        assert!(!RegionError::InvalidSampleSize.is_open_failure());
        assert!(!RegionError::DecodeFailed("eof".into()).is_open_failure());
    }

    #[test]
    fn display_names_the_decoder() {
        let err = RegionError::index(ImageFormat::Png, "bad chunk");
        assert_eq!(
            err.to_string(),
            "image failed to decode using PNG decoder: bad chunk"
        );
        assert_eq!(
            RegionError::FormatUnrecognized.to_string(),
            "image format not supported"
        );
    }

    #[test]
    fn limit_errors_convert_and_chain() {
        use core::error::Error as _;
        let err: RegionError = LimitExceeded {
            limit: crate::Limit::RegionBytes,
            actual: 10,
            max: 5,
        }
        .into();
        assert!(matches!(err, RegionError::LimitExceeded(_)));
        assert!(err.source().is_some());
    }

    #[test]
    fn composes_into_caller_error_types() {
        #[derive(Debug, thiserror::Error)]
        enum ViewerError {
            #[error("tile fetch failed")]
            Region(#[from] RegionError),
        }

        let err: ViewerError = RegionError::InvalidSampleSize.into();
        assert_eq!(err.to_string(), "tile fetch failed");
        assert!(matches!(
            err,
            ViewerError::Region(RegionError::InvalidSampleSize)
        ));
    }
}
