//! Backing storage for freshly decoded bitmaps.

use crate::error::RegionError;

/// Supplies pixel storage for bitmaps a region decode creates.
///
/// Installed on a decoder at open time and shared with it. Reused bitmaps
/// never go through the allocator.
pub trait PixelAllocator: Send + Sync {
    /// Return a zero-initialized buffer of exactly `bytes` bytes.
    fn allocate(&self, bytes: usize) -> Result<Vec<u8>, RegionError>;
}

/// Heap allocator using fallible reservation.
///
/// An allocation the system cannot satisfy becomes
/// [`RegionError::OutOfMemory`] instead of aborting the process.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeapAllocator;

impl PixelAllocator for HeapAllocator {
    fn allocate(&self, bytes: usize) -> Result<Vec<u8>, RegionError> {
        let mut data = Vec::new();
        data.try_reserve_exact(bytes)
            .map_err(|_| RegionError::OutOfMemory { requested: bytes })?;
        data.resize(bytes, 0);
        Ok(data)
    }
}
