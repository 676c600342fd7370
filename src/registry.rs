//! Opaque integer handles for callers that cannot hold a [`RegionDecoder`].
//!
//! Foreign-function boundaries and scripting bridges pass plain integers
//! around. [`HandleTable`] maps those to decoders, serializes calls on each
//! handle with its own mutex and lets distinct handles proceed in parallel.
//! Releasing a handle twice, or using one after release, is an
//! [`UnknownHandle`](RegionError::UnknownHandle) error rather than a crash.

use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use enough::Stop;
use whereat::at;

use crate::error::{RegionError, Result};
use crate::{
    Asset, Bitmap, DecodeOptions, Rect, RegionConfig, RegionDecoder, RegionInfo, RegionOutcome,
};

/// Opaque identifier of an open region decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionHandle(u64);

impl RegionHandle {
    /// The raw value to pass across a boundary.
    pub fn get(self) -> u64 {
        self.0
    }

    /// Rebuild a handle from a raw value. Unknown values are rejected when
    /// the handle is used, not here.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl core::fmt::Display for RegionHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type Entry = Arc<Mutex<RegionDecoder>>;

/// Table of open region decoders keyed by [`RegionHandle`].
pub struct HandleTable {
    entries: Mutex<HashMap<u64, Entry>>,
    next: AtomicU64,
}

// A panic while a lock is held leaves the data consistent: entries are only
// inserted or removed whole, and a decoder is valid between calls.
fn relock<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next: AtomicU64::new(1),
        }
    }

    /// The process-wide table.
    pub fn global() -> &'static HandleTable {
        static GLOBAL: OnceLock<HandleTable> = OnceLock::new();
        GLOBAL.get_or_init(HandleTable::new)
    }

    /// Take ownership of `decoder` and return its handle.
    pub fn insert(&self, decoder: RegionDecoder) -> RegionHandle {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        relock(&self.entries).insert(id, Arc::new(Mutex::new(decoder)));
        log::trace!("region handle #{id} created");
        RegionHandle(id)
    }

    pub fn open_bytes(&self, bytes: &[u8], config: &RegionConfig) -> Result<RegionHandle> {
        Ok(self.insert(RegionDecoder::from_bytes(bytes, config)?))
    }

    #[cfg(unix)]
    pub fn open_fd<F: std::os::fd::AsFd>(
        &self,
        fd: F,
        config: &RegionConfig,
    ) -> Result<RegionHandle> {
        Ok(self.insert(RegionDecoder::from_fd(fd, config)?))
    }

    pub fn open_reader<R: Read>(&self, reader: R, config: &RegionConfig) -> Result<RegionHandle> {
        Ok(self.insert(RegionDecoder::from_reader(reader, config)?))
    }

    pub fn open_asset<A: Asset + ?Sized>(
        &self,
        asset: &mut A,
        config: &RegionConfig,
    ) -> Result<RegionHandle> {
        Ok(self.insert(RegionDecoder::from_asset(asset, config)?))
    }

    fn entry(&self, handle: RegionHandle) -> Result<Entry> {
        relock(&self.entries)
            .get(&handle.0)
            .cloned()
            .ok_or_else(|| at(RegionError::UnknownHandle(handle)))
    }

    pub fn width(&self, handle: RegionHandle) -> Result<u32> {
        let entry = self.entry(handle)?;
        Ok(relock(&entry).width())
    }

    pub fn height(&self, handle: RegionHandle) -> Result<u32> {
        let entry = self.entry(handle)?;
        Ok(relock(&entry).height())
    }

    /// Decode a region through `handle`.
    ///
    /// With `target` the bitmap is reused and `None` is returned in place
    /// of a fresh one. Calls on the same handle wait for each other.
    pub fn decode_region(
        &self,
        handle: RegionHandle,
        rect: Rect,
        options: &DecodeOptions,
        target: Option<&mut Bitmap>,
        stop: &dyn Stop,
    ) -> Result<RegionOutcome<(Option<Bitmap>, RegionInfo)>> {
        let entry = self.entry(handle)?;
        let mut decoder = relock(&entry);
        let job = decoder.region(rect).with_options(*options).with_stop(stop);
        Ok(match target {
            Some(bitmap) => job.decode_into(bitmap)?.map(|info| (None, info)),
            None => job.decode()?.map(|r| (Some(r.bitmap), r.info)),
        })
    }

    /// Destroy the decoder behind `handle`.
    ///
    /// A decode already running on the handle finishes first. Releasing a
    /// handle that is unknown or already released fails.
    pub fn release(&self, handle: RegionHandle) -> Result<()> {
        let entry = relock(&self.entries)
            .remove(&handle.0)
            .ok_or_else(|| at(RegionError::UnknownHandle(handle)))?;
        // Wait out an in-flight decode before the decoder is dropped.
        drop(relock(&entry));
        log::trace!("region handle {handle} released");
        Ok(())
    }

    /// Number of open handles.
    pub fn len(&self) -> usize {
        relock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for HandleTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HandleTable")
            .field("open", &self.len())
            .finish_non_exhaustive()
    }
}
