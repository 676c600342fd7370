//! Seekable source streams and the adapters that produce them.
//!
//! Every source medium ends up as a [`SourceStream`]: in-memory bytes and
//! generic readers are copied, packaged assets are copied with a length
//! check, and file descriptors are read positionally so the caller's file
//! offset never moves.

use std::io::{self, Cursor, Read, Seek, SeekFrom};

use whereat::at;

use crate::error::{RegionError, Result};

trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// A seekable, owned byte stream a region decoder reads from.
///
/// Once a decoder has built its index it owns the stream; dropping the
/// decoder drops the stream and whatever it wraps.
pub struct SourceStream {
    inner: Box<dyn ReadSeek>,
    len: u64,
}

impl SourceStream {
    /// Wrap any seekable reader. The length is taken by seeking to the end,
    /// then the reader is rewound.
    pub fn new<R>(mut reader: R) -> Result<Self>
    where
        R: Read + Seek + Send + 'static,
    {
        let len = reader
            .seek(SeekFrom::End(0))
            .and_then(|len| reader.rewind().map(|()| len))
            .map_err(|e| at(RegionError::SourceUnreadable(e)))?;
        Ok(Self {
            inner: Box::new(reader),
            len,
        })
    }

    /// Copy `bytes` into an in-memory stream.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from_vec(bytes.to_vec())
    }

    /// Take ownership of an in-memory buffer.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let len = bytes.len() as u64;
        Self {
            inner: Box::new(Cursor::new(bytes)),
            len,
        }
    }

    /// Drain a non-seekable reader into memory.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| at(RegionError::SourceUnreadable(e)))?;
        Ok(Self::from_vec(bytes))
    }

    /// Copy a packaged asset into memory.
    ///
    /// Fails if the asset yields fewer bytes than its declared length.
    pub fn from_asset<A: Asset + ?Sized>(asset: &mut A) -> Result<Self> {
        let declared = asset.length();
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(declared as usize)
            .map_err(|_| {
                at(RegionError::OutOfMemory {
                    requested: declared as usize,
                })
            })?;
        Read::take(&mut *asset, declared)
            .read_to_end(&mut bytes)
            .map_err(|e| at(RegionError::SourceUnreadable(e)))?;
        if (bytes.len() as u64) < declared {
            return Err(at(RegionError::SourceUnreadable(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("short asset read: {} of {declared} bytes", bytes.len()),
            ))));
        }
        Ok(Self::from_vec(bytes))
    }

    /// Read from a file descriptor without disturbing its offset.
    ///
    /// The descriptor is duplicated, so the caller keeps ownership of the
    /// original. A descriptor that cannot be duplicated or stat'ed is
    /// reported as broken.
    #[cfg(unix)]
    pub fn from_fd<F: std::os::fd::AsFd>(fd: F) -> Result<Self> {
        let broken = |e: io::Error| {
            at(RegionError::SourceUnreadable(io::Error::new(
                e.kind(),
                format!("broken file descriptor: {e}"),
            )))
        };
        let owned = fd.as_fd().try_clone_to_owned().map_err(broken)?;
        let file = std::fs::File::from(owned);
        let len = file.metadata().map_err(broken)?.len();
        Ok(Self {
            inner: Box::new(FileSource { file, pos: 0, len }),
            len,
        })
    }

    /// Total stream length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read exactly `buf.len()` bytes starting at `offset`.
    pub(crate) fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.read_exact(buf)
    }
}

impl Read for SourceStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for SourceStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl core::fmt::Debug for SourceStream {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SourceStream")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// A packaged resource with a known length, such as a file bundled into an
/// application archive.
pub trait Asset: Read {
    /// Declared length in bytes.
    fn length(&self) -> u64;
}

/// Positional reader over a duplicated descriptor.
///
/// `dup` shares the file offset with the original, so plain `read` would
/// move the caller's position; `read_at` does not.
#[cfg(unix)]
struct FileSource {
    file: std::fs::File,
    pos: u64,
    len: u64,
}

#[cfg(unix)]
impl Read for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use std::os::unix::fs::FileExt;
        let n = self.file.read_at(buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

#[cfg(unix)]
impl Seek for FileSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(off) => Some(off),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of file")
        })?;
        self.pos = target;
        Ok(target)
    }
}
