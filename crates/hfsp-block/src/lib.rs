#![forbid(unsafe_code)]
//! Byte-addressed device layer.
//!
//! The driver performs synchronous positioned reads against a
//! random-access byte source (disk image file, device, in-memory
//! buffer). Every read takes an explicit absolute offset; no device
//! here carries a mutable cursor, so concurrent reads are safe to
//! interleave. Sources that only offer `Read + Seek` are wrapped so
//! that seek-then-read happens atomically under one lock.

use hfsp_error::{HfsError, Result};
use hfsp_types::{VOLUME_HEADER_OFFSET, VOLUME_HEADER_SIZE};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;

/// Byte-addressed source for fixed-offset reads (pread semantics).
///
/// `read_at` reads up to `buf.len()` bytes, short-reading at end of
/// device; it never fails merely because the window extends past the
/// end. `read_exact_at` is for callers that require the full length.
pub trait ByteDevice: Send + Sync {
    /// Total length in bytes.
    fn len_bytes(&self) -> u64;

    /// Read up to `buf.len()` bytes from `offset` into `buf`, returning
    /// the number of bytes read. Reads entirely past the end return 0.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Read exactly `buf.len()` bytes from `offset`.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let got = self.read_at(offset, buf)?;
        if got != buf.len() {
            return Err(HfsError::ShortRead {
                offset,
                wanted: buf.len(),
                got,
            });
        }
        Ok(())
    }
}

impl<D: ByteDevice + ?Sized> ByteDevice for Arc<D> {
    fn len_bytes(&self) -> u64 {
        (**self).len_bytes()
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        (**self).read_at(offset, buf)
    }
}

/// File-backed device using `pread`-style I/O.
///
/// `std::os::unix::fs::FileExt` is thread-safe and does not touch the
/// file's shared seek position.
#[derive(Debug, Clone)]
pub struct FileByteDevice {
    file: Arc<File>,
    len: u64,
}

impl FileByteDevice {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Arc::new(file),
            len,
        })
    }
}

impl ByteDevice for FileByteDevice {
    fn len_bytes(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset >= self.len {
            return Ok(0);
        }
        let avail = usize::try_from(self.len - offset).unwrap_or(usize::MAX);
        let want = buf.len().min(avail);
        let mut done = 0;
        while done < want {
            let got = self.file.read_at(&mut buf[done..want], offset + done as u64)?;
            if got == 0 {
                break;
            }
            done += got;
        }
        Ok(done)
    }
}

/// Adapter for sources that only expose a seekable stream.
///
/// Positioned reads are serialized behind one lock so that the
/// seek-then-read pair is atomic per call; the wrapped stream's cursor
/// is never observable between calls.
#[derive(Debug)]
pub struct SeekByteDevice<R> {
    inner: Mutex<R>,
    len: u64,
}

impl<R: Read + Seek> SeekByteDevice<R> {
    pub fn new(mut source: R) -> Result<Self> {
        let len = source.seek(SeekFrom::End(0))?;
        Ok(Self {
            inner: Mutex::new(source),
            len,
        })
    }
}

impl<R: Read + Seek + Send> ByteDevice for SeekByteDevice<R> {
    fn len_bytes(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset >= self.len {
            return Ok(0);
        }
        let avail = usize::try_from(self.len - offset).unwrap_or(usize::MAX);
        let want = buf.len().min(avail);

        let mut inner = self.inner.lock();
        inner.seek(SeekFrom::Start(offset))?;
        let mut done = 0;
        while done < want {
            let got = inner.read(&mut buf[done..want])?;
            if got == 0 {
                break;
            }
            done += got;
        }
        Ok(done)
    }
}

/// In-memory device over an owned buffer.
///
/// Used by the test suites to assemble synthetic volumes, and by tools
/// that already hold a whole image in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryByteDevice {
    bytes: Vec<u8>,
}

impl MemoryByteDevice {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl ByteDevice for MemoryByteDevice {
    fn len_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let Ok(offset) = usize::try_from(offset) else {
            return Ok(0);
        };
        if offset >= self.bytes.len() {
            return Ok(0);
        }
        let want = buf.len().min(self.bytes.len() - offset);
        buf[..want].copy_from_slice(&self.bytes[offset..offset + want]);
        Ok(want)
    }
}

/// Read the fixed 512-byte volume header region at offset 1024.
pub fn read_volume_header_region(dev: &dyn ByteDevice) -> Result<[u8; VOLUME_HEADER_SIZE]> {
    let mut region = [0_u8; VOLUME_HEADER_SIZE];
    dev.read_exact_at(VOLUME_HEADER_OFFSET, &mut region)?;
    Ok(region)
}
