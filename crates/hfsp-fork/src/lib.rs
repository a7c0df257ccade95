#![forbid(unsafe_code)]
//! Extent resolution and fork streams.
//!
//! A fork's first eight extents live inline in its [`ForkDescriptor`];
//! anything beyond that is chained through the extents-overflow B-tree,
//! keyed by `(cnid, fork kind, starting fork block)`. [`resolve_extents`]
//! stitches the full run list together, and [`ForkStream`] exposes it
//! as a flat byte range over the underlying device.
//!
//! The overflow tree is itself reached through a fork stream built from
//! inline extents alone (its location is pinned in the volume header,
//! so it never needs overflow records for itself). [`NoOverflow`]
//! serves that bootstrap step.

use hfsp_block::ByteDevice;
use hfsp_error::{HfsError, Result};
use hfsp_ondisk::{ExtentDescriptor, ExtentRecord, ForkDescriptor};
use hfsp_types::{AllocBlockSize, CatalogNodeId, ForkKind};
use std::fmt;
use tracing::{debug, trace};

/// Source of extents-overflow records for a fork.
///
/// Implemented over the extents-overflow B-tree once it is open;
/// [`NoOverflow`] covers forks that must not need it.
pub trait OverflowSource {
    /// The overflow record keyed exactly at `start_block`, or `None`.
    fn overflow_record(
        &self,
        cnid: CatalogNodeId,
        kind: ForkKind,
        start_block: u32,
    ) -> Result<Option<ExtentRecord>>;
}

/// Overflow source for forks whose extents are fully inline.
pub struct NoOverflow;

impl OverflowSource for NoOverflow {
    fn overflow_record(
        &self,
        _cnid: CatalogNodeId,
        _kind: ForkKind,
        _start_block: u32,
    ) -> Result<Option<ExtentRecord>> {
        Ok(None)
    }
}

/// Resolve the complete extent list for a fork: inline extents first,
/// then overflow records chained by cumulative block position until
/// `total_blocks` is covered.
pub fn resolve_extents(
    fork: &ForkDescriptor,
    cnid: CatalogNodeId,
    kind: ForkKind,
    overflow: &dyn OverflowSource,
) -> Result<Vec<ExtentDescriptor>> {
    let mut extents = Vec::new();
    let mut covered: u32 = 0;

    for extent in &fork.extents {
        if extent.is_empty() || covered >= fork.total_blocks {
            break;
        }
        covered = covered.saturating_add(extent.block_count);
        extents.push(*extent);
    }

    while covered < fork.total_blocks {
        let Some(record) = overflow.overflow_record(cnid, kind, covered)? else {
            return Err(HfsError::TruncatedFork {
                cnid: cnid.0,
                missing_blocks: fork.total_blocks - covered,
            });
        };
        trace!(cnid = cnid.0, start_block = covered, "overflow record found");

        let before = covered;
        for extent in &record.extents {
            if extent.is_empty() || covered >= fork.total_blocks {
                break;
            }
            covered = covered.saturating_add(extent.block_count);
            extents.push(*extent);
        }
        if covered == before {
            // An empty record can never advance the chain.
            return Err(HfsError::TruncatedFork {
                cnid: cnid.0,
                missing_blocks: fork.total_blocks - covered,
            });
        }
    }

    debug!(
        cnid = cnid.0,
        total_blocks = fork.total_blocks,
        extents = extents.len(),
        "resolved fork extents"
    );
    Ok(extents)
}

/// A fork presented as a flat, read-only byte range.
///
/// Offsets are logical fork positions; each read walks the extent list
/// and issues one device read per contiguous run it crosses. Reads are
/// clamped to the logical length, which excludes allocation slack past
/// the end of file.
pub struct ForkStream<D> {
    device: D,
    block_size: AllocBlockSize,
    extents: Vec<ExtentDescriptor>,
    logical_len: u64,
    cnid: CatalogNodeId,
}

impl<D: ByteDevice> ForkStream<D> {
    /// Build a stream over an already-resolved extent list.
    ///
    /// Fails with `TruncatedFork` if the extents allocate fewer bytes
    /// than `logical_len` claims, so reads can never run off the list.
    pub fn new(
        device: D,
        block_size: AllocBlockSize,
        extents: Vec<ExtentDescriptor>,
        logical_len: u64,
        cnid: CatalogNodeId,
    ) -> Result<Self> {
        let allocated: u64 = extents
            .iter()
            .map(|e| block_size.bytes_for_blocks(e.block_count))
            .sum();
        if logical_len > allocated {
            let shortfall = logical_len - allocated;
            let bs = u64::from(block_size.get());
            return Err(HfsError::TruncatedFork {
                cnid: cnid.0,
                missing_blocks: u32::try_from(shortfall.div_ceil(bs)).unwrap_or(u32::MAX),
            });
        }
        Ok(Self {
            device,
            block_size,
            extents,
            logical_len,
            cnid,
        })
    }

    /// Resolve a fork descriptor and build its stream in one step.
    pub fn open(
        device: D,
        block_size: AllocBlockSize,
        fork: &ForkDescriptor,
        cnid: CatalogNodeId,
        kind: ForkKind,
        overflow: &dyn OverflowSource,
    ) -> Result<Self> {
        let extents = resolve_extents(fork, cnid, kind, overflow)?;
        Self::new(device, block_size, extents, fork.logical_size, cnid)
    }

    /// Logical length in bytes (end of file, not end of allocation).
    #[must_use]
    pub fn len(&self) -> u64 {
        self.logical_len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.logical_len == 0
    }

    /// The resolved extent list backing this stream.
    #[must_use]
    pub fn extents(&self) -> &[ExtentDescriptor] {
        &self.extents
    }

    /// Device offset and remaining run length for logical position
    /// `pos`. Construction guarantees every position below
    /// `logical_len` maps.
    fn map(&self, pos: u64) -> Result<(u64, u64)> {
        let bs = u64::from(self.block_size.get());
        let mut block = pos / bs;
        let within = pos % bs;
        for extent in &self.extents {
            let count = u64::from(extent.block_count);
            if block < count {
                let device_at = (u64::from(extent.start_block) + block) * bs + within;
                let run_left = (count - block) * bs - within;
                return Ok((device_at, run_left));
            }
            block -= count;
        }
        Err(HfsError::TruncatedFork {
            cnid: self.cnid.0,
            missing_blocks: u32::try_from(block + 1).unwrap_or(u32::MAX),
        })
    }

    /// Read from logical offset `offset`, clamped to the logical
    /// length. Returns the bytes read; zero past end of fork.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset >= self.logical_len || buf.is_empty() {
            return Ok(0);
        }
        let want = usize::try_from((self.logical_len - offset).min(buf.len() as u64))
            .unwrap_or(buf.len());

        let mut done = 0;
        while done < want {
            let pos = offset + done as u64;
            let (device_at, run_left) = self.map(pos)?;
            let chunk = usize::try_from(run_left.min((want - done) as u64)).unwrap_or(want - done);
            self.device
                .read_exact_at(device_at, &mut buf[done..done + chunk])?;
            done += chunk;
        }
        Ok(want)
    }

    /// Read the entire fork into memory.
    pub fn read_to_vec(&self) -> Result<Vec<u8>> {
        let len = usize::try_from(self.logical_len).map_err(|_| HfsError::MalformedRecord(
            format!("fork of CNID {} too large for memory", self.cnid.0),
        ))?;
        let mut out = vec![0_u8; len];
        self.read_at(0, &mut out)?;
        Ok(out)
    }
}

// Manual impl: the device itself need not be Debug (trait-object
// handles in particular are not).
impl<D> fmt::Debug for ForkStream<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForkStream")
            .field("cnid", &self.cnid)
            .field("logical_len", &self.logical_len)
            .field("block_size", &self.block_size.get())
            .field("extents", &self.extents.len())
            .finish_non_exhaustive()
    }
}

// A fork stream is itself a byte device, so the catalog and extents
// B-trees can run directly over their special-file forks.
impl<D: ByteDevice> ByteDevice for ForkStream<D> {
    fn len_bytes(&self) -> u64 {
        self.logical_len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        ForkStream::read_at(self, offset, buf)
    }
}
