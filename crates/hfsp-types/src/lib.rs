#![forbid(unsafe_code)]
//! Core newtypes, on-disk constants, and parse primitives for the HFS+
//! driver.
//!
//! Everything on an HFS+ volume is big-endian; the `read_be_*` helpers
//! here are the only sanctioned way to pull integers out of raw node and
//! header buffers.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Absolute byte offset of the volume header from the volume start.
pub const VOLUME_HEADER_OFFSET: u64 = 1024;
/// Fixed size of the on-disk volume header.
pub const VOLUME_HEADER_SIZE: usize = 512;

/// Volume header signature for HFS+ ("H+").
pub const HFSPLUS_SIGNATURE: u16 = 0x482B;
/// Volume header signature for HFSX ("HX", case-sensitive names).
pub const HFSX_SIGNATURE: u16 = 0x4858;
/// Master directory block signature for classic HFS ("BD").
pub const HFS_SIGNATURE: u16 = 0x4244;

/// Volume attribute bit: the volume has a journal.
pub const ATTR_JOURNALED_BIT: u32 = 1 << 13;

/// Number of extent descriptors stored inline in a fork descriptor (and
/// in one extents-overflow record).
pub const INLINE_EXTENT_COUNT: usize = 8;

/// Maximum length of a catalog name in UTF-16 code units.
pub const MAX_NAME_UNITS: usize = 255;

/// Catalog Node ID: the unique identifier of a filesystem object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct CatalogNodeId(pub u32);

impl CatalogNodeId {
    pub const ROOT_PARENT: Self = Self(1);
    pub const ROOT_FOLDER: Self = Self(2);
    pub const EXTENTS_FILE: Self = Self(3);
    pub const CATALOG_FILE: Self = Self(4);
    pub const BAD_BLOCKS_FILE: Self = Self(5);
    pub const ALLOCATION_FILE: Self = Self(6);
    pub const STARTUP_FILE: Self = Self(7);
    pub const ATTRIBUTES_FILE: Self = Self(8);
    pub const REPAIR_CATALOG_FILE: Self = Self(14);
    pub const BOGUS_EXTENT_FILE: Self = Self(15);
    /// First CNID available for ordinary user objects.
    pub const FIRST_USER_ID: Self = Self(16);
}

impl fmt::Display for CatalogNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Format-defined reserved catalog node IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservedId {
    RootParent,
    RootFolder,
    ExtentsFile,
    CatalogFile,
    BadBlocksFile,
    AllocationFile,
    StartupFile,
    AttributesFile,
    RepairCatalogFile,
    BogusExtentFile,
}

impl ReservedId {
    /// The concrete CNID assigned to this reserved object.
    #[must_use]
    pub fn cnid(self) -> CatalogNodeId {
        match self {
            Self::RootParent => CatalogNodeId::ROOT_PARENT,
            Self::RootFolder => CatalogNodeId::ROOT_FOLDER,
            Self::ExtentsFile => CatalogNodeId::EXTENTS_FILE,
            Self::CatalogFile => CatalogNodeId::CATALOG_FILE,
            Self::BadBlocksFile => CatalogNodeId::BAD_BLOCKS_FILE,
            Self::AllocationFile => CatalogNodeId::ALLOCATION_FILE,
            Self::StartupFile => CatalogNodeId::STARTUP_FILE,
            Self::AttributesFile => CatalogNodeId::ATTRIBUTES_FILE,
            Self::RepairCatalogFile => CatalogNodeId::REPAIR_CATALOG_FILE,
            Self::BogusExtentFile => CatalogNodeId::BOGUS_EXTENT_FILE,
        }
    }
}

/// Which of a file's two byte streams an operation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForkKind {
    Data,
    Resource,
}

impl ForkKind {
    /// On-disk fork-type byte used in extent keys.
    #[must_use]
    pub fn on_disk_byte(self) -> u8 {
        match self {
            Self::Data => 0x00,
            Self::Resource => 0xFF,
        }
    }

    /// Decode the extent-key fork-type byte.
    pub fn from_on_disk_byte(byte: u8) -> Result<Self, ParseError> {
        match byte {
            0x00 => Ok(Self::Data),
            0xFF => Ok(Self::Resource),
            _ => Err(ParseError::InvalidField {
                field: "fork_type",
                reason: "must be 0x00 (data) or 0xFF (resource)",
            }),
        }
    }
}

/// B-tree node number within one B-tree file.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validated allocation block size (power of two, at least one sector).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllocBlockSize(u32);

impl AllocBlockSize {
    /// Create an `AllocBlockSize` if `value` is a power of two >= 512.
    pub fn new(value: u32) -> Result<Self, ParseError> {
        if !value.is_power_of_two() || value < 512 {
            return Err(ParseError::InvalidField {
                field: "block_size",
                reason: "must be a power of two >= 512",
            });
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }

    /// Byte length of `blocks` allocation blocks.
    #[must_use]
    pub fn bytes_for_blocks(self, blocks: u32) -> u64 {
        u64::from(blocks) * u64::from(self.0)
    }

    /// Absolute byte offset of the start of `block`.
    #[must_use]
    pub fn block_to_byte(self, block: u32) -> u64 {
        u64::from(block) * u64::from(self.0)
    }
}

impl fmt::Display for AllocBlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors raised while decoding fixed-layout on-disk structures.
///
/// Decoding never guesses: a buffer that is too short, a signature that
/// does not match its constant, or a length field that exceeds its
/// capacity all fail here. Merely unusual field values (zero-length
/// extents, empty names) decode fine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("insufficient data: need {needed} bytes at offset {offset}, got {actual}")]
    InsufficientData {
        needed: usize,
        offset: usize,
        actual: usize,
    },
    #[error("invalid signature: expected {expected:#06x}, got {actual:#06x}")]
    InvalidSignature { expected: u16, actual: u16 },
    #[error("invalid field: {field} ({reason})")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("integer conversion failed: {field}")]
    IntegerConversion { field: &'static str },
}

/// Borrow `len` bytes at `offset`, failing rather than reading out of
/// bounds.
#[inline]
pub fn ensure_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], ParseError> {
    let Some(end) = offset.checked_add(len) else {
        return Err(ParseError::InvalidField {
            field: "offset",
            reason: "overflow",
        });
    };

    if end > data.len() {
        return Err(ParseError::InsufficientData {
            needed: len,
            offset,
            actual: data.len().saturating_sub(offset),
        });
    }

    Ok(&data[offset..end])
}

#[inline]
pub fn read_be_u16(data: &[u8], offset: usize) -> Result<u16, ParseError> {
    let bytes = ensure_slice(data, offset, 2)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

#[inline]
pub fn read_be_u32(data: &[u8], offset: usize) -> Result<u32, ParseError> {
    let bytes = ensure_slice(data, offset, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
pub fn read_be_u64(data: &[u8], offset: usize) -> Result<u64, ParseError> {
    let bytes = ensure_slice(data, offset, 8)?;
    Ok(u64::from_be_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]))
}

#[inline]
pub fn read_fixed<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], ParseError> {
    let bytes = ensure_slice(data, offset, N)?;
    let mut out = [0_u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}
