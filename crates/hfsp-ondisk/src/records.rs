//! Volume header, fork descriptors, and extent records.

use hfsp_types::{
    ensure_slice, read_be_u16, read_be_u32, read_be_u64, ParseError, ATTR_JOURNALED_BIT,
    HFSPLUS_SIGNATURE, HFSX_SIGNATURE, INLINE_EXTENT_COUNT, VOLUME_HEADER_SIZE,
};
use serde::{Deserialize, Serialize};

/// One contiguous run of allocation blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtentDescriptor {
    pub start_block: u32,
    pub block_count: u32,
}

impl ExtentDescriptor {
    pub const SIZE: usize = 8;

    pub fn decode(buf: &[u8], offset: usize) -> Result<Self, ParseError> {
        Ok(Self {
            start_block: read_be_u32(buf, offset)?,
            block_count: read_be_u32(buf, offset + 4)?,
        })
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.start_block.to_be_bytes());
        out.extend_from_slice(&self.block_count.to_be_bytes());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.block_count == 0
    }
}

/// Up to eight extent descriptors continuing a fork; the payload of an
/// extents-overflow leaf record and the inline tail of a fork
/// descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtentRecord {
    pub extents: [ExtentDescriptor; INLINE_EXTENT_COUNT],
}

impl ExtentRecord {
    pub const SIZE: usize = ExtentDescriptor::SIZE * INLINE_EXTENT_COUNT;

    pub fn decode(buf: &[u8], offset: usize) -> Result<Self, ParseError> {
        ensure_slice(buf, offset, Self::SIZE)?;
        let mut extents = [ExtentDescriptor::default(); INLINE_EXTENT_COUNT];
        for (i, ext) in extents.iter_mut().enumerate() {
            *ext = ExtentDescriptor::decode(buf, offset + i * ExtentDescriptor::SIZE)?;
        }
        Ok(Self { extents })
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        for ext in &self.extents {
            ext.encode_into(&mut out);
        }
        out
    }
}

/// On-disk fork descriptor: logical byte length, allocated block count,
/// and the eight inline extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ForkDescriptor {
    pub logical_size: u64,
    pub clump_size: u32,
    pub total_blocks: u32,
    pub extents: [ExtentDescriptor; INLINE_EXTENT_COUNT],
}

impl ForkDescriptor {
    pub const SIZE: usize = 16 + ExtentRecord::SIZE;

    pub fn decode(buf: &[u8], offset: usize) -> Result<Self, ParseError> {
        ensure_slice(buf, offset, Self::SIZE)?;
        Ok(Self {
            logical_size: read_be_u64(buf, offset)?,
            clump_size: read_be_u32(buf, offset + 8)?,
            total_blocks: read_be_u32(buf, offset + 12)?,
            extents: ExtentRecord::decode(buf, offset + 16)?.extents,
        })
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.logical_size.to_be_bytes());
        out.extend_from_slice(&self.clump_size.to_be_bytes());
        out.extend_from_slice(&self.total_blocks.to_be_bytes());
        for ext in &self.extents {
            ext.encode_into(out);
        }
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        self.encode_into(&mut out);
        out
    }
}

/// The 512-byte volume header at absolute offset 1024.
///
/// Immutable once parsed; callers re-read it per logical operation
/// rather than caching.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VolumeHeader {
    pub signature: u16,
    pub version: u16,
    pub attributes: u32,
    pub last_mounted_version: u32,
    pub journal_info_block: u32,
    pub create_date: u32,
    pub modify_date: u32,
    pub backup_date: u32,
    pub checked_date: u32,
    pub file_count: u32,
    pub folder_count: u32,
    pub block_size: u32,
    pub total_blocks: u32,
    pub free_blocks: u32,
    pub next_allocation: u32,
    pub rsrc_clump_size: u32,
    pub data_clump_size: u32,
    pub next_catalog_id: u32,
    pub write_count: u32,
    pub encodings_bitmap: u64,
    pub finder_info: [u32; 8],
    pub allocation_file: ForkDescriptor,
    pub extents_file: ForkDescriptor,
    pub catalog_file: ForkDescriptor,
    pub attributes_file: ForkDescriptor,
    pub startup_file: ForkDescriptor,
}

/// Byte offset of the five fork descriptors inside the header.
const FORKS_OFFSET: usize = 112;

impl VolumeHeader {
    pub const SIZE: usize = VOLUME_HEADER_SIZE;

    /// Decode a volume header. Accepts the HFS+ ("H+") and HFSX ("HX")
    /// signatures; anything else is a signature mismatch.
    pub fn decode(buf: &[u8], offset: usize) -> Result<Self, ParseError> {
        ensure_slice(buf, offset, Self::SIZE)?;

        let signature = read_be_u16(buf, offset)?;
        if signature != HFSPLUS_SIGNATURE && signature != HFSX_SIGNATURE {
            return Err(ParseError::InvalidSignature {
                expected: HFSPLUS_SIGNATURE,
                actual: signature,
            });
        }

        let mut finder_info = [0_u32; 8];
        for (i, word) in finder_info.iter_mut().enumerate() {
            *word = read_be_u32(buf, offset + 80 + i * 4)?;
        }

        Ok(Self {
            signature,
            version: read_be_u16(buf, offset + 2)?,
            attributes: read_be_u32(buf, offset + 4)?,
            last_mounted_version: read_be_u32(buf, offset + 8)?,
            journal_info_block: read_be_u32(buf, offset + 12)?,
            create_date: read_be_u32(buf, offset + 16)?,
            modify_date: read_be_u32(buf, offset + 20)?,
            backup_date: read_be_u32(buf, offset + 24)?,
            checked_date: read_be_u32(buf, offset + 28)?,
            file_count: read_be_u32(buf, offset + 32)?,
            folder_count: read_be_u32(buf, offset + 36)?,
            block_size: read_be_u32(buf, offset + 40)?,
            total_blocks: read_be_u32(buf, offset + 44)?,
            free_blocks: read_be_u32(buf, offset + 48)?,
            next_allocation: read_be_u32(buf, offset + 52)?,
            rsrc_clump_size: read_be_u32(buf, offset + 56)?,
            data_clump_size: read_be_u32(buf, offset + 60)?,
            next_catalog_id: read_be_u32(buf, offset + 64)?,
            write_count: read_be_u32(buf, offset + 68)?,
            encodings_bitmap: read_be_u64(buf, offset + 72)?,
            finder_info,
            allocation_file: ForkDescriptor::decode(buf, offset + FORKS_OFFSET)?,
            extents_file: ForkDescriptor::decode(buf, offset + FORKS_OFFSET + 80)?,
            catalog_file: ForkDescriptor::decode(buf, offset + FORKS_OFFSET + 160)?,
            attributes_file: ForkDescriptor::decode(buf, offset + FORKS_OFFSET + 240)?,
            startup_file: ForkDescriptor::decode(buf, offset + FORKS_OFFSET + 320)?,
        })
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&self.signature.to_be_bytes());
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&self.attributes.to_be_bytes());
        out.extend_from_slice(&self.last_mounted_version.to_be_bytes());
        out.extend_from_slice(&self.journal_info_block.to_be_bytes());
        out.extend_from_slice(&self.create_date.to_be_bytes());
        out.extend_from_slice(&self.modify_date.to_be_bytes());
        out.extend_from_slice(&self.backup_date.to_be_bytes());
        out.extend_from_slice(&self.checked_date.to_be_bytes());
        out.extend_from_slice(&self.file_count.to_be_bytes());
        out.extend_from_slice(&self.folder_count.to_be_bytes());
        out.extend_from_slice(&self.block_size.to_be_bytes());
        out.extend_from_slice(&self.total_blocks.to_be_bytes());
        out.extend_from_slice(&self.free_blocks.to_be_bytes());
        out.extend_from_slice(&self.next_allocation.to_be_bytes());
        out.extend_from_slice(&self.rsrc_clump_size.to_be_bytes());
        out.extend_from_slice(&self.data_clump_size.to_be_bytes());
        out.extend_from_slice(&self.next_catalog_id.to_be_bytes());
        out.extend_from_slice(&self.write_count.to_be_bytes());
        out.extend_from_slice(&self.encodings_bitmap.to_be_bytes());
        for word in &self.finder_info {
            out.extend_from_slice(&word.to_be_bytes());
        }
        self.allocation_file.encode_into(&mut out);
        self.extents_file.encode_into(&mut out);
        self.catalog_file.encode_into(&mut out);
        self.attributes_file.encode_into(&mut out);
        self.startup_file.encode_into(&mut out);
        debug_assert_eq!(out.len(), Self::SIZE);
        out
    }

    #[must_use]
    pub fn is_journaled(&self) -> bool {
        self.attributes & ATTR_JOURNALED_BIT != 0
    }
}
