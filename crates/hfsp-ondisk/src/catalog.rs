//! Catalog leaf record payloads.
//!
//! A catalog leaf record is a folder record, a file record, or one of
//! the two thread record kinds. Thread records map a CNID back to its
//! parent and name; they are keyed by `(cnid, empty name)`.

use crate::keys::UniStr;
use crate::records::ForkDescriptor;
use hfsp_types::{ensure_slice, read_be_u16, read_be_u32, CatalogNodeId, ForkKind, ParseError};
use serde::{Deserialize, Serialize};

const RECORD_TYPE_FOLDER: u16 = 1;
const RECORD_TYPE_FILE: u16 = 2;
const RECORD_TYPE_FOLDER_THREAD: u16 = 3;
const RECORD_TYPE_FILE_THREAD: u16 = 4;

/// Folder record: CNID plus metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CatalogFolder {
    pub flags: u16,
    pub valence: u32,
    pub id: CatalogNodeId,
    pub create_date: u32,
    pub modify_date: u32,
}

impl CatalogFolder {
    /// Full on-disk size of a folder record.
    pub const SIZE: usize = 88;

    fn decode(buf: &[u8], offset: usize) -> Result<Self, ParseError> {
        ensure_slice(buf, offset, Self::SIZE)?;
        Ok(Self {
            flags: read_be_u16(buf, offset + 2)?,
            valence: read_be_u32(buf, offset + 4)?,
            id: CatalogNodeId(read_be_u32(buf, offset + 8)?),
            create_date: read_be_u32(buf, offset + 12)?,
            modify_date: read_be_u32(buf, offset + 16)?,
        })
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0_u8; Self::SIZE];
        out[0..2].copy_from_slice(&RECORD_TYPE_FOLDER.to_be_bytes());
        out[2..4].copy_from_slice(&self.flags.to_be_bytes());
        out[4..8].copy_from_slice(&self.valence.to_be_bytes());
        out[8..12].copy_from_slice(&self.id.0.to_be_bytes());
        out[12..16].copy_from_slice(&self.create_date.to_be_bytes());
        out[16..20].copy_from_slice(&self.modify_date.to_be_bytes());
        out
    }
}

/// File record: CNID, metadata, and the data and resource fork
/// descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    pub flags: u16,
    pub id: CatalogNodeId,
    pub create_date: u32,
    pub modify_date: u32,
    pub data_fork: ForkDescriptor,
    pub resource_fork: ForkDescriptor,
}

impl CatalogFile {
    /// Full on-disk size of a file record.
    pub const SIZE: usize = 248;
    const DATA_FORK_OFFSET: usize = 88;
    const RESOURCE_FORK_OFFSET: usize = 168;

    fn decode(buf: &[u8], offset: usize) -> Result<Self, ParseError> {
        ensure_slice(buf, offset, Self::SIZE)?;
        Ok(Self {
            flags: read_be_u16(buf, offset + 2)?,
            id: CatalogNodeId(read_be_u32(buf, offset + 8)?),
            create_date: read_be_u32(buf, offset + 12)?,
            modify_date: read_be_u32(buf, offset + 16)?,
            data_fork: ForkDescriptor::decode(buf, offset + Self::DATA_FORK_OFFSET)?,
            resource_fork: ForkDescriptor::decode(buf, offset + Self::RESOURCE_FORK_OFFSET)?,
        })
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0_u8; Self::DATA_FORK_OFFSET];
        out[0..2].copy_from_slice(&RECORD_TYPE_FILE.to_be_bytes());
        out[2..4].copy_from_slice(&self.flags.to_be_bytes());
        out[8..12].copy_from_slice(&self.id.0.to_be_bytes());
        out[12..16].copy_from_slice(&self.create_date.to_be_bytes());
        out[16..20].copy_from_slice(&self.modify_date.to_be_bytes());
        self.data_fork.encode_into(&mut out);
        self.resource_fork.encode_into(&mut out);
        debug_assert_eq!(out.len(), Self::SIZE);
        out
    }

    /// The requested fork's descriptor.
    #[must_use]
    pub fn fork(&self, kind: ForkKind) -> &ForkDescriptor {
        match kind {
            ForkKind::Data => &self.data_fork,
            ForkKind::Resource => &self.resource_fork,
        }
    }
}

/// Thread record: maps a CNID back to its parent and name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogThread {
    pub is_folder: bool,
    pub parent: CatalogNodeId,
    pub name: UniStr,
}

impl CatalogThread {
    fn decode(buf: &[u8], offset: usize, is_folder: bool) -> Result<Self, ParseError> {
        Ok(Self {
            is_folder,
            parent: CatalogNodeId(read_be_u32(buf, offset + 4)?),
            name: UniStr::decode(buf, offset + 8)?,
        })
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let record_type = if self.is_folder {
            RECORD_TYPE_FOLDER_THREAD
        } else {
            RECORD_TYPE_FILE_THREAD
        };
        let mut out = Vec::with_capacity(8 + self.name.encoded_len());
        out.extend_from_slice(&record_type.to_be_bytes());
        out.extend_from_slice(&0_u16.to_be_bytes()); // reserved
        out.extend_from_slice(&self.parent.0.to_be_bytes());
        self.name.encode_into(&mut out);
        out
    }
}

/// A decoded catalog leaf record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogRecord {
    Folder(CatalogFolder),
    File(CatalogFile),
    Thread(CatalogThread),
}

impl CatalogRecord {
    pub fn decode(buf: &[u8], offset: usize) -> Result<Self, ParseError> {
        let record_type = read_be_u16(buf, offset)?;
        match record_type {
            RECORD_TYPE_FOLDER => Ok(Self::Folder(CatalogFolder::decode(buf, offset)?)),
            RECORD_TYPE_FILE => Ok(Self::File(CatalogFile::decode(buf, offset)?)),
            RECORD_TYPE_FOLDER_THREAD => Ok(Self::Thread(CatalogThread::decode(buf, offset, true)?)),
            RECORD_TYPE_FILE_THREAD => Ok(Self::Thread(CatalogThread::decode(buf, offset, false)?)),
            _ => Err(ParseError::InvalidField {
                field: "record_type",
                reason: "unknown catalog record type",
            }),
        }
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Folder(rec) => rec.encode(),
            Self::File(rec) => rec.encode(),
            Self::Thread(rec) => rec.encode(),
        }
    }

    /// The CNID of the object this record describes, if it has one of
    /// its own (thread records describe a mapping, not an object).
    #[must_use]
    pub fn cnid(&self) -> Option<CatalogNodeId> {
        match self {
            Self::Folder(rec) => Some(rec.id),
            Self::File(rec) => Some(rec.id),
            Self::Thread(_) => None,
        }
    }
}
