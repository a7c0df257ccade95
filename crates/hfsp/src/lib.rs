#![forbid(unsafe_code)]
//! Read-only HFS+ filesystem driver.
//!
//! Umbrella crate: re-exports the volume facade plus the pieces
//! downstream tools need to drive it (byte devices, catalog records,
//! errors). The member crates remain usable on their own.

pub use hfsp_block::{ByteDevice, FileByteDevice, MemoryByteDevice, SeekByteDevice};
pub use hfsp_error::{HfsError, Result};
pub use hfsp_fork::{ForkStream, OverflowSource};
pub use hfsp_ondisk::{
    CatalogFile, CatalogFolder, CatalogRecord, CatalogThread, ExtentDescriptor, ForkDescriptor,
    UniStr, VolumeHeader,
};
pub use hfsp_types::{AllocBlockSize, CatalogNodeId, ForkKind, ReservedId};
pub use hfsp_volume::{DirEntry, Volume, VolumeDevice, VolumeFormat};

pub use hfsp_btree as btree;
pub use hfsp_ondisk as ondisk;
pub use hfsp_types as types;
