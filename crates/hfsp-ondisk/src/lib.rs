#![forbid(unsafe_code)]
//! Binary record codecs for the HFS+ on-disk format.
//!
//! Stateless decoders/encoders for every fixed-layout structure the
//! volume layer touches: the volume header, fork and extent records,
//! B-tree node descriptors and header records, catalog and extent keys,
//! and catalog leaf records. Decoding reads only the given buffer, never
//! seeks elsewhere, and fails only on short buffers, signature
//! mismatches, or length fields that exceed their capacity.

mod catalog;
mod keys;
mod node;
mod records;

pub use catalog::{CatalogFile, CatalogFolder, CatalogRecord, CatalogThread};
pub use keys::{CatalogKey, CatalogKeyOrdering, ExtentKey, ExtentKeyOrdering, KeyOrdering, UniStr};
pub use node::{
    build_node, record_range, HeaderRecord, NodeDescriptor, NodeKind, ATTR_BIG_KEYS,
    ATTR_VARIABLE_INDEX_KEYS,
};
pub use records::{ExtentDescriptor, ExtentRecord, ForkDescriptor, VolumeHeader};
