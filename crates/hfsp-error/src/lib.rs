#![forbid(unsafe_code)]
//! Error types for the HFS+ driver.
//!
//! Two-layer model: `ParseError` (in `hfsp-types`) covers on-disk format
//! violations detected while decoding fixed-layout structures; `HfsError`
//! (this crate) is the user-facing taxonomy returned by the B-tree
//! engine, fork streams, and the volume facade.
//!
//! Propagation policy:
//!
//! - `InvalidVolume` is fatal at construction; nothing else on the image
//!   can be safely interpreted after a signature mismatch.
//! - `MalformedRecord` and `CorruptTree` abort the traversal that
//!   produced them but are recoverable by the caller (typically surfaced
//!   as "object is unreadable" rather than a process abort).
//! - `TruncatedFork` fails only the affected fork stream.
//! - "Not found" is never an error: lookups return `Option`.
//! - No operation substitutes default data for corrupt input.

use hfsp_types::ParseError;
use thiserror::Error;

/// Unified error type for all driver operations.
#[derive(Debug, Error)]
pub enum HfsError {
    /// Operating system I/O error from the underlying byte source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Volume header signature mismatch. Fatal at construction.
    #[error("invalid volume header signature: expected {expected:#06x}, got {actual:#06x}")]
    InvalidVolume { expected: u16, actual: u16 },

    /// A decoded structure's internal length or count field is
    /// inconsistent with the buffer it was read from.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// Structural inconsistency in B-tree linkage or node kind/height.
    #[error("corrupt B-tree at node {node}: {detail}")]
    CorruptTree { node: u32, detail: String },

    /// The volume claims more allocation blocks for a fork than any
    /// extent record describes.
    #[error("truncated fork for CNID {cnid}: {missing_blocks} allocation blocks unaccounted for")]
    TruncatedFork { cnid: u32, missing_blocks: u32 },

    /// A positioned read of known length came back short.
    #[error("short read at offset {offset}: wanted {wanted} bytes, got {got}")]
    ShortRead {
        offset: u64,
        wanted: usize,
        got: usize,
    },

    /// The requested catalog node exists but is not a file.
    #[error("catalog node {0} is not a file")]
    NotAFile(u32),

    /// A format feature this driver deliberately does not implement.
    #[error("not supported: {0}")]
    NotSupported(&'static str),
}

impl From<ParseError> for HfsError {
    fn from(err: ParseError) -> Self {
        HfsError::MalformedRecord(err.to_string())
    }
}

/// Result alias using `HfsError`.
pub type Result<T> = std::result::Result<T, HfsError>;
