//! Search keys and their orderings.
//!
//! The generic B-tree engine is order-agnostic: it hands raw key bytes
//! (including the u16 length prefix) to a [`KeyOrdering`] supplied by
//! the caller. The two orderings used by HFS+ volumes live here next to
//! the key codecs they decode.

use hfsp_types::{
    ensure_slice, read_be_u16, read_be_u32, CatalogNodeId, ForkKind, ParseError, MAX_NAME_UNITS,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Length-prefixed UTF-16BE string, at most 255 code units.
///
/// Binary-safe: unpaired surrogates and unusual code units round-trip
/// unchanged; lossy conversion happens only at the `String` boundary.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UniStr {
    units: Vec<u16>,
}

impl UniStr {
    pub fn decode(buf: &[u8], offset: usize) -> Result<Self, ParseError> {
        let len = usize::from(read_be_u16(buf, offset)?);
        if len > MAX_NAME_UNITS {
            return Err(ParseError::InvalidField {
                field: "name_length",
                reason: "exceeds 255 UTF-16 units",
            });
        }
        let mut units = Vec::with_capacity(len);
        for i in 0..len {
            units.push(read_be_u16(buf, offset + 2 + i * 2)?);
        }
        Ok(Self { units })
    }

    pub fn from_str(s: &str) -> Result<Self, ParseError> {
        let units: Vec<u16> = s.encode_utf16().collect();
        if units.len() > MAX_NAME_UNITS {
            return Err(ParseError::InvalidField {
                field: "name_length",
                reason: "exceeds 255 UTF-16 units",
            });
        }
        Ok(Self { units })
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.units.len() as u16).to_be_bytes());
        for unit in &self.units {
            out.extend_from_slice(&unit.to_be_bytes());
        }
    }

    #[must_use]
    pub fn encoded_len(&self) -> usize {
        2 + self.units.len() * 2
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    #[must_use]
    pub fn units(&self) -> &[u16] {
        &self.units
    }

    #[must_use]
    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(&self.units)
    }
}

/// Catalog search key: parent CNID plus name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogKey {
    pub parent: CatalogNodeId,
    pub name: UniStr,
}

impl CatalogKey {
    /// Key length (excluding the length field itself) of a key with an
    /// empty name: parent CNID plus the name's length prefix.
    const MIN_KEY_LENGTH: usize = 6;

    pub fn decode(buf: &[u8], offset: usize) -> Result<Self, ParseError> {
        let key_length = usize::from(read_be_u16(buf, offset)?);
        if key_length < Self::MIN_KEY_LENGTH {
            return Err(ParseError::InvalidField {
                field: "key_length",
                reason: "shorter than parent CNID plus name length",
            });
        }
        let parent = CatalogNodeId(read_be_u32(buf, offset + 2)?);
        let name = UniStr::decode(buf, offset + 6)?;
        if key_length != Self::MIN_KEY_LENGTH + name.len() * 2 {
            return Err(ParseError::InvalidField {
                field: "key_length",
                reason: "inconsistent with name length",
            });
        }
        Ok(Self { parent, name })
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let key_length = (Self::MIN_KEY_LENGTH + self.name.len() * 2) as u16;
        let mut out = Vec::with_capacity(2 + usize::from(key_length));
        out.extend_from_slice(&key_length.to_be_bytes());
        out.extend_from_slice(&self.parent.0.to_be_bytes());
        self.name.encode_into(&mut out);
        out
    }
}

/// Extents-overflow search key: fork type, CNID, starting block offset
/// within the fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtentKey {
    pub kind: ForkKind,
    pub cnid: CatalogNodeId,
    pub start_block: u32,
}

impl ExtentKey {
    /// Fixed key length excluding the length field.
    pub const KEY_LENGTH: u16 = 10;
    /// Full encoded size including the length field.
    pub const SIZE: usize = 12;

    pub fn decode(buf: &[u8], offset: usize) -> Result<Self, ParseError> {
        let bytes = ensure_slice(buf, offset, Self::SIZE)?;
        let key_length = read_be_u16(bytes, 0)?;
        if key_length != Self::KEY_LENGTH {
            return Err(ParseError::InvalidField {
                field: "key_length",
                reason: "extent keys are exactly 10 bytes",
            });
        }
        Ok(Self {
            kind: ForkKind::from_on_disk_byte(bytes[2])?,
            cnid: CatalogNodeId(read_be_u32(bytes, 4)?),
            start_block: read_be_u32(bytes, 8)?,
        })
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&Self::KEY_LENGTH.to_be_bytes());
        out.push(self.kind.on_disk_byte());
        out.push(0); // pad
        out.extend_from_slice(&self.cnid.0.to_be_bytes());
        out.extend_from_slice(&self.start_block.to_be_bytes());
        out
    }
}

/// Three-way comparison over raw key bytes, injected into the B-tree
/// engine by the volume layer.
pub trait KeyOrdering: Send + Sync {
    fn compare(&self, a: &[u8], b: &[u8]) -> Result<Ordering, ParseError>;
}

/// Ordering of the extents-overflow tree: CNID, then fork type, then
/// starting block.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtentKeyOrdering;

impl KeyOrdering for ExtentKeyOrdering {
    fn compare(&self, a: &[u8], b: &[u8]) -> Result<Ordering, ParseError> {
        let a = ExtentKey::decode(a, 0)?;
        let b = ExtentKey::decode(b, 0)?;
        Ok(a.cnid
            .cmp(&b.cnid)
            .then(a.kind.on_disk_byte().cmp(&b.kind.on_disk_byte()))
            .then(a.start_block.cmp(&b.start_block)))
    }
}

/// Ordering of the catalog tree: parent CNID first, then name.
///
/// HFS+ folds case per code unit (ASCII and Latin-1 uppercase ranges);
/// HFSX compares code units exactly.
#[derive(Debug, Clone, Copy)]
pub struct CatalogKeyOrdering {
    pub case_sensitive: bool,
}

fn fold_unit(unit: u16) -> u16 {
    match unit {
        0x0041..=0x005A => unit + 0x20,
        // Latin-1 uppercase, excluding the multiplication sign.
        0x00C0..=0x00DE if unit != 0x00D7 => unit + 0x20,
        _ => unit,
    }
}

impl KeyOrdering for CatalogKeyOrdering {
    fn compare(&self, a: &[u8], b: &[u8]) -> Result<Ordering, ParseError> {
        let a = CatalogKey::decode(a, 0)?;
        let b = CatalogKey::decode(b, 0)?;

        let by_parent = a.parent.cmp(&b.parent);
        if by_parent != Ordering::Equal {
            return Ok(by_parent);
        }

        if self.case_sensitive {
            Ok(a.name.units().cmp(b.name.units()))
        } else {
            let folded_a = a.name.units().iter().copied().map(fold_unit);
            let folded_b = b.name.units().iter().copied().map(fold_unit);
            Ok(folded_a.cmp(folded_b))
        }
    }
}
