//! Volume format variants and the capability surface they supply.
//!
//! All format-dependent behavior (name comparison, key construction)
//! funnels through [`VolumeFormat`]; the B-tree engine and extent
//! resolver never branch on format themselves.

use hfsp_error::{HfsError, Result};
use hfsp_ondisk::{CatalogKey, CatalogKeyOrdering, ExtentKey, ExtentKeyOrdering, KeyOrdering, UniStr};
use hfsp_types::{
    CatalogNodeId, ForkKind, ReservedId, HFSPLUS_SIGNATURE, HFSX_SIGNATURE, HFS_SIGNATURE,
};
use std::sync::Arc;

/// The closed set of volume formats this driver recognizes.
///
/// Classic HFS is recognized by signature so it can be reported as
/// unsupported rather than invalid; only the HFS+ family is readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeFormat {
    Hfs,
    HfsPlus,
    HfsX,
}

impl VolumeFormat {
    /// Classify a volume header signature.
    ///
    /// Unknown signatures are `InvalidVolume`; classic HFS maps to its
    /// variant and is rejected later, at open.
    pub fn from_signature(signature: u16) -> Result<Self> {
        match signature {
            HFS_SIGNATURE => Ok(Self::Hfs),
            HFSPLUS_SIGNATURE => Ok(Self::HfsPlus),
            HFSX_SIGNATURE => Ok(Self::HfsX),
            actual => Err(HfsError::InvalidVolume {
                expected: HFSPLUS_SIGNATURE,
                actual,
            }),
        }
    }

    #[must_use]
    pub fn signature(self) -> u16 {
        match self {
            Self::Hfs => HFS_SIGNATURE,
            Self::HfsPlus => HFSPLUS_SIGNATURE,
            Self::HfsX => HFSX_SIGNATURE,
        }
    }

    /// HFSX compares catalog names code unit for code unit; the others
    /// fold case.
    #[must_use]
    pub fn case_sensitive_names(self) -> bool {
        matches!(self, Self::HfsX)
    }

    /// Comparator for this format's catalog tree.
    #[must_use]
    pub fn catalog_ordering(self) -> Arc<dyn KeyOrdering> {
        Arc::new(CatalogKeyOrdering {
            case_sensitive: self.case_sensitive_names(),
        })
    }

    /// Comparator for the extents-overflow tree (format-independent,
    /// provided here so the facade sources both from one place).
    #[must_use]
    pub fn extent_ordering(self) -> Arc<dyn KeyOrdering> {
        Arc::new(ExtentKeyOrdering)
    }

    /// Encoded catalog search key for `name` under `parent`.
    pub fn make_catalog_key(self, parent: CatalogNodeId, name: &str) -> Result<Vec<u8>> {
        Ok(CatalogKey {
            parent,
            name: self.encode_name(name)?,
        }
        .encode())
    }

    /// Encoded catalog key carrying an already-encoded name.
    #[must_use]
    pub fn make_catalog_key_raw(self, parent: CatalogNodeId, name: &UniStr) -> Vec<u8> {
        CatalogKey {
            parent,
            name: name.clone(),
        }
        .encode()
    }

    /// The empty-name key that addresses a CNID's thread record.
    #[must_use]
    pub fn thread_key(self, cnid: CatalogNodeId) -> Vec<u8> {
        CatalogKey {
            parent: cnid,
            name: UniStr::empty(),
        }
        .encode()
    }

    /// Encoded extents-overflow search key.
    #[must_use]
    pub fn make_extent_key(self, kind: ForkKind, cnid: CatalogNodeId, start_block: u32) -> Vec<u8> {
        ExtentKey {
            kind,
            cnid,
            start_block,
        }
        .encode()
    }

    pub fn encode_name(self, name: &str) -> Result<UniStr> {
        Ok(UniStr::from_str(name)?)
    }

    #[must_use]
    pub fn decode_name(self, name: &UniStr) -> String {
        name.to_string_lossy()
    }

    /// Reserved CNIDs are format-defined but identical across the
    /// family.
    #[must_use]
    pub fn reserved_cnid(self, id: ReservedId) -> CatalogNodeId {
        id.cnid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn signature_classification() {
        assert_eq!(
            VolumeFormat::from_signature(0x482B).unwrap(),
            VolumeFormat::HfsPlus
        );
        assert_eq!(
            VolumeFormat::from_signature(0x4858).unwrap(),
            VolumeFormat::HfsX
        );
        assert_eq!(
            VolumeFormat::from_signature(0x4244).unwrap(),
            VolumeFormat::Hfs
        );
        assert!(matches!(
            VolumeFormat::from_signature(0x4142),
            Err(HfsError::InvalidVolume { actual: 0x4142, .. })
        ));
    }

    #[test]
    fn orderings_track_case_sensitivity() {
        let plus = VolumeFormat::HfsPlus;
        let x = VolumeFormat::HfsX;
        assert!(!plus.case_sensitive_names());
        assert!(x.case_sensitive_names());

        let a = plus
            .make_catalog_key(CatalogNodeId::ROOT_FOLDER, "System")
            .unwrap();
        let b = plus
            .make_catalog_key(CatalogNodeId::ROOT_FOLDER, "system")
            .unwrap();
        assert_eq!(plus.catalog_ordering().compare(&a, &b).unwrap(), Ordering::Equal);
        assert_ne!(x.catalog_ordering().compare(&a, &b).unwrap(), Ordering::Equal);
    }

    #[test]
    fn thread_key_is_the_empty_name_key() {
        let format = VolumeFormat::HfsPlus;
        let thread = format.thread_key(CatalogNodeId(40));
        let explicit = format.make_catalog_key(CatalogNodeId(40), "").unwrap();
        assert_eq!(thread, explicit);
    }
}
