//! The volume facade.
//!
//! Bootstrap is two-phase: the extents-overflow tree must come up from
//! the header's inline extents alone (its own location is pinned in the
//! header, so it never spills), and every later fork resolution runs
//! through it. The catalog tree opens second and may already use
//! overflow records.

use crate::format::VolumeFormat;
use hfsp_block::{read_volume_header_region, ByteDevice};
use hfsp_btree::BTree;
use hfsp_error::{HfsError, Result};
use hfsp_fork::{ForkStream, NoOverflow, OverflowSource};
use hfsp_ondisk::{
    CatalogKey, CatalogRecord, CatalogThread, ExtentKey, ExtentRecord, ForkDescriptor, UniStr,
    VolumeHeader,
};
use hfsp_types::{read_be_u16, AllocBlockSize, CatalogNodeId, ForkKind, ReservedId};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared handle to the volume's backing byte source.
pub type VolumeDevice = Arc<dyn ByteDevice>;

type Stream = ForkStream<VolumeDevice>;

/// The extents-overflow tree wrapped as an [`OverflowSource`].
struct ExtentsOverflow {
    tree: BTree<Stream>,
}

impl OverflowSource for ExtentsOverflow {
    fn overflow_record(
        &self,
        cnid: CatalogNodeId,
        kind: ForkKind,
        start_block: u32,
    ) -> Result<Option<ExtentRecord>> {
        let key = ExtentKey {
            kind,
            cnid,
            start_block,
        }
        .encode();
        match self.tree.find(&key)? {
            Some((_, payload)) => Ok(Some(ExtentRecord::decode(&payload, 0)?)),
            None => Ok(None),
        }
    }
}

/// A directory entry yielded by [`Volume::iterate_children`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: UniStr,
    pub record: CatalogRecord,
}

/// An open, read-only HFS+ volume.
pub struct Volume {
    device: VolumeDevice,
    format: VolumeFormat,
    header: VolumeHeader,
    block_size: AllocBlockSize,
    extents: ExtentsOverflow,
    catalog: BTree<Stream>,
}

// Manual impl: the device handle and the B-trees are not Debug.
impl fmt::Debug for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Volume")
            .field("format", &self.format)
            .field("block_size", &self.block_size.get())
            .field("total_blocks", &self.header.total_blocks)
            .finish_non_exhaustive()
    }
}

impl Volume {
    /// Open a volume from its backing device.
    ///
    /// Fails with `InvalidVolume` on an unknown signature and
    /// `NotSupported` on a classic HFS volume; everything else the
    /// header claims is validated lazily as it is used.
    pub fn open(device: VolumeDevice) -> Result<Self> {
        let region = read_volume_header_region(device.as_ref())?;
        let format = VolumeFormat::from_signature(read_be_u16(&region, 0)?)?;
        if format == VolumeFormat::Hfs {
            return Err(HfsError::NotSupported("classic HFS volumes"));
        }
        let header = VolumeHeader::decode(&region, 0)?;
        let block_size = AllocBlockSize::new(header.block_size)?;

        // Phase one: the extents tree from inline extents only.
        let extents_stream = Stream::open(
            device.clone(),
            block_size,
            &header.extents_file,
            ReservedId::ExtentsFile.cnid(),
            ForkKind::Data,
            &NoOverflow,
        )?;
        let extents = ExtentsOverflow {
            tree: BTree::open(extents_stream, format.extent_ordering())?,
        };

        // Phase two: the catalog, with overflow support available.
        let catalog_stream = Stream::open(
            device.clone(),
            block_size,
            &header.catalog_file,
            ReservedId::CatalogFile.cnid(),
            ForkKind::Data,
            &extents,
        )?;
        let catalog = BTree::open(catalog_stream, format.catalog_ordering())?;

        if header.is_journaled() {
            warn!(
                journal_info_block = header.journal_info_block,
                "journaled volume opened read-only; journal is not replayed"
            );
        }
        debug!(
            format = ?format,
            block_size = block_size.get(),
            total_blocks = header.total_blocks,
            "volume opened"
        );

        Ok(Self {
            device,
            format,
            header,
            block_size,
            extents,
            catalog,
        })
    }

    #[must_use]
    pub fn format(&self) -> VolumeFormat {
        self.format
    }

    /// The header captured at open time.
    #[must_use]
    pub fn header(&self) -> &VolumeHeader {
        &self.header
    }

    #[must_use]
    pub fn block_size(&self) -> AllocBlockSize {
        self.block_size
    }

    /// Re-read and decode the header region from the device.
    ///
    /// Each call is internally consistent; consecutive calls carry no
    /// coherence guarantee against a device modified underneath.
    pub fn read_header(&self) -> Result<VolumeHeader> {
        let region = read_volume_header_region(self.device.as_ref())?;
        Ok(VolumeHeader::decode(&region, 0)?)
    }

    /// Look up the catalog record named `name` under `parent`.
    pub fn lookup_catalog_entry(
        &self,
        parent: CatalogNodeId,
        name: &str,
    ) -> Result<Option<CatalogRecord>> {
        let key = self.format.make_catalog_key(parent, name)?;
        self.find_catalog(&key)
    }

    /// Resolve a CNID to its parent and name via its thread record.
    pub fn lookup_thread(&self, cnid: CatalogNodeId) -> Result<Option<CatalogThread>> {
        let key = self.format.thread_key(cnid);
        match self.find_catalog(&key)? {
            Some(CatalogRecord::Thread(thread)) => Ok(Some(thread)),
            Some(_) => Err(HfsError::MalformedRecord(format!(
                "thread key for CNID {cnid} resolved to a non-thread record"
            ))),
            None => Ok(None),
        }
    }

    /// The children of `parent`, in catalog key order.
    ///
    /// Thread records (empty names) are skipped; iteration stops at the
    /// first key under a different parent.
    pub fn iterate_children(&self, parent: CatalogNodeId) -> Result<Vec<DirEntry>> {
        let start = self.format.thread_key(parent);
        let mut entries = Vec::new();
        for item in self.catalog.iterate_from(&start)? {
            let (key_bytes, payload) = item?;
            let key = CatalogKey::decode(&key_bytes, 0)?;
            if key.parent != parent {
                break;
            }
            if key.name.is_empty() {
                continue; // the folder's own thread record
            }
            entries.push(DirEntry {
                name: key.name,
                record: CatalogRecord::decode(&payload, 0)?,
            });
        }
        Ok(entries)
    }

    /// Open a fork of the file identified by CNID.
    ///
    /// `Ok(None)` if the CNID has no catalog entry; `NotAFile` if it
    /// names a folder.
    pub fn open_fork(&self, cnid: CatalogNodeId, kind: ForkKind) -> Result<Option<Stream>> {
        let Some(thread) = self.lookup_thread(cnid)? else {
            return Ok(None);
        };
        let key = self.format.make_catalog_key_raw(thread.parent, &thread.name);
        match self.find_catalog(&key)? {
            Some(CatalogRecord::File(file)) => {
                let stream = self.fork_stream_for(cnid, kind, file.fork(kind))?;
                Ok(Some(stream))
            }
            Some(CatalogRecord::Folder(_)) => Err(HfsError::NotAFile(cnid.0)),
            Some(CatalogRecord::Thread(_)) => Err(HfsError::MalformedRecord(format!(
                "catalog key for CNID {cnid} resolved to a thread record"
            ))),
            None => Ok(None),
        }
    }

    /// Build a fork stream from a descriptor the caller already holds,
    /// resolving overflow extents as needed.
    pub fn fork_stream_for(
        &self,
        cnid: CatalogNodeId,
        kind: ForkKind,
        fork: &ForkDescriptor,
    ) -> Result<Stream> {
        Stream::open(
            self.device.clone(),
            self.block_size,
            fork,
            cnid,
            kind,
            &self.extents,
        )
    }

    /// The allocation file's stream, for free-space tooling.
    pub fn allocation_fork(&self) -> Result<Stream> {
        self.fork_stream_for(
            ReservedId::AllocationFile.cnid(),
            ForkKind::Data,
            &self.header.allocation_file,
        )
    }

    /// Whether the volume header flags a journal.
    #[must_use]
    pub fn has_journal(&self) -> bool {
        self.header.is_journaled()
    }

    /// Allocation block holding the journal info, when journaled.
    #[must_use]
    pub fn journal_info_block(&self) -> Option<u32> {
        (self.has_journal() && self.header.journal_info_block != 0)
            .then_some(self.header.journal_info_block)
    }

    /// Whether an attributes B-tree is present. A fork descriptor with
    /// an empty first extent counts as absent.
    #[must_use]
    pub fn has_attributes_file(&self) -> bool {
        self.header.attributes_file.extents[0].block_count != 0
    }

    /// The hot-files B-tree is never read by this driver.
    #[must_use]
    pub fn has_hot_files_file(&self) -> bool {
        false
    }

    pub fn open_hot_files(&self) -> Result<Stream> {
        Err(HfsError::NotSupported("hot files B-tree"))
    }

    fn find_catalog(&self, key: &[u8]) -> Result<Option<CatalogRecord>> {
        match self.catalog.find(key)? {
            Some((_, payload)) => Ok(Some(CatalogRecord::decode(&payload, 0)?)),
            None => Ok(None),
        }
    }
}
