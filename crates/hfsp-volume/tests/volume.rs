//! End-to-end tests over a synthetic HFS+ image assembled in memory.
//!
//! The image carries a two-level catalog tree (root index over two
//! leaves) under the root folder, one file whose data fork spills into
//! the extents-overflow tree, and patterned content blocks so reads can
//! be verified byte for byte.

use hfsp_block::{ByteDevice, MemoryByteDevice};
use hfsp_error::HfsError;
use hfsp_ondisk::{
    build_node, CatalogFile, CatalogFolder, CatalogKey, CatalogRecord, CatalogThread,
    ExtentDescriptor, ExtentKey, ExtentRecord, ForkDescriptor, HeaderRecord, NodeDescriptor,
    NodeKind, UniStr, VolumeHeader, ATTR_BIG_KEYS, ATTR_VARIABLE_INDEX_KEYS,
};
use hfsp_types::{CatalogNodeId, ForkKind, NodeId, HFSPLUS_SIGNATURE, VOLUME_HEADER_OFFSET};
use hfsp_volume::{Volume, VolumeFormat};
use std::sync::Arc;

const BS: u32 = 512;
const TOTAL_BLOCKS: u32 = 400;

const CATALOG_NODE_SIZE: usize = 1024;
const EXTENTS_NODE_SIZE: usize = 512;

const CATALOG_START: u32 = 10; // 4 nodes of 1024 = 8 blocks
const EXTENTS_START: u32 = 20; // 2 nodes of 512 = 2 blocks
const ALLOCATION_START: u32 = 8;

const BIG_FILE_CNID: u32 = 40;

fn ckey(parent: u32, name: &str) -> Vec<u8> {
    CatalogKey {
        parent: CatalogNodeId(parent),
        name: UniStr::from_str(name).unwrap(),
    }
    .encode()
}

fn leaf_rec(key: Vec<u8>, payload: Vec<u8>) -> Vec<u8> {
    let mut rec = key;
    rec.extend_from_slice(&payload);
    rec
}

fn index_rec(key: Vec<u8>, child: u32) -> Vec<u8> {
    let mut rec = key;
    rec.extend_from_slice(&child.to_be_bytes());
    rec
}

fn folder(id: u32, valence: u32) -> Vec<u8> {
    CatalogFolder {
        flags: 0,
        valence,
        id: CatalogNodeId(id),
        create_date: 0xD500_0000,
        modify_date: 0xD500_0001,
    }
    .encode()
}

fn thread(parent: u32, name: &str, is_folder: bool) -> Vec<u8> {
    CatalogThread {
        is_folder,
        parent: CatalogNodeId(parent),
        name: UniStr::from_str(name).unwrap(),
    }
    .encode()
}

fn desc(kind: NodeKind, height: u8, records: u16, forward: u32, backward: u32) -> NodeDescriptor {
    NodeDescriptor {
        forward_link: NodeId(forward),
        backward_link: NodeId(backward),
        kind,
        height,
        record_count: records,
    }
}

/// Eight inline extents totaling 100 blocks, then 50 more in the
/// overflow tree.
fn big_file_inline_extents() -> [ExtentDescriptor; 8] {
    let counts = [13, 13, 13, 13, 12, 12, 12, 12];
    let mut extents = [ExtentDescriptor::default(); 8];
    for (i, count) in counts.into_iter().enumerate() {
        extents[i] = ExtentDescriptor {
            start_block: 100 + i as u32 * 20,
            block_count: count,
        };
    }
    extents
}

const BIG_FILE_OVERFLOW: ExtentDescriptor = ExtentDescriptor {
    start_block: 300,
    block_count: 50,
};

fn big_file_fork() -> ForkDescriptor {
    ForkDescriptor {
        logical_size: 150 * u64::from(BS),
        clump_size: 0,
        total_blocks: 150,
        extents: big_file_inline_extents(),
    }
}

fn big_file_record() -> Vec<u8> {
    CatalogFile {
        flags: 0,
        id: CatalogNodeId(BIG_FILE_CNID),
        create_date: 0xD500_0002,
        modify_date: 0xD500_0003,
        data_fork: big_file_fork(),
        resource_fork: ForkDescriptor::default(),
    }
    .encode()
}

fn catalog_tree_bytes() -> Vec<u8> {
    let header = HeaderRecord {
        tree_depth: 2,
        root_node: NodeId(1),
        leaf_record_count: 8,
        first_leaf: NodeId(2),
        last_leaf: NodeId(3),
        node_size: CATALOG_NODE_SIZE as u16,
        max_key_length: 516,
        total_nodes: 4,
        free_nodes: 0,
        attributes: ATTR_BIG_KEYS | ATTR_VARIABLE_INDEX_KEYS,
        ..HeaderRecord::default()
    };
    let node0 = build_node(
        CATALOG_NODE_SIZE,
        &desc(NodeKind::Header, 0, 3, 0, 0),
        &[&header.encode(), &[0_u8; 128], &[0_u8; 64]],
    )
    .unwrap();

    let node1 = build_node(
        CATALOG_NODE_SIZE,
        &desc(NodeKind::Index, 2, 2, 0, 0),
        &[
            &index_rec(ckey(2, ""), 2),
            &index_rec(ckey(2, "System"), 3),
        ],
    )
    .unwrap();

    let leaf_a = build_node(
        CATALOG_NODE_SIZE,
        &desc(NodeKind::Leaf, 1, 4, 3, 0),
        &[
            &leaf_rec(ckey(2, ""), thread(1, "Macintosh HD", true)),
            &leaf_rec(ckey(2, "big.bin"), big_file_record()),
            &leaf_rec(ckey(2, "Documents"), folder(17, 0)),
            &leaf_rec(ckey(2, "Library"), folder(18, 0)),
        ],
    )
    .unwrap();

    let leaf_b = build_node(
        CATALOG_NODE_SIZE,
        &desc(NodeKind::Leaf, 1, 4, 0, 2),
        &[
            &leaf_rec(ckey(2, "System"), folder(19, 0)),
            &leaf_rec(ckey(2, "Users"), folder(20, 0)),
            &leaf_rec(ckey(19, ""), thread(2, "System", true)),
            &leaf_rec(ckey(BIG_FILE_CNID, ""), thread(2, "big.bin", false)),
        ],
    )
    .unwrap();

    let mut bytes = node0;
    bytes.extend_from_slice(&node1);
    bytes.extend_from_slice(&leaf_a);
    bytes.extend_from_slice(&leaf_b);
    bytes
}

fn extents_tree_bytes(with_overflow: bool) -> Vec<u8> {
    let record_count = u16::from(with_overflow);
    let header = HeaderRecord {
        tree_depth: 1,
        root_node: NodeId(1),
        leaf_record_count: u32::from(record_count),
        first_leaf: NodeId(1),
        last_leaf: NodeId(1),
        node_size: EXTENTS_NODE_SIZE as u16,
        max_key_length: 10,
        total_nodes: 2,
        free_nodes: 0,
        attributes: ATTR_BIG_KEYS,
        ..HeaderRecord::default()
    };
    let node0 = build_node(
        EXTENTS_NODE_SIZE,
        &desc(NodeKind::Header, 0, 3, 0, 0),
        &[&header.encode(), &[0_u8; 128], &[0_u8; 64]],
    )
    .unwrap();

    let overflow_rec = {
        let key = ExtentKey {
            kind: ForkKind::Data,
            cnid: CatalogNodeId(BIG_FILE_CNID),
            start_block: 100,
        };
        let mut record = ExtentRecord::default();
        record.extents[0] = BIG_FILE_OVERFLOW;
        leaf_rec(key.encode(), record.encode())
    };
    let records: Vec<&[u8]> = if with_overflow {
        vec![overflow_rec.as_slice()]
    } else {
        Vec::new()
    };
    let node1 = build_node(
        EXTENTS_NODE_SIZE,
        &desc(NodeKind::Leaf, 1, record_count, 0, 0),
        &records,
    )
    .unwrap();

    let mut bytes = node0;
    bytes.extend_from_slice(&node1);
    bytes
}

fn volume_header() -> VolumeHeader {
    VolumeHeader {
        signature: HFSPLUS_SIGNATURE,
        version: 4,
        attributes: 0,
        block_size: BS,
        total_blocks: TOTAL_BLOCKS,
        free_blocks: 50,
        file_count: 1,
        folder_count: 5,
        next_catalog_id: 41,
        allocation_file: ForkDescriptor {
            logical_size: u64::from(BS),
            total_blocks: 1,
            extents: {
                let mut e = [ExtentDescriptor::default(); 8];
                e[0] = ExtentDescriptor {
                    start_block: ALLOCATION_START,
                    block_count: 1,
                };
                e
            },
            ..ForkDescriptor::default()
        },
        extents_file: ForkDescriptor {
            logical_size: 1024,
            total_blocks: 2,
            extents: {
                let mut e = [ExtentDescriptor::default(); 8];
                e[0] = ExtentDescriptor {
                    start_block: EXTENTS_START,
                    block_count: 2,
                };
                e
            },
            ..ForkDescriptor::default()
        },
        catalog_file: ForkDescriptor {
            logical_size: 4096,
            total_blocks: 8,
            extents: {
                let mut e = [ExtentDescriptor::default(); 8];
                e[0] = ExtentDescriptor {
                    start_block: CATALOG_START,
                    block_count: 8,
                };
                e
            },
            ..ForkDescriptor::default()
        },
        ..VolumeHeader::default()
    }
}

/// Assemble the image and the expected contents of big.bin.
fn build_image(with_overflow: bool) -> (Vec<u8>, Vec<u8>) {
    let mut image = vec![0_u8; (TOTAL_BLOCKS * BS) as usize];

    let write_at = |image: &mut Vec<u8>, block: u32, bytes: &[u8]| {
        let at = (block * BS) as usize;
        image[at..at + bytes.len()].copy_from_slice(bytes);
    };

    write_at(&mut image, 2, &volume_header().encode());
    assert_eq!(u64::from(2 * BS), VOLUME_HEADER_OFFSET);
    write_at(&mut image, CATALOG_START, &catalog_tree_bytes());
    write_at(&mut image, EXTENTS_START, &extents_tree_bytes(with_overflow));

    // Content blocks: device block b is filled with the byte b % 251,
    // so any logical position maps back to exactly one device block.
    let mut expected = Vec::new();
    let mut extents = big_file_inline_extents().to_vec();
    extents.push(BIG_FILE_OVERFLOW);
    for extent in &extents {
        for b in extent.start_block..extent.start_block + extent.block_count {
            let fill = vec![(b % 251) as u8; BS as usize];
            write_at(&mut image, b, &fill);
            expected.extend_from_slice(&fill);
        }
    }
    expected.truncate(big_file_fork().logical_size as usize);

    (image, expected)
}

fn open_volume(with_overflow: bool) -> (Volume, Vec<u8>) {
    let (image, expected) = build_image(with_overflow);
    let device: Arc<dyn ByteDevice> = Arc::new(MemoryByteDevice::new(image));
    (Volume::open(device).unwrap(), expected)
}

#[test]
fn open_classifies_format_and_reads_header() {
    let (volume, _) = open_volume(true);
    assert_eq!(volume.format(), VolumeFormat::HfsPlus);
    assert_eq!(volume.block_size().get(), BS);
    assert_eq!(volume.header().total_blocks, TOTAL_BLOCKS);

    let fresh = volume.read_header().unwrap();
    assert_eq!(&fresh, volume.header());
}

#[test]
fn unknown_signature_is_invalid_volume() {
    let (mut image, _) = build_image(true);
    let at = VOLUME_HEADER_OFFSET as usize;
    image[at..at + 2].copy_from_slice(&[0x41, 0x42]);
    let device: Arc<dyn ByteDevice> = Arc::new(MemoryByteDevice::new(image));
    assert!(matches!(
        Volume::open(device).unwrap_err(),
        HfsError::InvalidVolume { actual: 0x4142, .. }
    ));
}

#[test]
fn classic_hfs_is_not_supported() {
    let (mut image, _) = build_image(true);
    let at = VOLUME_HEADER_OFFSET as usize;
    image[at..at + 2].copy_from_slice(b"BD");
    let device: Arc<dyn ByteDevice> = Arc::new(MemoryByteDevice::new(image));
    assert!(matches!(
        Volume::open(device).unwrap_err(),
        HfsError::NotSupported(_)
    ));
}

#[test]
fn catalog_lookup_routes_through_the_index_node() {
    let (volume, _) = open_volume(true);

    // Lives in the second leaf; the root index must route there.
    let record = volume
        .lookup_catalog_entry(CatalogNodeId::ROOT_FOLDER, "System")
        .unwrap()
        .unwrap();
    let CatalogRecord::Folder(folder) = record else {
        panic!("expected a folder record");
    };
    assert_eq!(folder.id, CatalogNodeId(19));

    // First leaf too.
    let record = volume
        .lookup_catalog_entry(CatalogNodeId::ROOT_FOLDER, "Documents")
        .unwrap()
        .unwrap();
    assert_eq!(record.cnid(), Some(CatalogNodeId(17)));

    // HFS+ folds case.
    let record = volume
        .lookup_catalog_entry(CatalogNodeId::ROOT_FOLDER, "system")
        .unwrap()
        .unwrap();
    assert_eq!(record.cnid(), Some(CatalogNodeId(19)));

    assert!(volume
        .lookup_catalog_entry(CatalogNodeId::ROOT_FOLDER, "Missing")
        .unwrap()
        .is_none());
}

#[test]
fn iterate_children_is_ordered_and_skips_threads() {
    let (volume, _) = open_volume(true);
    let entries = volume.iterate_children(CatalogNodeId::ROOT_FOLDER).unwrap();
    let names: Vec<String> = entries.iter().map(|e| e.name.to_string_lossy()).collect();
    assert_eq!(names, ["big.bin", "Documents", "Library", "System", "Users"]);

    let cnids: Vec<_> = entries.iter().filter_map(|e| e.record.cnid()).collect();
    assert_eq!(
        cnids,
        [40, 17, 18, 19, 20].map(CatalogNodeId)
    );

    // A childless folder iterates empty.
    assert!(volume.iterate_children(CatalogNodeId(19)).unwrap().is_empty());
}

#[test]
fn lookup_thread_resolves_cnid_to_parent_and_name() {
    let (volume, _) = open_volume(true);
    let thread = volume
        .lookup_thread(CatalogNodeId(BIG_FILE_CNID))
        .unwrap()
        .unwrap();
    assert_eq!(thread.parent, CatalogNodeId::ROOT_FOLDER);
    assert_eq!(thread.name.to_string_lossy(), "big.bin");
    assert!(!thread.is_folder);

    assert!(volume.lookup_thread(CatalogNodeId(999)).unwrap().is_none());
}

#[test]
fn fork_spilling_into_overflow_resolves_completely() {
    let (volume, expected) = open_volume(true);
    let stream = volume
        .open_fork(CatalogNodeId(BIG_FILE_CNID), ForkKind::Data)
        .unwrap()
        .unwrap();

    assert_eq!(stream.extents().len(), 9);
    assert_eq!(
        stream.extents().iter().map(|e| e.block_count).sum::<u32>(),
        150
    );
    assert_eq!(stream.len(), 150 * u64::from(BS));

    let contents = stream.read_to_vec().unwrap();
    assert_eq!(contents, expected);

    // Reading across the inline/overflow seam (block 100 of the fork).
    let seam = 100 * u64::from(BS) - 4;
    let mut window = [0_u8; 8];
    assert_eq!(stream.read_at(seam, &mut window).unwrap(), 8);
    assert_eq!(&window[..], &expected[seam as usize..seam as usize + 8]);
}

#[test]
fn read_at_final_byte_returns_exactly_one() {
    let (volume, expected) = open_volume(true);
    let stream = volume
        .open_fork(CatalogNodeId(BIG_FILE_CNID), ForkKind::Data)
        .unwrap()
        .unwrap();

    let mut buf = [0_u8; 10];
    let got = stream.read_at(stream.len() - 1, &mut buf).unwrap();
    assert_eq!(got, 1);
    assert_eq!(buf[0], *expected.last().unwrap());
    assert_eq!(stream.read_at(stream.len(), &mut buf).unwrap(), 0);
}

#[test]
fn missing_overflow_record_truncates_the_fork() {
    let (volume, _) = open_volume(false);
    let err = volume
        .open_fork(CatalogNodeId(BIG_FILE_CNID), ForkKind::Data)
        .unwrap_err();
    assert!(matches!(
        err,
        HfsError::TruncatedFork {
            cnid: BIG_FILE_CNID,
            missing_blocks: 50,
        }
    ));
}

#[test]
fn open_fork_on_a_folder_is_not_a_file() {
    let (volume, _) = open_volume(true);
    assert!(matches!(
        volume
            .open_fork(CatalogNodeId(19), ForkKind::Data)
            .unwrap_err(),
        HfsError::NotAFile(19)
    ));

    // Unknown CNID is absence, not an error.
    assert!(volume
        .open_fork(CatalogNodeId(999), ForkKind::Data)
        .unwrap()
        .is_none());
}

#[test]
fn empty_resource_fork_reads_nothing() {
    let (volume, _) = open_volume(true);
    let stream = volume
        .open_fork(CatalogNodeId(BIG_FILE_CNID), ForkKind::Resource)
        .unwrap()
        .unwrap();
    assert!(stream.is_empty());
    let mut buf = [0_u8; 16];
    assert_eq!(stream.read_at(0, &mut buf).unwrap(), 0);
}

#[test]
fn capability_queries() {
    let (volume, _) = open_volume(true);
    assert!(!volume.has_journal());
    assert_eq!(volume.journal_info_block(), None);
    assert!(!volume.has_attributes_file());
    assert!(!volume.has_hot_files_file());
    assert!(matches!(
        volume.open_hot_files().unwrap_err(),
        HfsError::NotSupported(_)
    ));

    let allocation = volume.allocation_fork().unwrap();
    assert_eq!(allocation.len(), u64::from(BS));
}
