//! B-tree node descriptor, header record, and record offset table.
//!
//! Every node starts with a 14-byte descriptor. Record offsets are
//! stored as a trailing table of big-endian u16s read back-to-front:
//! the offset of record `i` sits at `node_size - 2*(i+1)`, and entry
//! `record_count` marks the start of free space.

use hfsp_types::{ensure_slice, read_be_u16, read_be_u32, NodeId, ParseError};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// B-tree header attribute bit: key lengths are u16 (always set for
/// HFS+ trees).
pub const ATTR_BIG_KEYS: u32 = 0x0000_0002;
/// B-tree header attribute bit: index-node keys occupy their actual
/// length rather than `max_key_length`.
pub const ATTR_VARIABLE_INDEX_KEYS: u32 = 0x0000_0004;

/// The four node kinds of a B-tree file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Leaf,
    Index,
    Header,
    Map,
}

impl NodeKind {
    pub fn from_on_disk(byte: i8) -> Result<Self, ParseError> {
        match byte {
            -1 => Ok(Self::Leaf),
            0 => Ok(Self::Index),
            1 => Ok(Self::Header),
            2 => Ok(Self::Map),
            _ => Err(ParseError::InvalidField {
                field: "node_kind",
                reason: "must be -1 (leaf), 0 (index), 1 (header), or 2 (map)",
            }),
        }
    }

    #[must_use]
    pub fn on_disk(self) -> i8 {
        match self {
            Self::Leaf => -1,
            Self::Index => 0,
            Self::Header => 1,
            Self::Map => 2,
        }
    }
}

/// Fixed 14-byte descriptor at the start of every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub forward_link: NodeId,
    pub backward_link: NodeId,
    pub kind: NodeKind,
    pub height: u8,
    pub record_count: u16,
}

impl NodeDescriptor {
    pub const SIZE: usize = 14;

    pub fn decode(buf: &[u8], offset: usize) -> Result<Self, ParseError> {
        let bytes = ensure_slice(buf, offset, Self::SIZE)?;
        Ok(Self {
            forward_link: NodeId(read_be_u32(bytes, 0)?),
            backward_link: NodeId(read_be_u32(bytes, 4)?),
            kind: NodeKind::from_on_disk(bytes[8] as i8)?,
            height: bytes[9],
            record_count: read_be_u16(bytes, 10)?,
        })
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&self.forward_link.0.to_be_bytes());
        out.extend_from_slice(&self.backward_link.0.to_be_bytes());
        out.push(self.kind.on_disk() as u8);
        out.push(self.height);
        out.extend_from_slice(&self.record_count.to_be_bytes());
        out.extend_from_slice(&0_u16.to_be_bytes());
        out
    }
}

/// The B-tree header record, stored as record 0 of node 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HeaderRecord {
    pub tree_depth: u16,
    pub root_node: NodeId,
    pub leaf_record_count: u32,
    pub first_leaf: NodeId,
    pub last_leaf: NodeId,
    pub node_size: u16,
    pub max_key_length: u16,
    pub total_nodes: u32,
    pub free_nodes: u32,
    pub clump_size: u32,
    pub btree_type: u8,
    pub key_compare_type: u8,
    pub attributes: u32,
}

impl HeaderRecord {
    pub const SIZE: usize = 106;
    /// Byte offset of the header record within node 0.
    pub const OFFSET_IN_NODE: usize = NodeDescriptor::SIZE;

    pub fn decode(buf: &[u8], offset: usize) -> Result<Self, ParseError> {
        let bytes = ensure_slice(buf, offset, Self::SIZE)?;

        let node_size = read_be_u16(bytes, 18)?;
        if !node_size.is_power_of_two() || !(512..=32768).contains(&node_size) {
            return Err(ParseError::InvalidField {
                field: "node_size",
                reason: "must be a power of two in 512..=32768",
            });
        }

        Ok(Self {
            tree_depth: read_be_u16(bytes, 0)?,
            root_node: NodeId(read_be_u32(bytes, 2)?),
            leaf_record_count: read_be_u32(bytes, 6)?,
            first_leaf: NodeId(read_be_u32(bytes, 10)?),
            last_leaf: NodeId(read_be_u32(bytes, 14)?),
            node_size,
            max_key_length: read_be_u16(bytes, 20)?,
            total_nodes: read_be_u32(bytes, 22)?,
            free_nodes: read_be_u32(bytes, 26)?,
            clump_size: read_be_u32(bytes, 32)?,
            btree_type: bytes[36],
            key_compare_type: bytes[37],
            attributes: read_be_u32(bytes, 38)?,
        })
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&self.tree_depth.to_be_bytes());
        out.extend_from_slice(&self.root_node.0.to_be_bytes());
        out.extend_from_slice(&self.leaf_record_count.to_be_bytes());
        out.extend_from_slice(&self.first_leaf.0.to_be_bytes());
        out.extend_from_slice(&self.last_leaf.0.to_be_bytes());
        out.extend_from_slice(&self.node_size.to_be_bytes());
        out.extend_from_slice(&self.max_key_length.to_be_bytes());
        out.extend_from_slice(&self.total_nodes.to_be_bytes());
        out.extend_from_slice(&self.free_nodes.to_be_bytes());
        out.extend_from_slice(&0_u16.to_be_bytes()); // reserved
        out.extend_from_slice(&self.clump_size.to_be_bytes());
        out.push(self.btree_type);
        out.push(self.key_compare_type);
        out.extend_from_slice(&self.attributes.to_be_bytes());
        out.extend_from_slice(&[0_u8; 64]); // reserved
        debug_assert_eq!(out.len(), Self::SIZE);
        out
    }

    #[must_use]
    pub fn has_big_keys(&self) -> bool {
        self.attributes & ATTR_BIG_KEYS != 0
    }

    #[must_use]
    pub fn has_variable_index_keys(&self) -> bool {
        self.attributes & ATTR_VARIABLE_INDEX_KEYS != 0
    }
}

/// Byte range of record `index` within a full node buffer.
///
/// Validates that the offset table entries are in bounds, above the
/// descriptor, and monotonic.
pub fn record_range(node: &[u8], record_count: u16, index: u16) -> Result<Range<usize>, ParseError> {
    if index >= record_count {
        return Err(ParseError::InvalidField {
            field: "record_index",
            reason: "beyond the node's record count",
        });
    }

    let table_len = 2 * (usize::from(record_count) + 1);
    if node.len() < NodeDescriptor::SIZE + table_len {
        return Err(ParseError::InsufficientData {
            needed: NodeDescriptor::SIZE + table_len,
            offset: 0,
            actual: node.len(),
        });
    }
    let free_space_floor = node.len() - table_len;

    let start = usize::from(read_be_u16(node, node.len() - 2 * (usize::from(index) + 1))?);
    let end = usize::from(read_be_u16(node, node.len() - 2 * (usize::from(index) + 2))?);

    if start < NodeDescriptor::SIZE || end < start || end > free_space_floor {
        return Err(ParseError::InvalidField {
            field: "record_offset",
            reason: "out of bounds or non-monotonic",
        });
    }

    Ok(start..end)
}

/// Assemble a full node buffer from a descriptor and its records,
/// writing the trailing offset table. The encoding counterpart of
/// [`record_range`].
pub fn build_node(
    node_size: usize,
    desc: &NodeDescriptor,
    records: &[&[u8]],
) -> Result<Vec<u8>, ParseError> {
    if records.len() != usize::from(desc.record_count) {
        return Err(ParseError::InvalidField {
            field: "record_count",
            reason: "descriptor count does not match the records given",
        });
    }

    let payload: usize = records.iter().map(|r| r.len()).sum();
    let table_len = 2 * (records.len() + 1);
    if NodeDescriptor::SIZE + payload + table_len > node_size {
        return Err(ParseError::InvalidField {
            field: "node_size",
            reason: "records and offset table do not fit",
        });
    }

    let mut node = vec![0_u8; node_size];
    node[..NodeDescriptor::SIZE].copy_from_slice(&desc.encode());

    let mut cursor = NodeDescriptor::SIZE;
    for (i, record) in records.iter().enumerate() {
        node[cursor..cursor + record.len()].copy_from_slice(record);
        let table_at = node_size - 2 * (i + 1);
        node[table_at..table_at + 2].copy_from_slice(&(cursor as u16).to_be_bytes());
        cursor += record.len();
    }
    let free_at = node_size - 2 * (records.len() + 1);
    node[free_at..free_at + 2].copy_from_slice(&(cursor as u16).to_be_bytes());

    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_descriptor_round_trip() {
        let desc = NodeDescriptor {
            forward_link: NodeId(3),
            backward_link: NodeId(0),
            kind: NodeKind::Leaf,
            height: 1,
            record_count: 2,
        };
        let encoded = desc.encode();
        assert_eq!(encoded.len(), NodeDescriptor::SIZE);
        assert_eq!(encoded[8], 0xFF); // leaf kind is -1
        assert_eq!(NodeDescriptor::decode(&encoded, 0).unwrap(), desc);
    }

    #[test]
    fn node_kind_rejects_unknown_byte() {
        let mut encoded = NodeDescriptor {
            forward_link: NodeId(0),
            backward_link: NodeId(0),
            kind: NodeKind::Index,
            height: 2,
            record_count: 1,
        }
        .encode();
        encoded[8] = 9;
        assert!(matches!(
            NodeDescriptor::decode(&encoded, 0),
            Err(ParseError::InvalidField {
                field: "node_kind",
                ..
            })
        ));
    }

    #[test]
    fn header_record_round_trip_and_validation() {
        let rec = HeaderRecord {
            tree_depth: 2,
            root_node: NodeId(1),
            leaf_record_count: 4,
            first_leaf: NodeId(2),
            last_leaf: NodeId(3),
            node_size: 512,
            max_key_length: 516,
            total_nodes: 4,
            free_nodes: 0,
            attributes: ATTR_BIG_KEYS | ATTR_VARIABLE_INDEX_KEYS,
            ..HeaderRecord::default()
        };
        let encoded = rec.encode();
        let decoded = HeaderRecord::decode(&encoded, 0).unwrap();
        assert_eq!(decoded, rec);
        assert!(decoded.has_big_keys());
        assert!(decoded.has_variable_index_keys());

        let mut bad = encoded;
        bad[18..20].copy_from_slice(&300_u16.to_be_bytes());
        assert!(matches!(
            HeaderRecord::decode(&bad, 0),
            Err(ParseError::InvalidField {
                field: "node_size",
                ..
            })
        ));
    }

    #[test]
    fn build_node_and_record_range_agree() {
        let desc = NodeDescriptor {
            forward_link: NodeId(0),
            backward_link: NodeId(0),
            kind: NodeKind::Leaf,
            height: 1,
            record_count: 3,
        };
        let records: [&[u8]; 3] = [b"alpha", b"be", b"gamma!"];
        let node = build_node(512, &desc, &records).unwrap();

        for (i, expected) in records.iter().enumerate() {
            let range = record_range(&node, 3, i as u16).unwrap();
            assert_eq!(&node[range], *expected);
        }

        // Index past the record count is rejected.
        assert!(record_range(&node, 3, 3).is_err());
    }

    #[test]
    fn record_range_rejects_corrupt_offsets() {
        let desc = NodeDescriptor {
            forward_link: NodeId(0),
            backward_link: NodeId(0),
            kind: NodeKind::Leaf,
            height: 1,
            record_count: 1,
        };
        let mut node = build_node(512, &desc, &[b"payload"]).unwrap();

        // Point record 0 below the descriptor.
        let at = node.len() - 2;
        node[at..].copy_from_slice(&3_u16.to_be_bytes());
        assert!(record_range(&node, 1, 0).is_err());

        // Make the free-space entry precede the record start.
        let mut node2 = build_node(512, &desc, &[b"payload"]).unwrap();
        let at2 = node2.len() - 4;
        node2[at2..at2 + 2].copy_from_slice(&5_u16.to_be_bytes());
        assert!(record_range(&node2, 1, 0).is_err());
    }

    #[test]
    fn build_node_rejects_overflow() {
        let desc = NodeDescriptor {
            forward_link: NodeId(0),
            backward_link: NodeId(0),
            kind: NodeKind::Leaf,
            height: 1,
            record_count: 1,
        };
        let big = vec![0_u8; 600];
        assert!(build_node(512, &desc, &[&big]).is_err());
    }
}
