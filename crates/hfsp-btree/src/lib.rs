#![forbid(unsafe_code)]
//! Generic B-tree engine.
//!
//! Traverses the index and leaf nodes of an HFS+ B-tree file stored in
//! any byte-addressed source (in practice, a fork stream over the
//! catalog or extents-overflow file). The engine knows the node layout
//! but nothing about key semantics: records are split into raw key
//! bytes and payload, and comparison is delegated to the injected
//! [`KeyOrdering`].
//!
//! Nodes are transient: each traversal step reads the node it needs and
//! discards it. Callers wanting a cache add one around the source.

use hfsp_block::ByteDevice;
use hfsp_error::{HfsError, Result};
use hfsp_ondisk::{record_range, HeaderRecord, KeyOrdering, NodeDescriptor, NodeKind};
use hfsp_types::{read_be_u16, read_be_u32, NodeId};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, trace};

/// Upper bound on tree depth; a deeper tree is structurally corrupt
/// long before this.
const MAX_DEPTH: u16 = 16;

fn corrupt(node: NodeId, detail: impl Into<String>) -> HfsError {
    HfsError::CorruptTree {
        node: node.0,
        detail: detail.into(),
    }
}

/// A read-only B-tree over a byte-addressed node source.
pub struct BTree<S> {
    source: S,
    ordering: Arc<dyn KeyOrdering>,
    header: HeaderRecord,
}

impl<S: ByteDevice> BTree<S> {
    /// Read the header node and validate the tree is traversable.
    pub fn open(source: S, ordering: Arc<dyn KeyOrdering>) -> Result<Self> {
        let header = Self::read_header_from(&source)?;
        if !header.has_big_keys() {
            return Err(HfsError::NotSupported(
                "B-trees without 16-bit key lengths",
            ));
        }
        if header.tree_depth > MAX_DEPTH {
            return Err(corrupt(NodeId(0), "tree depth exceeds maximum"));
        }
        debug!(
            node_size = header.node_size,
            root = header.root_node.0,
            depth = header.tree_depth,
            leaf_records = header.leaf_record_count,
            "opened B-tree"
        );
        Ok(Self {
            source,
            ordering,
            header,
        })
    }

    /// The header captured at open time.
    #[must_use]
    pub fn header(&self) -> &HeaderRecord {
        &self.header
    }

    /// Re-read the header record from node 0.
    pub fn read_header(&self) -> Result<HeaderRecord> {
        Self::read_header_from(&self.source)
    }

    fn read_header_from(source: &S) -> Result<HeaderRecord> {
        // The minimum node size (512) always covers the descriptor and
        // header record, so one fixed-size probe suffices.
        let mut probe = [0_u8; 512];
        source.read_exact_at(0, &mut probe)?;
        let desc = NodeDescriptor::decode(&probe, 0)?;
        if desc.kind != NodeKind::Header {
            return Err(corrupt(NodeId(0), "node 0 is not a header node"));
        }
        Ok(HeaderRecord::decode(&probe, HeaderRecord::OFFSET_IN_NODE)?)
    }

    fn read_node(&self, id: NodeId) -> Result<(Vec<u8>, NodeDescriptor)> {
        let node_size = usize::from(self.header.node_size);
        let offset = u64::from(id.0) * u64::from(self.header.node_size);
        let mut node = vec![0_u8; node_size];
        self.source.read_exact_at(offset, &mut node)?;
        let desc = NodeDescriptor::decode(&node, 0)?;
        Ok((node, desc))
    }

    /// Split a record into its raw key bytes (length prefix included)
    /// and its payload, honoring index-node key storage rules.
    fn split_record<'r>(&self, node: NodeId, rec: &'r [u8], in_index: bool) -> Result<(&'r [u8], &'r [u8])> {
        let key_len = usize::from(read_be_u16(rec, 0)?);
        let key_end = 2 + key_len;
        if key_end > rec.len() {
            return Err(corrupt(node, "record key overruns the record"));
        }
        let storage = if in_index && !self.header.has_variable_index_keys() {
            usize::from(self.header.max_key_length)
        } else {
            key_len
        };
        let mut payload_at = 2 + storage;
        payload_at += payload_at % 2; // keys are padded to even length
        if payload_at > rec.len() {
            return Err(corrupt(node, "record payload offset overruns the record"));
        }
        Ok((&rec[..key_end], &rec[payload_at..]))
    }

    /// Descend from the root to the leaf node that would hold `key`.
    ///
    /// At each index node the child with the greatest key <= the search
    /// key is selected (an exact match wins); if every separator
    /// exceeds the key, the leftmost child is taken so iteration can
    /// start before the first record.
    fn descend(&self, key: &[u8]) -> Result<Option<(NodeId, Vec<u8>, NodeDescriptor)>> {
        if self.header.tree_depth == 0 || self.header.root_node.0 == 0 {
            return Ok(None); // empty tree
        }

        let mut node_id = self.header.root_node;
        let mut expected_height = self.header.tree_depth;
        loop {
            let (node, desc) = self.read_node(node_id)?;
            if u16::from(desc.height) != expected_height {
                return Err(corrupt(node_id, "node height inconsistent with descent level"));
            }
            match desc.kind {
                NodeKind::Leaf => {
                    if expected_height != 1 {
                        return Err(corrupt(node_id, "leaf node above the leaf level"));
                    }
                    return Ok(Some((node_id, node, desc)));
                }
                NodeKind::Index => {
                    if expected_height == 1 {
                        return Err(corrupt(node_id, "index node at the leaf level"));
                    }
                    if desc.record_count == 0 {
                        return Err(corrupt(node_id, "index node with zero records"));
                    }

                    let mut chosen = 0_u16;
                    for i in 0..desc.record_count {
                        let range = record_range(&node, desc.record_count, i)?;
                        let (rec_key, _) = self.split_record(node_id, &node[range], true)?;
                        match self.ordering.compare(rec_key, key)? {
                            Ordering::Less | Ordering::Equal => chosen = i,
                            Ordering::Greater => break,
                        }
                    }

                    let range = record_range(&node, desc.record_count, chosen)?;
                    let (_, payload) = self.split_record(node_id, &node[range], true)?;
                    let child = NodeId(read_be_u32(payload, 0)?);
                    trace!(
                        from = node_id.0,
                        to = child.0,
                        height = expected_height,
                        "descending"
                    );
                    node_id = child;
                    expected_height -= 1;
                }
                NodeKind::Header | NodeKind::Map => {
                    return Err(corrupt(node_id, "header or map node in the search path"));
                }
            }
        }
    }

    /// Exact-match lookup: the leaf record whose key equals `key`, or
    /// `None`.
    pub fn find(&self, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let Some((node_id, node, desc)) = self.descend(key)? else {
            return Ok(None);
        };
        for i in 0..desc.record_count {
            let range = record_range(&node, desc.record_count, i)?;
            let (rec_key, payload) = self.split_record(node_id, &node[range], false)?;
            match self.ordering.compare(rec_key, key)? {
                Ordering::Equal => return Ok(Some((rec_key.to_vec(), payload.to_vec()))),
                Ordering::Greater => return Ok(None),
                Ordering::Less => {}
            }
        }
        Ok(None)
    }

    /// Position at the first leaf record >= `key` and iterate forward
    /// in key order across sibling links.
    ///
    /// The iterator is finite and restartable (call again to reposition);
    /// it is not a persistent cursor.
    pub fn iterate_from(&self, key: &[u8]) -> Result<LeafIter<'_, S>> {
        let Some((node_id, node, desc)) = self.descend(key)? else {
            return Ok(LeafIter {
                tree: self,
                state: None,
                index: 0,
                remaining: 0,
                hops: 0,
            });
        };

        let mut index = desc.record_count;
        for i in 0..desc.record_count {
            let range = record_range(&node, desc.record_count, i)?;
            let (rec_key, _) = self.split_record(node_id, &node[range], false)?;
            if self.ordering.compare(rec_key, key)? != Ordering::Less {
                index = i;
                break;
            }
        }

        Ok(LeafIter {
            tree: self,
            state: Some((node_id, node, desc)),
            index,
            // Step budgets: a well-formed walk can never yield more
            // records than the header says the tree holds, nor visit
            // more sibling nodes than the tree contains.
            remaining: u64::from(self.header.leaf_record_count),
            hops: u64::from(self.header.total_nodes),
        })
    }
}

/// Forward walk over leaf records; yields `(key_bytes, payload_bytes)`.
pub struct LeafIter<'a, S> {
    tree: &'a BTree<S>,
    state: Option<(NodeId, Vec<u8>, NodeDescriptor)>,
    index: u16,
    remaining: u64,
    hops: u64,
}

impl<S: ByteDevice> LeafIter<'_, S> {
    fn advance(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        loop {
            let Some((node_id, node, desc)) = &self.state else {
                return Ok(None);
            };

            if self.index >= desc.record_count {
                let next = desc.forward_link;
                if next.0 == 0 {
                    self.state = None;
                    return Ok(None);
                }
                // Every hop is charged, so a chain of empty leaves
                // cannot loop past the tree's node count.
                if self.hops == 0 {
                    return Err(corrupt(
                        *node_id,
                        "sibling chain longer than the tree's node count",
                    ));
                }
                self.hops -= 1;
                let (next_node, next_desc) = self.tree.read_node(next)?;
                if next_desc.kind != NodeKind::Leaf || next_desc.height != 1 {
                    return Err(corrupt(next, "forward sibling is not a leaf"));
                }
                self.state = Some((next, next_node, next_desc));
                self.index = 0;
                continue;
            }

            if self.remaining == 0 {
                return Err(corrupt(
                    *node_id,
                    "leaf walk exceeded the tree's record count (sibling cycle?)",
                ));
            }
            self.remaining -= 1;

            let range = record_range(node, desc.record_count, self.index)?;
            let (key, payload) = self.tree.split_record(*node_id, &node[range], false)?;
            self.index += 1;
            return Ok(Some((key.to_vec(), payload.to_vec())));
        }
    }
}

impl<S: ByteDevice> Iterator for LeafIter<'_, S> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(err) => {
                self.state = None; // fuse after an error
                Some(Err(err))
            }
        }
    }
}
