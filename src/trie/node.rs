//! # In-Memory Trie Node
//!
//! A node owns one edge label (its prefix), an optional inline value, and a
//! dense 256-way child table. Children live in one of two parallel tables:
//!
//! ```text
//! next[b]   resident child for byte b, as an arena NodeId
//! fnext[b]  on-disk child for byte b, as a file offset (0 = absent)
//! ```
//!
//! A child slot uses either table or neither; a resident entry shadows the
//! on-disk entry for the same byte. Dense tables trade memory for
//! constant-time descent, which is what keeps the walk-by-byte loops branch
//! free on the hot path.
//!
//! Mutations are copy-on-write: a modified node is rebuilt as a fresh
//! allocation and the old node is forwarded to it through `replaced_by`.
//! Every traversal resolves forwarding chains before reading any field, so
//! stale roots and in-flight walks keep observing consistent trees.
//!
//! The prefix, value, and metadata bytes are stored back to back in a single
//! payload buffer, mirroring the serialized layout. In a fixed-slab arena
//! the payload is a range into the arena's slab instead of an owned buffer;
//! all access goes through the arena, which resolves either representation.

use std::num::NonZeroU32;

use smallvec::SmallVec;

use crate::config::{NODE_HAS_META, NODE_HAS_VAL};

/// Arena handle to a node. Ids are 1-based so child tables can store
/// `Option<NodeId>` in four bytes.
pub type NodeId = NonZeroU32;

/// Payload storage for one node: prefix bytes, then value bytes, then
/// metadata bytes.
#[derive(Debug)]
pub(crate) enum Payload {
    /// Individually owned buffer (dynamic arena mode). Short payloads stay
    /// inline in the node itself.
    Inline(SmallVec<[u8; 24]>),
    /// Byte offset into the arena's fixed slab.
    Slab { off: u32 },
}

#[derive(Debug)]
pub struct TrieNode {
    pub(crate) flags: u8,
    pub(crate) prefix_size: u32,
    pub(crate) val_size: u32,
    pub(crate) meta_size: u32,

    /// On-disk footprint and offset; zero until a commit plans them.
    pub(crate) disk_size: u64,
    pub(crate) disk_off: u64,
    /// Populated child count, computed while planning a commit.
    pub(crate) nsubnodes: u16,

    /// Forwarding pointer to this node's replacement, if it is stale.
    pub(crate) replaced_by: Option<NodeId>,

    pub(crate) next: Box<[Option<NodeId>; 256]>,
    pub(crate) fnext: Box<[u64; 256]>,

    pub(crate) payload: Payload,
}

impl TrieNode {
    pub(crate) fn new(flags: u8, payload: Payload) -> Self {
        Self {
            flags,
            prefix_size: 0,
            val_size: 0,
            meta_size: 0,
            disk_size: 0,
            disk_off: 0,
            nsubnodes: 0,
            replaced_by: None,
            next: Box::new([None; 256]),
            fnext: Box::new([0; 256]),
            payload,
        }
    }

    #[inline]
    pub(crate) fn has_val(&self) -> bool {
        self.flags & NODE_HAS_VAL != 0
    }

    #[inline]
    pub(crate) fn has_meta(&self) -> bool {
        self.flags & NODE_HAS_META != 0
    }

    #[inline]
    pub(crate) fn payload_len(&self) -> usize {
        (self.prefix_size + self.val_size + self.meta_size) as usize
    }

    /// True if any child slot is populated, resident or on disk.
    pub(crate) fn has_children(&self) -> bool {
        (0..256).any(|i| self.next[i].is_some() || self.fnext[i] != 0)
    }

    /// The index byte of the only child, if the node has exactly one.
    pub(crate) fn sole_child_sym(&self) -> Option<u8> {
        let mut found = None;
        for i in 0..256 {
            if self.next[i].is_some() || self.fnext[i] != 0 {
                if found.is_some() {
                    return None;
                }
                found = Some(i as u8);
            }
        }
        found
    }

    /// Count of populated child slots, as serialized in the node header.
    pub(crate) fn count_children(&self) -> u16 {
        (0..256)
            .filter(|&i| self.next[i].is_some() || self.fnext[i] != 0)
            .count() as u16
    }
}
