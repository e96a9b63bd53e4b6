//! # Node Arena Implementation
//!
//! Nodes are addressed by [`NodeId`] (a 1-based `NonZeroU32`) rather than by
//! pointer, so child tables store `Option<NodeId>` in four bytes and the
//! arena can be torn down or reset without walking the tree: dropping the
//! node vector frees every node, reachable or not, including nodes that
//! were forwarded away or detached by deletes.
//!
//! ## Accounting
//!
//! Each allocation is charged its full in-memory footprint: the node struct,
//! both 256-slot child tables, and the payload bytes. The charge is checked
//! against the ceiling before anything is written, so a refused allocation
//! has no side effects.
//!
//! ## Fixed slab
//!
//! Fixed mode reserves the slab once with `try_reserve_exact` (a failed
//! reservation is an `OutOfMemory` error, not an abort) and never reallocates
//! it afterwards: payload ranges are handed out at [`SLAB_ALIGN`]-byte
//! boundaries from a bump cursor. Node payloads reference the slab by
//! offset, which keeps them valid across node-vector growth.

use eyre::{bail, eyre, Result, WrapErr};
use smallvec::SmallVec;

use crate::config::SLAB_ALIGN;
use crate::error::StoreError;
use crate::trie::node::{NodeId, Payload, TrieNode};

/// Fixed per-node footprint charged to the ceiling: the node struct plus its
/// boxed child tables.
fn node_base_cost() -> usize {
    std::mem::size_of::<TrieNode>()
        + 256 * (std::mem::size_of::<Option<NodeId>>() + std::mem::size_of::<u64>())
}

#[derive(Debug)]
struct Slab {
    buf: Vec<u8>,
}

#[derive(Debug)]
pub struct NodeArena {
    nodes: Vec<TrieNode>,
    slab: Option<Slab>,
    limit: usize,
    allocated: usize,
}

impl NodeArena {
    /// Arena that allocates each node on demand, up to `limit` bytes.
    pub fn dynamic(limit: usize) -> Self {
        Self {
            nodes: Vec::new(),
            slab: None,
            limit,
            allocated: 0,
        }
    }

    /// Arena backed by a pre-reserved slab of `limit` bytes.
    pub fn fixed(limit: usize) -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(limit).map_err(|_| {
            eyre!(StoreError::OutOfMemory {
                requested: limit,
                limit,
            })
        })?;
        Ok(Self {
            nodes: Vec::new(),
            slab: Some(Slab { buf }),
            limit,
            allocated: 0,
        })
    }

    /// Bytes charged so far.
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Number of live node slots (includes forwarded-from and detached
    /// nodes until the next reset).
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Allocate a node from prefix, value, and metadata parts.
    pub(crate) fn alloc_parts(
        &mut self,
        flags: u8,
        prefix: &[u8],
        val: &[u8],
        meta: &[u8],
    ) -> Result<NodeId> {
        let total = prefix.len() + val.len() + meta.len();
        let cost = node_base_cost() + total;
        if self.allocated + cost > self.limit {
            bail!(StoreError::OutOfMemory {
                requested: cost,
                limit: self.limit,
            });
        }

        let payload = match &mut self.slab {
            None => {
                let mut buf = SmallVec::with_capacity(total);
                buf.extend_from_slice(prefix);
                buf.extend_from_slice(val);
                buf.extend_from_slice(meta);
                Payload::Inline(buf)
            }
            Some(slab) => {
                let pad = (SLAB_ALIGN - slab.buf.len() % SLAB_ALIGN) % SLAB_ALIGN;
                if slab.buf.len() + pad + total > self.limit {
                    bail!(StoreError::OutOfMemory {
                        requested: pad + total,
                        limit: self.limit,
                    });
                }
                slab.buf.resize(slab.buf.len() + pad, 0);
                let off = u32::try_from(slab.buf.len())
                    .wrap_err("fixed slab offset exceeds u32 range")?;
                slab.buf.extend_from_slice(prefix);
                slab.buf.extend_from_slice(val);
                slab.buf.extend_from_slice(meta);
                Payload::Slab { off }
            }
        };

        let mut node = TrieNode::new(flags, payload);
        node.prefix_size = prefix.len() as u32;
        node.val_size = val.len() as u32;
        node.meta_size = meta.len() as u32;

        let raw = u32::try_from(self.nodes.len() + 1)
            .ok()
            .and_then(NodeId::new)
            .ok_or_else(|| eyre!("node arena id space exhausted"))?;
        self.nodes.push(node);
        self.allocated += cost;
        Ok(raw)
    }

    /// Allocate a node from a contiguous `prefix | value | meta` payload, as
    /// decoded from disk.
    pub(crate) fn alloc_payload(
        &mut self,
        flags: u8,
        prefix_size: u32,
        val_size: u32,
        meta_size: u32,
        payload: &[u8],
    ) -> Result<NodeId> {
        let split_a = prefix_size as usize;
        let split_b = split_a + val_size as usize;
        let id = self.alloc_parts(
            flags,
            &payload[..split_a],
            &payload[split_a..split_b],
            &payload[split_b..],
        )?;
        debug_assert_eq!(self.node(id).meta_size, meta_size);
        Ok(id)
    }

    #[inline]
    pub(crate) fn node(&self, id: NodeId) -> &TrieNode {
        &self.nodes[id.get() as usize - 1]
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut TrieNode {
        &mut self.nodes[id.get() as usize - 1]
    }

    /// Full payload bytes of a node: prefix, value, metadata.
    pub(crate) fn payload(&self, id: NodeId) -> &[u8] {
        let node = self.node(id);
        let len = node.payload_len();
        match &node.payload {
            Payload::Inline(buf) => &buf[..len],
            Payload::Slab { off } => {
                let off = *off as usize;
                match &self.slab {
                    Some(slab) => &slab.buf[off..off + len],
                    None => &[],
                }
            }
        }
    }

    pub(crate) fn prefix(&self, id: NodeId) -> &[u8] {
        let n = self.node(id).prefix_size as usize;
        &self.payload(id)[..n]
    }

    pub(crate) fn val(&self, id: NodeId) -> &[u8] {
        let node = self.node(id);
        let start = node.prefix_size as usize;
        let end = start + node.val_size as usize;
        &self.payload(id)[start..end]
    }

    /// Mutable view of a node's value bytes. The only in-place mutation in
    /// the engine: a same-length overwrite writes through this.
    pub(crate) fn val_mut(&mut self, id: NodeId) -> &mut [u8] {
        let idx = id.get() as usize - 1;
        let (start, end, slab_off) = {
            let node = &self.nodes[idx];
            let start = node.prefix_size as usize;
            let end = start + node.val_size as usize;
            let slab_off = match &node.payload {
                Payload::Slab { off } => Some(*off as usize),
                Payload::Inline(_) => None,
            };
            (start, end, slab_off)
        };
        if let Some(off) = slab_off {
            return match &mut self.slab {
                Some(slab) => &mut slab.buf[off + start..off + end],
                None => &mut [],
            };
        }
        match &mut self.nodes[idx].payload {
            Payload::Inline(buf) => &mut buf[start..end],
            Payload::Slab { .. } => &mut [],
        }
    }

    /// Follow a forwarding chain to the terminal replacement.
    pub(crate) fn resolve(&self, mut id: NodeId) -> NodeId {
        while let Some(next) = self.node(id).replaced_by {
            id = next;
        }
        id
    }

    /// Mark `old` as replaced by `new`.
    pub(crate) fn forward(&mut self, old: NodeId, new: NodeId) {
        self.node_mut(old).replaced_by = Some(new);
    }

    /// Copy both child tables of `src` into `dst`.
    pub(crate) fn clone_children(&mut self, dst: NodeId, src: NodeId) {
        let (next, fnext) = {
            let s = self.node(src);
            (s.next.clone(), s.fnext.clone())
        };
        let d = self.node_mut(dst);
        d.next = next;
        d.fnext = fnext;
    }

    /// Drop every node and reset accounting. In fixed mode the slab keeps
    /// its reservation and only the bump cursor moves back.
    pub fn reset(&mut self) {
        self.nodes.clear();
        if let Some(slab) = &mut self.slab {
            slab.buf.clear();
        }
        self.allocated = 0;
    }
}
