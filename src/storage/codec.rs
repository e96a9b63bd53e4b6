//! # Disk Node Codec
//!
//! Encoding and decoding of trie nodes, and the layout pass a commit runs
//! over the reachable subtree.
//!
//! ## Child table encodings
//!
//! A node's children are serialized in one of two forms, chosen by child
//! count against the shared threshold:
//!
//! ```text
//! compact (nsubnodes <= 224):
//!   [symbol u8] * nsubnodes | [offset u64] * nsubnodes
//!
//! dense (nsubnodes > 224):
//!   [offset u64] * 256          (zero = absent)
//! ```
//!
//! At 224 children the compact form reaches 224 * 9 = 2016 bytes, just
//! under the dense form's fixed 2048; past that the dense form is both
//! smaller and cheaper to decode.
//!
//! ## Layout
//!
//! A commit lays the reachable nodes out in preorder: the root sits right
//! after the 9-byte transaction header, and every node is followed by its
//! first child's subtree, then the next child's, and so on. Offsets are
//! assigned in one descent; as each child's offset becomes known it is
//! written back into the parent's `fnext` slot, so by emission time every
//! child reference — freshly written or reused from an older transaction —
//! is a final file offset. Unmodified subtrees keep their old offsets,
//! which is how commits share structure with their predecessors.

use eyre::Result;
use zerocopy::IntoBytes;

use crate::config::{
    DISK_NODE_HEADER_SIZE, NODE_HAS_META, NODE_HAS_VAL, READ_BLOCK_SIZE, SUBNODES_COMPACT_MAX,
};
use crate::error::corrupted;
use crate::memory::NodeArena;
use crate::storage::file::DbFile;
use crate::storage::format::DiskNodeHeader;
use crate::trie::node::{NodeId, TrieNode};

/// Serialized size of the child table for `nsubnodes` children.
fn child_table_size(nsubnodes: u16) -> u64 {
    if nsubnodes > SUBNODES_COMPACT_MAX {
        256 * 8
    } else {
        nsubnodes as u64 * 9
    }
}

fn disk_size_of(node: &TrieNode) -> (u16, u64) {
    let nsubnodes = node.count_children();
    let mut size = DISK_NODE_HEADER_SIZE as u64;
    if node.has_val() {
        size += 4;
    }
    if node.has_meta() {
        size += 4;
    }
    size += child_table_size(nsubnodes);
    size += node.payload_len() as u64;
    (nsubnodes, size)
}

fn assign(arena: &mut NodeArena, id: NodeId, node_off: &mut u64, order: &mut Vec<NodeId>) {
    let (nsubnodes, size) = disk_size_of(arena.node(id));
    let node = arena.node_mut(id);
    node.nsubnodes = nsubnodes;
    node.disk_size = size;
    node.disk_off = *node_off;
    *node_off += size;
    order.push(id);
}

/// Walk the subtree under `root`, computing each reachable node's on-disk
/// size and assigning preorder offsets starting at `first_node_off`.
/// Returns the emission order and the offset one past the last node.
pub(crate) fn plan_subtree(
    arena: &mut NodeArena,
    root: NodeId,
    first_node_off: u64,
) -> Result<(Vec<NodeId>, u64)> {
    let mut order = Vec::new();
    let mut node_off = first_node_off;

    let root = arena.resolve(root);
    assign(arena, root, &mut node_off, &mut order);

    let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];
    while let Some(&(id, start)) = stack.last() {
        let found = {
            let node = arena.node(id);
            (start..256).find_map(|i| node.next[i].map(|c| (i, c)))
        };
        match found {
            Some((i, child)) => {
                let child = arena.resolve(child);
                assign(arena, child, &mut node_off, &mut order);
                let child_off = arena.node(child).disk_off;
                arena.node_mut(id).fnext[i] = child_off;
                if let Some(top) = stack.last_mut() {
                    top.1 = i + 1;
                }
                stack.push((child, 0));
            }
            None => {
                stack.pop();
            }
        }
    }

    Ok((order, node_off))
}

/// Emit every planned node into `out` at its assigned position relative to
/// `transaction_off`. The buffer must already span the planned sizes.
pub(crate) fn emit_subtree(
    arena: &NodeArena,
    order: &[NodeId],
    out: &mut [u8],
    transaction_off: u64,
) {
    for &id in order {
        let node = arena.node(id);
        let pos = (node.disk_off - transaction_off) as usize;
        let size = node.disk_size as usize;
        let dst = &mut out[pos..pos + size];

        let header = DiskNodeHeader::new(
            node.disk_size as u32,
            node.flags,
            node.nsubnodes,
            node.prefix_size,
        );
        dst[..DISK_NODE_HEADER_SIZE].copy_from_slice(header.as_bytes());
        let mut p = DISK_NODE_HEADER_SIZE;

        if node.has_val() {
            dst[p..p + 4].copy_from_slice(&node.val_size.to_le_bytes());
            p += 4;
        }
        if node.has_meta() {
            dst[p..p + 4].copy_from_slice(&node.meta_size.to_le_bytes());
            p += 4;
        }

        if node.nsubnodes > SUBNODES_COMPACT_MAX {
            for i in 0..256 {
                dst[p..p + 8].copy_from_slice(&node.fnext[i].to_le_bytes());
                p += 8;
            }
        } else {
            let nsubnodes = node.nsubnodes as usize;
            let mut sym_p = p;
            let mut off_p = p + nsubnodes;
            for i in 0..256 {
                if node.fnext[i] != 0 {
                    dst[sym_p] = i as u8;
                    sym_p += 1;
                    dst[off_p..off_p + 8].copy_from_slice(&node.fnext[i].to_le_bytes());
                    off_p += 8;
                }
            }
            p = off_p;
        }

        let payload = arena.payload(id);
        debug_assert_eq!(p + payload.len(), size);
        dst[p..].copy_from_slice(payload);
    }
}

/// Fault a node in from disk at `off`, allocating it in `arena`. The node
/// arrives with `fnext` pointing at its on-disk children and an empty
/// resident table.
pub(crate) fn read_node(file: &DbFile, arena: &mut NodeArena, off: u64) -> Result<NodeId> {
    let mut probe = [0u8; READ_BLOCK_SIZE];
    let got = file.read_probe_at(&mut probe, off)?;
    if got < DISK_NODE_HEADER_SIZE {
        return Err(corrupted("node header extends past end of file"));
    }

    let header = DiskNodeHeader::from_bytes(&probe[..DISK_NODE_HEADER_SIZE])?;
    let size = header.size.get() as usize;
    if size < DISK_NODE_HEADER_SIZE {
        return Err(corrupted("node size smaller than its header"));
    }

    let mut heap;
    let bytes: &[u8] = if size <= got {
        &probe[..size]
    } else {
        heap = vec![0u8; size];
        heap[..got].copy_from_slice(&probe[..got]);
        file.read_exact_at(&mut heap[got..], off + got as u64)?;
        &heap
    };

    let flags = header.flags;
    let nsubnodes = header.nsubnodes.get();
    let prefix_size = header.prefix_size.get();
    let mut p = DISK_NODE_HEADER_SIZE;

    let mut val_size = 0u32;
    if flags & NODE_HAS_VAL != 0 {
        if p + 4 > size {
            return Err(corrupted("node value length extends past node size"));
        }
        val_size = u32::from_le_bytes([bytes[p], bytes[p + 1], bytes[p + 2], bytes[p + 3]]);
        p += 4;
    }
    let mut meta_size = 0u32;
    if flags & NODE_HAS_META != 0 {
        if p + 4 > size {
            return Err(corrupted("node metadata length extends past node size"));
        }
        meta_size = u32::from_le_bytes([bytes[p], bytes[p + 1], bytes[p + 2], bytes[p + 3]]);
        p += 4;
    }

    let mut fnext = [0u64; 256];
    if nsubnodes > SUBNODES_COMPACT_MAX {
        if p + 256 * 8 > size {
            return Err(corrupted("dense child table extends past node size"));
        }
        for slot in fnext.iter_mut() {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[p..p + 8]);
            *slot = u64::from_le_bytes(raw);
            p += 8;
        }
    } else {
        let n = nsubnodes as usize;
        if p + n * 9 > size {
            return Err(corrupted("compact child table extends past node size"));
        }
        let symbols = &bytes[p..p + n];
        let mut off_p = p + n;
        for &sym in symbols {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[off_p..off_p + 8]);
            fnext[sym as usize] = u64::from_le_bytes(raw);
            off_p += 8;
        }
        p += n * 9;
    }

    let payload_len = prefix_size as usize + val_size as usize + meta_size as usize;
    if p + payload_len != size {
        return Err(corrupted("node payload inconsistent with declared size"));
    }

    let id = arena.alloc_payload(flags, prefix_size, val_size, meta_size, &bytes[p..])?;
    arena.node_mut(id).fnext = Box::new(fnext);
    Ok(id)
}
