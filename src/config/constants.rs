//! # TrieKV Format and Engine Constants
//!
//! ## On-disk format constants
//!
//! The database file is a sequence of typed blocks:
//!
//! ```text
//! +--------------------+--------+--------------------+--------+
//! | transaction block  | footer | transaction block  | footer | ...
//! +--------------------+--------+--------------------+--------+
//! ```
//!
//! Every multi-byte integer in the file is little-endian. The last
//! [`FOOTER_SIZE`] bytes of the file are the live footer; its signature is
//! the durability marker for the final transaction.
//!
//! ## Dependency notes
//!
//! ```text
//! SUBNODES_COMPACT_MAX (224)
//!       |
//!       +-> chosen so the compact child encoding (1 symbol byte + 8 offset
//!           bytes per child) never exceeds the dense encoding (256 * 8
//!           bytes): 256 - 256/8 = 224. Writer and reader MUST share this
//!           threshold; a mismatch makes child tables undecodable.
//!
//! FOOTER_SIZE (49) = type(1) + signature(8) + root_off(8)
//!                  + transaction_size(8) + transaction_id(8)
//!                  + gap_begin(8) + gap_end(8)
//!
//! TR_HEADER_SIZE (9) = type(1) + footer_off(8)
//!
//! DISK_NODE_HEADER_SIZE (11) = size(4) + type(1) + nsubnodes(2)
//!                            + prefix_size(4)
//! ```
//!
//! Changing any of these invalidates every existing database file.

/// File format signature, stored in every footer. Inherited from the tkvdb
/// version 3 format for file-level compatibility.
pub const SIGNATURE: [u8; 8] = *b"tkvdb003";

/// Block type tag: a serialized transaction (header + nodes).
pub const BLOCK_TRANSACTION: u8 = 0;
/// Block type tag: a live transaction footer.
pub const BLOCK_FOOTER: u8 = 1;
/// Block type tag: a footer whose transaction was reclaimed by vacuum.
pub const BLOCK_REMOVED_FOOTER: u8 = 2;

/// Node flag: the node carries a value.
pub const NODE_HAS_VAL: u8 = 1 << 0;
/// Node flag: the node carries metadata. Reserved by the format; no
/// operation currently sets it.
pub const NODE_HAS_META: u8 = 1 << 1;

/// Largest child count encoded compactly as `(symbol[], offset[])` pairs.
/// Above this, children are written as a dense array of 256 offsets.
pub const SUBNODES_COMPACT_MAX: u16 = (256 - 256 / 8) as u16;

/// Size of a serialized footer in bytes.
pub const FOOTER_SIZE: usize = 49;

/// Size of a serialized transaction header in bytes.
pub const TR_HEADER_SIZE: usize = 9;

/// Size of the fixed part of a serialized trie node in bytes.
pub const DISK_NODE_HEADER_SIZE: usize = 11;

/// First-read probe size when faulting a node in from disk. Most nodes fit
/// in one probe; larger ones cost a second positioned read for the tail.
pub const READ_BLOCK_SIZE: usize = 4096;

/// Inline capacity of the cursor descent stack, in frames. One frame is
/// consumed per trie edge, so this covers keys traversing up to 128 nodes
/// without a heap allocation; deeper descents spill to the heap.
pub const CURSOR_STACK_INLINE: usize = 128;

/// Alignment of payload allocations inside a fixed-slab arena.
pub const SLAB_ALIGN: usize = 16;

const _: () = assert!(SUBNODES_COMPACT_MAX == 224);
const _: () = assert!(FOOTER_SIZE == 1 + 8 + 5 * 8);
const _: () = assert!(TR_HEADER_SIZE == 1 + 8);
const _: () = assert!(DISK_NODE_HEADER_SIZE == 4 + 1 + 2 + 4);
const _: () = assert!(SLAB_ALIGN.is_power_of_two());
