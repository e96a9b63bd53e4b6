//! # TrieKV - Embedded Ordered Key-Value Store
//!
//! TrieKV is an embedded, ordered key-value store built around an in-memory
//! radix (Patricia) trie persisted as an append-only, copy-on-write log of
//! trie subgraphs. Keys and values are arbitrary byte strings; keys order
//! by unsigned byte comparison.
//!
//! ## Quick Start
//!
//! ```ignore
//! use triekv::{Cursor, Database, SeekMode};
//!
//! let db = Database::open("./data.tkv")?;
//!
//! let mut tr = db.transaction()?;
//! tr.begin()?;
//! tr.put(b"user:1", b"alice")?;
//! tr.put(b"user:2", b"bob")?;
//! tr.commit()?;
//!
//! let mut tr = db.transaction()?;
//! tr.begin()?;
//! let mut cursor = Cursor::new(&mut tr);
//! let mut found = cursor.seek(b"user:", SeekMode::Ge)?;
//! while found {
//!     println!("{:?} = {:?}", cursor.key(), cursor.val());
//!     found = cursor.next()?;
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +-------------------------------------------+
//! |      Database (file + params + lock)      |
//! +-------------------------------------------+
//! |  Transaction (arena, root, snapshot)      |
//! |     put / get / delete       Cursor       |
//! +-------------------------------------------+
//! |  Radix trie (COW nodes, forwarding)       |
//! +-------------------------------------------+
//! |  Codec (preorder layout, node encoding)   |
//! +-------------------------------------------+
//! |  Append-preferred log file + footer tail  |
//! +-------------------------------------------+
//! ```
//!
//! A committed transaction is one contiguous block of serialized nodes
//! followed by a fixed-size footer; the footer at the file tail names the
//! live root. Unmodified subtrees are shared with older transactions by
//! file offset, so a commit writes only what changed. The [`vacuum`]
//! operation rewrites the still-live subset of the oldest block and marks
//! its region reclaimable for future commits.
//!
//! ## Model
//!
//! Single-process, single-writer, synchronous. Transactions snapshot the
//! file tail at `begin`; the first commit wins and concurrent commits fail
//! with [`StoreError::Modified`]. Crash durability is footer-atomic: a
//! transaction exists once its footer is fully on disk, and a torn write
//! leaves the previous tail authoritative.
//!
//! ## Module Overview
//!
//! - [`database`]: the `Database` handle, open parameters, tail info
//! - [`transaction`]: transaction lifecycle and the commit protocol
//! - [`cursor`]: ordered traversal and seek
//! - [`trie`]: the in-memory radix trie and its mutations
//! - [`memory`]: per-transaction node arenas (dynamic and fixed slab)
//! - [`storage`]: on-disk format, file I/O, node codec
//! - [`vacuum`]: space reclamation

pub mod config;
pub mod cursor;
pub mod database;
pub mod error;
pub mod memory;
pub mod storage;
pub mod transaction;
pub mod trie;
pub mod vacuum;

pub use cursor::{Cursor, SeekMode};
pub use database::{Database, DbInfo, DbParams};
pub use error::StoreError;
pub use transaction::Transaction;
pub use vacuum::vacuum;
