//! # Transactions
//!
//! A transaction is the unit of mutation: it owns a node arena, an optional
//! root, and — when bound to a database — a snapshot of the file footer
//! taken at `begin`. The snapshot is the transaction's view of the world:
//! the root is loaded lazily from `snapshot.root_off` on first use, and
//! commit validates the file against the snapshot before writing.
//!
//! ## Lifecycle
//!
//! ```text
//! create -> begin -> put/get/delete/cursor -> commit | rollback -> (reuse)
//! ```
//!
//! `commit` and `rollback` both return the transaction to idle and empty
//! the arena; a failed commit consumes the in-memory state too, so callers
//! that want to retry must rebuild their mutations after a fresh `begin`.
//!
//! ## Commit protocol
//!
//! 1. RAM-only or rootless transactions just reset: there is nothing to
//!    persist.
//! 2. Re-read the footer. If the file size changed since `begin`, or the
//!    tail transaction id does not precede this transaction's expected id,
//!    refuse with `Modified` — another writer got there first.
//! 3. Place the block: inside the reclaimed gap when it is large enough
//!    for the arena's accounted bytes (a conservative bound on the
//!    serialized size), otherwise appended at end of file.
//! 4. Lay out and emit the reachable subtree into the write buffer.
//! 5. When appending, transaction block and footer leave in one contiguous
//!    write, so a crash can only produce a truncated tail that root
//!    discovery skips. When gap-filling, the block is written into the gap
//!    and the footer separately at end of file.
//!
//! Durability is the footer: a transaction exists once its footer's
//! signature is fully on disk, and not before.

use eyre::{bail, Result, WrapErr};
use zerocopy::IntoBytes;

use crate::config::{BLOCK_FOOTER, BLOCK_TRANSACTION, FOOTER_SIZE, SIGNATURE, TR_HEADER_SIZE};
use crate::database::Database;
use crate::error::StoreError;
use crate::memory::NodeArena;
use crate::storage::codec;
use crate::storage::format::TrHeader;
use crate::trie::node::NodeId;
use crate::trie::ops;

/// Footer state captured at `begin`.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Snapshot {
    pub filesize: u64,
    pub root_off: u64,
    /// Transaction id this commit will write: tail id + 1, or 0 on an
    /// empty file.
    pub next_id: u64,
}

pub struct Transaction<'db> {
    db: Option<&'db Database>,
    arena: NodeArena,
    root: Option<NodeId>,
    started: bool,
    snapshot: Snapshot,
}

impl<'db> Transaction<'db> {
    pub(crate) fn new(db: Option<&'db Database>, limit: usize, dynalloc: bool) -> Result<Self> {
        let arena = if dynalloc {
            NodeArena::dynamic(limit)
        } else {
            NodeArena::fixed(limit)?
        };
        Ok(Self {
            db,
            arena,
            root: None,
            started: false,
            snapshot: Snapshot::default(),
        })
    }

    /// Transaction with no backing database: a bounded or unbounded
    /// in-memory ordered map with the same API.
    pub fn in_memory() -> Transaction<'static> {
        Transaction {
            db: None,
            arena: NodeArena::dynamic(usize::MAX),
            root: None,
            started: false,
            snapshot: Snapshot::default(),
        }
    }

    /// RAM-only transaction with an explicit arena ceiling and mode.
    pub fn in_memory_with(limit: usize, dynalloc: bool) -> Result<Transaction<'static>> {
        Transaction::new(None, limit, dynalloc)
    }

    /// Mark the transaction started, snapshotting the database footer.
    /// Calling `begin` on a started transaction is a no-op.
    pub fn begin(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        if let Some(db) = self.db {
            let info = db
                .file()
                .read_info()
                .wrap_err("failed to read footer at transaction begin")?;
            self.snapshot = Snapshot {
                filesize: info.filesize,
                root_off: info.footer.root_off.get(),
                next_id: if info.filesize == 0 {
                    0
                } else {
                    info.footer.transaction_id.get() + 1
                },
            };
        }
        self.started = true;
        Ok(())
    }

    pub fn put(&mut self, key: &[u8], val: &[u8]) -> Result<()> {
        ops::put(self, key, val)
    }

    pub fn get(&mut self, key: &[u8]) -> Result<Option<&[u8]>> {
        ops::get(self, key)
    }

    /// Remove `key`. With `prefix` set, removes every key that starts with
    /// the argument instead. Returns whether anything was removed.
    pub fn delete(&mut self, key: &[u8], prefix: bool) -> Result<bool> {
        ops::delete(self, key, prefix)
    }

    /// Discard all in-memory mutations and return to idle.
    pub fn rollback(&mut self) -> Result<()> {
        self.reset();
        Ok(())
    }

    /// Persist the transaction's trie as one new block and footer.
    pub fn commit(&mut self) -> Result<()> {
        self.commit_with_gap(None)
    }

    /// Commit, optionally publishing a new gap end in the footer. Vacuum
    /// uses the override to mark a reclaimed region in the same write that
    /// makes its rewrite durable.
    pub(crate) fn commit_with_gap(&mut self, gap_end_override: Option<u64>) -> Result<()> {
        if !self.started {
            bail!(StoreError::NotStarted);
        }
        let result = self.try_commit(gap_end_override);
        // the committing transaction is consumed, success or not
        self.reset();
        result
    }

    fn try_commit(&mut self, gap_end_override: Option<u64>) -> Result<()> {
        let Some(db) = self.db else {
            return Ok(());
        };
        let Some(root) = self.root else {
            // nothing was written; an empty commit is a rollback
            return Ok(());
        };

        let mut file = db.file();
        let info = file
            .read_info()
            .wrap_err("failed to re-read footer before commit")?;

        if info.filesize != self.snapshot.filesize {
            bail!(StoreError::Modified);
        }

        let mut footer = info.footer;
        let (transaction_off, append) = if info.filesize > 0 {
            if info.footer.transaction_id.get() + 1 != self.snapshot.next_id {
                bail!(StoreError::Modified);
            }
            let gap = footer.gap_end.get().saturating_sub(footer.gap_begin.get());
            if gap >= self.arena.allocated() as u64 {
                (footer.gap_begin.get(), false)
            } else {
                (info.filesize, true)
            }
        } else {
            (0, true)
        };
        footer.block_type = BLOCK_FOOTER;
        footer.signature = SIGNATURE;
        footer.transaction_id.set(self.snapshot.next_id);

        let first_node_off = transaction_off + TR_HEADER_SIZE as u64;
        let (order, end_off) = codec::plan_subtree(&mut self.arena, root, first_node_off)?;
        let tx_size = end_off - transaction_off;

        footer.root_off.set(first_node_off);
        footer.transaction_size.set(tx_size);
        if let Some(gap_end) = gap_end_override {
            footer.gap_end.set(gap_end);
        }

        if append {
            let total = tx_size as usize + FOOTER_SIZE;
            file.write_buf.ensure(total)?;
            let header = TrHeader::new(BLOCK_TRANSACTION, end_off);
            {
                let buf = file.write_buf.slice_mut(total);
                buf[..TR_HEADER_SIZE].copy_from_slice(header.as_bytes());
                codec::emit_subtree(&self.arena, &order, &mut buf[..tx_size as usize], transaction_off);
                buf[tx_size as usize..].copy_from_slice(footer.as_bytes());
            }
            file.flush_buf_at(transaction_off, total)?;
        } else {
            footer.gap_begin.set(footer.gap_begin.get() + tx_size);
            let total = tx_size as usize;
            file.write_buf.ensure(total)?;
            let header = TrHeader::new(BLOCK_TRANSACTION, info.filesize);
            {
                let buf = file.write_buf.slice_mut(total);
                buf[..TR_HEADER_SIZE].copy_from_slice(header.as_bytes());
                codec::emit_subtree(&self.arena, &order, buf, transaction_off);
            }
            file.flush_buf_at(transaction_off, total)?;
            file.write_all_at(footer.as_bytes(), info.filesize)?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.arena.reset();
        self.root = None;
        self.started = false;
    }

    // internals shared with the trie, cursor, and vacuum

    #[inline]
    pub(crate) fn is_started(&self) -> bool {
        self.started
    }

    #[inline]
    pub(crate) fn arena(&self) -> &NodeArena {
        &self.arena
    }

    #[inline]
    pub(crate) fn arena_mut(&mut self) -> &mut NodeArena {
        &mut self.arena
    }

    #[inline]
    pub(crate) fn root_id(&self) -> Option<NodeId> {
        self.root
    }

    pub(crate) fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }

    pub(crate) fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// The transaction's root, reading it from disk on first use when the
    /// database was non-empty at `begin`.
    pub(crate) fn load_root(&mut self) -> Result<Option<NodeId>> {
        if self.root.is_some() {
            return Ok(self.root);
        }
        if let Some(db) = self.db {
            if self.snapshot.filesize > 0 {
                let id = {
                    let file = db.file();
                    codec::read_node(&file, &mut self.arena, self.snapshot.root_off)?
                };
                self.root = Some(id);
                return Ok(self.root);
            }
        }
        Ok(None)
    }

    /// Fault a node in from the database file.
    pub(crate) fn read_node_at(&mut self, off: u64) -> Result<NodeId> {
        let Some(db) = self.db else {
            bail!(StoreError::Empty);
        };
        let file = db.file();
        codec::read_node(&file, &mut self.arena, off)
    }

    /// Child of `id` at index `sym`: the resident child if there is one,
    /// otherwise the on-disk child faulted in and cached in `next`.
    pub(crate) fn child(&mut self, id: NodeId, sym: u8) -> Result<Option<NodeId>> {
        let slot = sym as usize;
        if let Some(child) = self.arena.node(id).next[slot] {
            return Ok(Some(self.arena.resolve(child)));
        }
        let foff = self.arena.node(id).fnext[slot];
        if foff != 0 && self.db.is_some() {
            let child = self.read_node_at(foff)?;
            self.arena.node_mut(id).next[slot] = Some(child);
            return Ok(Some(child));
        }
        Ok(None)
    }
}
