//! # Ordered Cursor
//!
//! Traversal over a transaction's trie in byte-lexicographic key order. The
//! cursor keeps an explicit descent stack of `(node, child index)` frames
//! and a prefix buffer that accumulates the key along the descent; nodes
//! referenced only by file offset are faulted in transparently as the
//! cursor moves through them.
//!
//! ## Ordering
//!
//! Keys sort as unsigned byte strings. A key that is a proper prefix of
//! another collates first: within one node, the value (frame index `-1`)
//! comes before every child (frame indices `0..=255`), because the value
//! stands for the exact path key while children stand for strictly longer
//! keys.
//!
//! ## Frame discipline
//!
//! The prefix buffer holds, for every frame below the top, that node's
//! edge label followed by the one-byte child index the descent took. The
//! top node's label is appended by `smallest`/`biggest` when the cursor
//! comes to rest on it, and popping a frame removes the node's label plus
//! its entry byte in one step. `seek` maintains the same discipline in
//! every branch, which is what keeps `next`/`prev` correct immediately
//! after any seek.
//!
//! ## Borrowing
//!
//! A cursor mutably borrows its transaction, so the compiler enforces the
//! validity rule for `key()`/`val()`: the returned slices live until the
//! next cursor movement, and the transaction cannot be mutated while the
//! cursor exists.

use eyre::{bail, Result};
use smallvec::SmallVec;

use crate::config::CURSOR_STACK_INLINE;
use crate::error::{corrupted, StoreError};
use crate::transaction::Transaction;
use crate::trie::node::NodeId;

/// Positioning rule for [`Cursor::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    /// Exactly the given key, or nothing.
    Eq,
    /// The largest key less than or equal to the given key.
    Le,
    /// The smallest key greater than or equal to the given key.
    Ge,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    node: NodeId,
    /// Child index last taken out of this node. `-1` means "the value at
    /// this node", which orders before child 0.
    off: i32,
}

pub struct Cursor<'tr, 'db> {
    tr: &'tr mut Transaction<'db>,
    stack: SmallVec<[Frame; CURSOR_STACK_INLINE]>,
    prefix: Vec<u8>,
    val_node: Option<NodeId>,
}

impl<'tr, 'db> Cursor<'tr, 'db> {
    pub fn new(tr: &'tr mut Transaction<'db>) -> Self {
        Self {
            tr,
            stack: SmallVec::new(),
            prefix: Vec::new(),
            val_node: None,
        }
    }

    /// Key bytes of the current position. Empty when the cursor is not
    /// positioned.
    pub fn key(&self) -> &[u8] {
        &self.prefix
    }

    pub fn key_len(&self) -> usize {
        self.prefix.len()
    }

    /// Value bytes of the current position, borrowed from the node. Valid
    /// until the cursor moves.
    pub fn val(&self) -> &[u8] {
        match self.val_node {
            Some(node) => self.tr.arena().val(node),
            None => &[],
        }
    }

    pub fn val_len(&self) -> usize {
        match self.val_node {
            Some(node) => self.tr.arena().node(node).val_size as usize,
            None => 0,
        }
    }

    /// Position at the smallest key.
    pub fn first(&mut self) -> Result<bool> {
        self.reset();
        let root = self.loaded_root()?;
        if self.is_bare_node(root) {
            return Ok(false);
        }
        self.smallest(root)?;
        Ok(true)
    }

    /// Position at the largest key.
    pub fn last(&mut self) -> Result<bool> {
        self.reset();
        let root = self.loaded_root()?;
        if self.is_bare_node(root) {
            return Ok(false);
        }
        self.biggest(root)?;
        Ok(true)
    }

    /// Advance to the next key in ascending order.
    pub fn next(&mut self) -> Result<bool> {
        loop {
            let Some(top) = self.stack.last() else {
                return Ok(false);
            };
            let node = top.node;
            let start = top.off + 1;
            if start > 255 {
                if !self.pop() {
                    return Ok(false);
                }
                continue;
            }
            match self.scan_asc(node, start)? {
                Some((off, child)) => {
                    if let Some(top) = self.stack.last_mut() {
                        top.off = off;
                    }
                    self.prefix.push(off as u8);
                    self.smallest(child)?;
                    return Ok(true);
                }
                None => {
                    if !self.pop() {
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// Step back to the previous key in descending order.
    pub fn prev(&mut self) -> Result<bool> {
        loop {
            let Some(top) = self.stack.last() else {
                return Ok(false);
            };
            let node = top.node;
            let back = top.off - 1;
            if back == -1 && self.tr.arena().node(node).has_val() {
                if let Some(top) = self.stack.last_mut() {
                    top.off = -1;
                }
                self.val_node = Some(node);
                return Ok(true);
            }
            if back < 0 {
                if !self.pop() {
                    return Ok(false);
                }
                continue;
            }
            match self.scan_desc(node, back)? {
                Some((off, child)) => {
                    if let Some(top) = self.stack.last_mut() {
                        top.off = off;
                    }
                    self.prefix.push(off as u8);
                    self.biggest(child)?;
                    return Ok(true);
                }
                None => {
                    if self.tr.arena().node(node).has_val() {
                        if let Some(top) = self.stack.last_mut() {
                            top.off = -1;
                        }
                        self.val_node = Some(node);
                        return Ok(true);
                    }
                    if !self.pop() {
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// Directed walk to `key` under the given mode. On any divergence, `Eq`
    /// resets and reports absence; `Le`/`Ge` settle on the nearest key on
    /// their side of the target.
    pub fn seek(&mut self, key: &[u8], mode: SeekMode) -> Result<bool> {
        self.reset();
        let root = self.loaded_root()?;
        if self.is_bare_node(root) {
            return Ok(false);
        }

        let mut node = root;
        let mut ki = 0usize;
        let mut pi = 0usize;

        loop {
            if ki == key.len() {
                let (prefix_size, has_val) = {
                    let n = self.tr.arena().node(node);
                    (n.prefix_size as usize, n.has_val())
                };
                if pi == prefix_size && has_val {
                    self.append_label(node);
                    self.push(node, -1);
                    return Ok(true);
                }
                // every key under this node strictly extends the target
                return match mode {
                    SeekMode::Eq => {
                        self.reset();
                        Ok(false)
                    }
                    SeekMode::Ge => {
                        self.smallest(node)?;
                        Ok(true)
                    }
                    SeekMode::Le => {
                        self.smallest(node)?;
                        self.prev()
                    }
                };
            }

            let prefix_size = self.tr.arena().node(node).prefix_size as usize;
            if pi >= prefix_size {
                let sym = key[ki];
                if let Some(child) = self.tr.child(node, sym)? {
                    self.append_label(node);
                    self.prefix.push(sym);
                    self.push(node, sym as i32);
                    node = child;
                    ki += 1;
                    pi = 0;
                    continue;
                }
                return match mode {
                    SeekMode::Eq => {
                        self.reset();
                        Ok(false)
                    }
                    SeekMode::Le => {
                        if let Some((off, child)) = self.scan_desc(node, sym as i32 - 1)? {
                            self.append_label(node);
                            self.prefix.push(off as u8);
                            self.push(node, off);
                            self.biggest(child)?;
                            return Ok(true);
                        }
                        if self.tr.arena().node(node).has_val() {
                            // the value at this node is the exact prefix
                            // key, the largest one below the target
                            self.append_label(node);
                            self.push(node, -1);
                            return Ok(true);
                        }
                        self.smallest(node)?;
                        self.prev()
                    }
                    SeekMode::Ge => {
                        if let Some((off, child)) = self.scan_asc(node, sym as i32 + 1)? {
                            self.append_label(node);
                            self.prefix.push(off as u8);
                            self.push(node, off);
                            self.smallest(child)?;
                            return Ok(true);
                        }
                        // everything under this node is below the target
                        self.biggest(node)?;
                        self.next()
                    }
                };
            }

            let label_byte = self.tr.arena().prefix(node)[pi];
            if label_byte != key[ki] {
                return match mode {
                    SeekMode::Eq => {
                        self.reset();
                        Ok(false)
                    }
                    SeekMode::Le => {
                        if label_byte < key[ki] {
                            // the whole subtree sorts below the target
                            self.biggest(node)?;
                            return Ok(true);
                        }
                        // the whole subtree sorts above: rest here with an
                        // exhausted frame and let prev back out of it
                        self.append_label(node);
                        self.push(node, -1);
                        self.prev()
                    }
                    SeekMode::Ge => {
                        if label_byte > key[ki] {
                            self.smallest(node)?;
                            return Ok(true);
                        }
                        self.append_label(node);
                        self.push(node, 255);
                        self.next()
                    }
                };
            }

            ki += 1;
            pi += 1;
        }
    }

    // internals

    fn reset(&mut self) {
        self.stack.clear();
        self.prefix.clear();
        self.val_node = None;
    }

    fn loaded_root(&mut self) -> Result<NodeId> {
        let Some(root) = self.tr.load_root()? else {
            bail!(StoreError::Empty);
        };
        Ok(self.tr.arena().resolve(root))
    }

    /// A root left valueless and childless by deletes: a present but empty
    /// trie.
    fn is_bare_node(&self, node: NodeId) -> bool {
        let n = self.tr.arena().node(node);
        !n.has_val() && !n.has_children()
    }

    fn append_label(&mut self, node: NodeId) {
        let Cursor { prefix, tr, .. } = self;
        prefix.extend_from_slice(tr.arena().prefix(node));
    }

    fn push(&mut self, node: NodeId, off: i32) {
        self.stack.push(Frame { node, off });
        self.val_node = Some(node);
    }

    /// Drop the top frame and its contribution to the prefix. The root
    /// frame stays; popping it reports exhaustion instead.
    fn pop(&mut self) -> bool {
        if self.stack.len() <= 1 {
            return false;
        }
        if let Some(frame) = self.stack.pop() {
            let erase = self.tr.arena().node(frame.node).prefix_size as usize + 1;
            self.prefix.truncate(self.prefix.len().saturating_sub(erase));
        }
        true
    }

    fn scan_asc(&mut self, node: NodeId, from: i32) -> Result<Option<(i32, NodeId)>> {
        for off in from.max(0)..256 {
            if let Some(child) = self.tr.child(node, off as u8)? {
                return Ok(Some((off, child)));
            }
        }
        Ok(None)
    }

    fn scan_desc(&mut self, node: NodeId, from: i32) -> Result<Option<(i32, NodeId)>> {
        let mut off = from.min(255);
        while off >= 0 {
            if let Some(child) = self.tr.child(node, off as u8)? {
                return Ok(Some((off, child)));
            }
            off -= 1;
        }
        Ok(None)
    }

    /// Descend to the smallest key at or below `node`, appending labels as
    /// it goes.
    fn smallest(&mut self, mut node: NodeId) -> Result<()> {
        loop {
            node = self.tr.arena().resolve(node);
            self.append_label(node);
            if self.tr.arena().node(node).has_val() {
                self.push(node, -1);
                return Ok(());
            }
            let Some((off, child)) = self.scan_asc(node, 0)? else {
                return Err(corrupted("valueless trie node has no children"));
            };
            self.prefix.push(off as u8);
            self.push(node, off);
            node = child;
        }
    }

    /// Descend to the largest key at or below `node`.
    fn biggest(&mut self, mut node: NodeId) -> Result<()> {
        loop {
            node = self.tr.arena().resolve(node);
            self.append_label(node);
            match self.scan_desc(node, 255)? {
                Some((off, child)) => {
                    self.prefix.push(off as u8);
                    self.push(node, off);
                    node = child;
                }
                None => {
                    if self.tr.arena().node(node).has_val() {
                        self.push(node, -1);
                        return Ok(());
                    }
                    return Err(corrupted("valueless trie node has no children"));
                }
            }
        }
    }

    // restricted traversal used by vacuum: only descends through children
    // whose on-disk offsets fall in (begin, end]

    pub(crate) fn vac_first(&mut self, begin: u64, end: u64) -> Result<bool> {
        self.reset();
        let Some(root) = self.tr.root_id() else {
            return Ok(false);
        };
        self.vac_smallest(root, begin, end)
    }

    pub(crate) fn vac_next(&mut self, begin: u64, end: u64) -> Result<bool> {
        loop {
            let Some(top) = self.stack.last() else {
                return Ok(false);
            };
            let node = top.node;
            let start = top.off + 1;
            if start > 255 {
                if !self.pop() {
                    return Ok(false);
                }
                continue;
            }
            match self.vac_scan(node, start, begin, end)? {
                Some((off, child)) => {
                    if let Some(top) = self.stack.last_mut() {
                        top.off = off;
                    }
                    self.prefix.push(off as u8);
                    if self.vac_smallest(child, begin, end)? {
                        return Ok(true);
                    }
                    // subtree had no in-range value; undo the index byte
                    // and keep scanning this frame
                    self.prefix.pop();
                }
                None => {
                    if !self.pop() {
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// Like `smallest`, but a subtree may legitimately dead-end when all of
    /// its children live outside the range (they belong to older
    /// transactions); the descent unwinds and reports `false`.
    fn vac_smallest(&mut self, mut node: NodeId, begin: u64, end: u64) -> Result<bool> {
        let stack_mark = self.stack.len();
        let prefix_mark = self.prefix.len();
        loop {
            self.append_label(node);
            if self.tr.arena().node(node).has_val() {
                self.push(node, -1);
                return Ok(true);
            }
            match self.vac_scan(node, 0, begin, end)? {
                Some((off, child)) => {
                    self.prefix.push(off as u8);
                    self.push(node, off);
                    node = child;
                }
                None => {
                    self.stack.truncate(stack_mark);
                    self.prefix.truncate(prefix_mark);
                    return Ok(false);
                }
            }
        }
    }

    fn vac_scan(
        &mut self,
        node: NodeId,
        from: i32,
        begin: u64,
        end: u64,
    ) -> Result<Option<(i32, NodeId)>> {
        for off in from.max(0)..256 {
            let foff = self.tr.arena().node(node).fnext[off as usize];
            if foff > begin && foff <= end {
                if let Some(child) = self.tr.child(node, off as u8)? {
                    return Ok(Some((off, child)));
                }
            }
        }
        Ok(None)
    }
}
