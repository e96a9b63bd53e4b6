//! # Trie Mutations
//!
//! Insert, lookup, and delete over the radix trie. Each operation walks the
//! key byte by byte from the root and handles the terminal case it lands
//! in. Inserts are copy-on-write: every structural change allocates
//! replacement nodes and forwards the old node to the new one.
//!
//! ## Insert terminal cases
//!
//! Exact match with a same-length, non-empty value overwrites the value
//! bytes in place. Exact match with a different length rebuilds the node
//! around the new value, cloning its child tables.
//!
//! Key exhausted inside an edge label splits the edge:
//!
//! ```text
//! [p][r][e][f][i][x]          old prefix
//! [p][r][e]                   new key
//!
//! [p][r][e]                   new root, new value
//! next['f'] -> [i][x]         rest: old value, old children
//! ```
//!
//! Label exhausted inside the key either descends into the child at the
//! next byte or attaches a fresh leaf there; attaching populates an empty
//! slot, so no forwarding is needed.
//!
//! Divergence inside the label is a three-way split:
//!
//! ```text
//! [p][r][e][f][i][x]          old prefix
//! [p][r][e][p][a][r][e]       new key
//!
//! [p][r][e]                   new root, no value
//! next['f'] -> [i][x]         tail of the old prefix
//! next['p'] -> [a][r][e]      tail of the new key
//! ```
//!
//! ## Delete
//!
//! Deleting a leaf detaches it from its parent; deleting a key at an
//! internal node clears the value flag and keeps the branch. In prefix
//! mode the whole matched subtree is detached, including when the match
//! lands inside an edge label (every key below has the argument as a
//! prefix). Either way, a parent left valueless with a single child is
//! concatenated with that child so compressed paths stay compressed.

use eyre::{bail, Result};
use smallvec::SmallVec;

use crate::config::NODE_HAS_VAL;
use crate::error::StoreError;
use crate::transaction::Transaction;
use crate::trie::node::NodeId;

/// Scratch buffer for copied prefixes and values during splits.
type ByteBuf = SmallVec<[u8; 64]>;

pub(crate) fn put(tr: &mut Transaction<'_>, key: &[u8], val: &[u8]) -> Result<()> {
    if !tr.is_started() {
        bail!(StoreError::NotStarted);
    }

    let root = match tr.load_root()? {
        Some(root) => root,
        None => {
            let id = tr.arena_mut().alloc_parts(NODE_HAS_VAL, key, val, &[])?;
            tr.set_root(id);
            return Ok(());
        }
    };

    let mut node = tr.arena().resolve(root);
    let mut ki = 0usize;
    let mut pi = 0usize;

    loop {
        if ki == key.len() {
            return put_key_exhausted(tr, node, pi, val);
        }

        let prefix_size = tr.arena().node(node).prefix_size as usize;
        if pi >= prefix_size {
            let sym = key[ki];
            if let Some(child) = tr.child(node, sym)? {
                node = child;
                ki += 1;
                pi = 0;
                continue;
            }
            // empty slot: attach a leaf holding the rest of the key
            let leaf = tr
                .arena_mut()
                .alloc_parts(NODE_HAS_VAL, &key[ki + 1..], val, &[])?;
            tr.arena_mut().node_mut(node).next[sym as usize] = Some(leaf);
            return Ok(());
        }

        if tr.arena().prefix(node)[pi] != key[ki] {
            return put_diverged(tr, node, pi, &key[ki..], val);
        }

        ki += 1;
        pi += 1;
    }
}

/// The key ran out at `pi` bytes into the node's prefix: exact match or an
/// edge split.
fn put_key_exhausted(tr: &mut Transaction<'_>, node: NodeId, pi: usize, val: &[u8]) -> Result<()> {
    let (prefix_size, val_size, flags) = {
        let n = tr.arena().node(node);
        (n.prefix_size as usize, n.val_size as usize, n.flags)
    };

    if pi == prefix_size {
        if val_size == val.len() && !val.is_empty() {
            tr.arena_mut().val_mut(node).copy_from_slice(val);
            return Ok(());
        }
        let prefix: ByteBuf = SmallVec::from_slice(tr.arena().prefix(node));
        let replacement = tr.arena_mut().alloc_parts(NODE_HAS_VAL, &prefix, val, &[])?;
        tr.arena_mut().clone_children(replacement, node);
        tr.arena_mut().forward(node, replacement);
        return Ok(());
    }

    // the key is a strict prefix of the edge label: split it
    let prefix: ByteBuf = SmallVec::from_slice(tr.arena().prefix(node));
    let old_val: ByteBuf = SmallVec::from_slice(tr.arena().val(node));
    let new_root = tr
        .arena_mut()
        .alloc_parts(NODE_HAS_VAL, &prefix[..pi], val, &[])?;
    let rest = tr
        .arena_mut()
        .alloc_parts(flags, &prefix[pi + 1..], &old_val, &[])?;
    tr.arena_mut().clone_children(rest, node);
    tr.arena_mut().node_mut(new_root).next[prefix[pi] as usize] = Some(rest);
    tr.arena_mut().forward(node, new_root);
    Ok(())
}

/// The node's prefix disagrees with the key at `pi`: three-way split.
/// `key_rest` starts at the diverging key byte.
fn put_diverged(
    tr: &mut Transaction<'_>,
    node: NodeId,
    pi: usize,
    key_rest: &[u8],
    val: &[u8],
) -> Result<()> {
    let flags = tr.arena().node(node).flags;
    let prefix: ByteBuf = SmallVec::from_slice(tr.arena().prefix(node));
    let old_val: ByteBuf = SmallVec::from_slice(tr.arena().val(node));

    let new_root = tr.arena_mut().alloc_parts(0, &prefix[..pi], &[], &[])?;
    let rest = tr
        .arena_mut()
        .alloc_parts(flags, &prefix[pi + 1..], &old_val, &[])?;
    tr.arena_mut().clone_children(rest, node);
    let key_leaf = tr
        .arena_mut()
        .alloc_parts(NODE_HAS_VAL, &key_rest[1..], val, &[])?;

    let arena = tr.arena_mut();
    let n = arena.node_mut(new_root);
    n.next[prefix[pi] as usize] = Some(rest);
    n.next[key_rest[0] as usize] = Some(key_leaf);
    arena.forward(node, new_root);
    Ok(())
}

pub(crate) fn get<'t>(tr: &'t mut Transaction<'_>, key: &[u8]) -> Result<Option<&'t [u8]>> {
    if !tr.is_started() {
        bail!(StoreError::NotStarted);
    }
    let Some(root) = tr.load_root()? else {
        bail!(StoreError::Empty);
    };

    let mut node = tr.arena().resolve(root);
    let mut ki = 0usize;
    let mut pi = 0usize;

    loop {
        if ki == key.len() {
            let n = tr.arena().node(node);
            if pi == n.prefix_size as usize && n.has_val() {
                return Ok(Some(tr.arena().val(node)));
            }
            return Ok(None);
        }

        let prefix_size = tr.arena().node(node).prefix_size as usize;
        if pi >= prefix_size {
            match tr.child(node, key[ki])? {
                Some(child) => {
                    node = child;
                    ki += 1;
                    pi = 0;
                }
                None => return Ok(None),
            }
            continue;
        }

        if tr.arena().prefix(node)[pi] != key[ki] {
            return Ok(None);
        }
        ki += 1;
        pi += 1;
    }
}

pub(crate) fn delete(tr: &mut Transaction<'_>, key: &[u8], prefix_mode: bool) -> Result<bool> {
    if !tr.is_started() {
        bail!(StoreError::NotStarted);
    }
    let Some(root) = tr.load_root()? else {
        bail!(StoreError::Empty);
    };

    let mut node = tr.arena().resolve(root);
    let mut parent: Option<(NodeId, u8)> = None;
    let mut ki = 0usize;
    let mut pi = 0usize;

    loop {
        if ki == key.len() {
            let prefix_size = tr.arena().node(node).prefix_size as usize;
            if pi == prefix_size || prefix_mode {
                // prefix mode also matches inside an edge label: every key
                // below this node extends the argument
                return detach(tr, node, parent, prefix_mode);
            }
            return Ok(false);
        }

        let prefix_size = tr.arena().node(node).prefix_size as usize;
        if pi >= prefix_size {
            let sym = key[ki];
            match tr.child(node, sym)? {
                Some(child) => {
                    parent = Some((node, sym));
                    node = child;
                    ki += 1;
                    pi = 0;
                }
                None => return Ok(false),
            }
            continue;
        }

        if tr.arena().prefix(node)[pi] != key[ki] {
            return Ok(false);
        }
        ki += 1;
        pi += 1;
    }
}

fn detach(
    tr: &mut Transaction<'_>,
    node: NodeId,
    parent: Option<(NodeId, u8)>,
    prefix_mode: bool,
) -> Result<bool> {
    let (has_val, has_children) = {
        let n = tr.arena().node(node);
        (n.has_val(), n.has_children())
    };

    let Some((parent_id, sym)) = parent else {
        // matched at the root
        if prefix_mode {
            let empty = tr.arena_mut().alloc_parts(0, &[], &[], &[])?;
            tr.arena_mut().forward(node, empty);
            tr.set_root(empty);
            return Ok(true);
        }
        if !has_val {
            return Ok(false);
        }
        if has_children {
            tr.arena_mut().node_mut(node).flags &= !NODE_HAS_VAL;
            concat_if_singleton(tr, node)?;
        } else {
            let empty = tr.arena_mut().alloc_parts(0, &[], &[], &[])?;
            tr.arena_mut().forward(node, empty);
            tr.set_root(empty);
        }
        return Ok(true);
    };

    if prefix_mode {
        clear_child(tr, parent_id, sym);
        concat_if_singleton(tr, parent_id)?;
        return Ok(true);
    }
    if !has_val {
        return Ok(false);
    }
    if has_children {
        // keep the branch, drop the value
        tr.arena_mut().node_mut(node).flags &= !NODE_HAS_VAL;
        concat_if_singleton(tr, node)?;
    } else {
        clear_child(tr, parent_id, sym);
        concat_if_singleton(tr, parent_id)?;
    }
    Ok(true)
}

fn clear_child(tr: &mut Transaction<'_>, parent: NodeId, sym: u8) {
    let n = tr.arena_mut().node_mut(parent);
    n.next[sym as usize] = None;
    n.fnext[sym as usize] = 0;
}

/// Concatenate a valueless node that has exactly one remaining child with
/// that child: the merged node takes `prefix + sym + child.prefix`, the
/// child's value, and the child's children. The old node is forwarded.
fn concat_if_singleton(tr: &mut Transaction<'_>, node: NodeId) -> Result<()> {
    let node = tr.arena().resolve(node);
    if tr.arena().node(node).has_val() {
        return Ok(());
    }
    let Some(sym) = tr.arena().node(node).sole_child_sym() else {
        return Ok(());
    };
    let Some(child) = tr.child(node, sym)? else {
        return Ok(());
    };

    let child_flags = tr.arena().node(child).flags;
    let mut prefix: ByteBuf = SmallVec::from_slice(tr.arena().prefix(node));
    prefix.push(sym);
    prefix.extend_from_slice(tr.arena().prefix(child));
    let child_val: ByteBuf = SmallVec::from_slice(tr.arena().val(child));

    let merged = tr
        .arena_mut()
        .alloc_parts(child_flags, &prefix, &child_val, &[])?;
    tr.arena_mut().clone_children(merged, child);
    tr.arena_mut().forward(node, merged);
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::transaction::Transaction;
    use crate::StoreError;

    fn ram() -> Transaction<'static> {
        let mut tr = Transaction::in_memory();
        tr.begin().unwrap();
        tr
    }

    #[test]
    fn put_before_begin_is_rejected() {
        let mut tr = Transaction::in_memory();
        let err = tr.put(b"k", b"v").unwrap_err();
        assert_eq!(
            err.downcast_ref::<StoreError>(),
            Some(&StoreError::NotStarted)
        );
    }

    #[test]
    fn get_on_empty_transaction_reports_empty() {
        let mut tr = ram();
        let err = tr.get(b"missing").unwrap_err();
        assert_eq!(err.downcast_ref::<StoreError>(), Some(&StoreError::Empty));
    }

    #[test]
    fn chained_prefixes_roundtrip() {
        let mut tr = ram();
        tr.put(b"a", b"1").unwrap();
        tr.put(b"ab", b"2").unwrap();
        tr.put(b"abc", b"3").unwrap();

        assert_eq!(tr.get(b"a").unwrap(), Some(&b"1"[..]));
        assert_eq!(tr.get(b"ab").unwrap(), Some(&b"2"[..]));
        assert_eq!(tr.get(b"abc").unwrap(), Some(&b"3"[..]));
        assert_eq!(tr.get(b"abcd").unwrap(), None);
        assert_eq!(tr.get(b"b").unwrap(), None);
    }

    #[test]
    fn divergence_splits_shared_prefix() {
        let mut tr = ram();
        tr.put(b"abcd", b"X").unwrap();
        tr.put(b"abce", b"Y").unwrap();

        assert_eq!(tr.get(b"abcd").unwrap(), Some(&b"X"[..]));
        assert_eq!(tr.get(b"abce").unwrap(), Some(&b"Y"[..]));
        assert_eq!(tr.get(b"abc").unwrap(), None);
    }

    #[test]
    fn key_exhausted_mid_edge_splits_label() {
        let mut tr = ram();
        tr.put(b"prefix", b"long").unwrap();
        tr.put(b"pre", b"short").unwrap();

        assert_eq!(tr.get(b"pre").unwrap(), Some(&b"short"[..]));
        assert_eq!(tr.get(b"prefix").unwrap(), Some(&b"long"[..]));
    }

    #[test]
    fn same_length_overwrite_is_in_place() {
        let mut tr = ram();
        tr.put(b"k", b"aaa").unwrap();
        let nodes_before = tr.arena().node_count();
        tr.put(b"k", b"bbb").unwrap();
        assert_eq!(tr.arena().node_count(), nodes_before);
        assert_eq!(tr.get(b"k").unwrap(), Some(&b"bbb"[..]));
    }

    #[test]
    fn reinserting_the_same_pair_changes_nothing() {
        let mut tr = ram();
        tr.put(b"a", b"1").unwrap();
        tr.put(b"ab", b"2").unwrap();
        tr.put(b"a", b"1").unwrap();
        tr.put(b"ab", b"2").unwrap();
        assert_eq!(tr.get(b"a").unwrap(), Some(&b"1"[..]));
        assert_eq!(tr.get(b"ab").unwrap(), Some(&b"2"[..]));
        let mut cursor = crate::Cursor::new(&mut tr);
        let mut count = 0;
        let mut positioned = cursor.first().unwrap();
        while positioned {
            count += 1;
            positioned = cursor.next().unwrap();
        }
        assert_eq!(count, 2, "re-inserts SHOULD NOT create duplicate keys");
    }

    #[test]
    fn different_length_overwrite_replaces_node() {
        let mut tr = ram();
        tr.put(b"k", b"v1").unwrap();
        tr.put(b"k", b"v22").unwrap();
        assert_eq!(tr.get(b"k").unwrap(), Some(&b"v22"[..]));
    }

    #[test]
    fn overwrite_keeps_children_visible() {
        let mut tr = ram();
        tr.put(b"k", b"v").unwrap();
        tr.put(b"kid", b"c").unwrap();
        tr.put(b"k", b"longer-value").unwrap();
        assert_eq!(tr.get(b"k").unwrap(), Some(&b"longer-value"[..]));
        assert_eq!(tr.get(b"kid").unwrap(), Some(&b"c"[..]));
    }

    #[test]
    fn empty_key_is_a_valid_key() {
        let mut tr = ram();
        tr.put(b"", b"root-value").unwrap();
        tr.put(b"x", b"other").unwrap();
        assert_eq!(tr.get(b"").unwrap(), Some(&b"root-value"[..]));
        assert_eq!(tr.get(b"x").unwrap(), Some(&b"other"[..]));
    }

    #[test]
    fn delete_leaf_keeps_siblings() {
        let mut tr = ram();
        tr.put(b"foo1", b"a").unwrap();
        tr.put(b"foo2", b"b").unwrap();

        assert!(tr.delete(b"foo1", false).unwrap());
        assert_eq!(tr.get(b"foo1").unwrap(), None);
        assert_eq!(tr.get(b"foo2").unwrap(), Some(&b"b"[..]));
    }

    #[test]
    fn delete_internal_key_keeps_descendants() {
        let mut tr = ram();
        tr.put(b"a", b"1").unwrap();
        tr.put(b"ab", b"2").unwrap();
        tr.put(b"abc", b"3").unwrap();

        assert!(tr.delete(b"ab", false).unwrap());
        assert_eq!(tr.get(b"ab").unwrap(), None);
        assert_eq!(tr.get(b"a").unwrap(), Some(&b"1"[..]));
        assert_eq!(tr.get(b"abc").unwrap(), Some(&b"3"[..]));
    }

    #[test]
    fn delete_root_key_keeps_descendants() {
        let mut tr = ram();
        tr.put(b"a", b"1").unwrap();
        tr.put(b"ab", b"2").unwrap();

        assert!(tr.delete(b"a", false).unwrap());
        assert_eq!(tr.get(b"a").unwrap(), None);
        assert_eq!(tr.get(b"ab").unwrap(), Some(&b"2"[..]));
    }

    #[test]
    fn delete_absent_key_reports_not_found() {
        let mut tr = ram();
        tr.put(b"present", b"v").unwrap();
        assert!(!tr.delete(b"absent", false).unwrap());
        assert!(!tr.delete(b"pres", false).unwrap());
        assert!(!tr.delete(b"presentee", false).unwrap());
    }

    #[test]
    fn prefix_delete_removes_subtree() {
        let mut tr = ram();
        tr.put(b"foo1", b"a").unwrap();
        tr.put(b"foo2", b"b").unwrap();
        tr.put(b"bar", b"c").unwrap();

        assert!(tr.delete(b"foo", true).unwrap());
        assert_eq!(tr.get(b"foo1").unwrap(), None);
        assert_eq!(tr.get(b"foo2").unwrap(), None);
        assert_eq!(tr.get(b"bar").unwrap(), Some(&b"c"[..]));
    }

    #[test]
    fn prefix_delete_matches_inside_edge_label() {
        let mut tr = ram();
        tr.put(b"window", b"1").unwrap();
        tr.put(b"winter", b"2").unwrap();
        tr.put(b"wall", b"3").unwrap();

        // "win" ends inside the "n"-edge label shared by window/winter
        assert!(tr.delete(b"win", true).unwrap());
        assert_eq!(tr.get(b"window").unwrap(), None);
        assert_eq!(tr.get(b"winter").unwrap(), None);
        assert_eq!(tr.get(b"wall").unwrap(), Some(&b"3"[..]));
    }

    #[test]
    fn delete_merges_singleton_parent_with_child() {
        let mut tr = ram();
        tr.put(b"foo1", b"a").unwrap();
        tr.put(b"foo2", b"b").unwrap();

        assert!(tr.delete(b"foo2", false).unwrap());

        // the branch node at "foo" has one child left and no value, so the
        // path compresses back into a single edge
        let root = tr.arena().resolve(tr.root_id().unwrap());
        assert_eq!(tr.arena().prefix(root), b"foo1");
        assert_eq!(tr.get(b"foo1").unwrap(), Some(&b"a"[..]));
    }

    #[test]
    fn clearing_value_merges_singleton_chain() {
        let mut tr = ram();
        tr.put(b"ab", b"1").unwrap();
        tr.put(b"abcd", b"2").unwrap();

        // deleting "ab" leaves a valueless node with only the 'c' child
        assert!(tr.delete(b"ab", false).unwrap());
        let root = tr.arena().resolve(tr.root_id().unwrap());
        assert_eq!(tr.arena().prefix(root), b"abcd");
        assert_eq!(tr.get(b"abcd").unwrap(), Some(&b"2"[..]));
        assert_eq!(tr.get(b"ab").unwrap(), None);
    }

    #[test]
    fn delete_then_reinsert() {
        let mut tr = ram();
        tr.put(b"k", b"v1").unwrap();
        assert!(tr.delete(b"k", false).unwrap());
        tr.put(b"k", b"v2").unwrap();
        assert_eq!(tr.get(b"k").unwrap(), Some(&b"v2"[..]));
    }

    #[test]
    fn rollback_discards_mutations() {
        let mut tr = ram();
        tr.put(b"k", b"v").unwrap();
        tr.rollback().unwrap();

        tr.begin().unwrap();
        let err = tr.get(b"k").unwrap_err();
        assert_eq!(err.downcast_ref::<StoreError>(), Some(&StoreError::Empty));
    }
}
