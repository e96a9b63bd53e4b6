//! # Vacuum
//!
//! Commits only ever append (or fill a previously reclaimed gap), so keys
//! that were overwritten or deleted leave dead nodes behind in older
//! transaction blocks. Vacuum rewrites the still-live subset of the oldest
//! remaining block into a fresh transaction and extends the footer's gap
//! over the old region, making it placeable by future commits.
//!
//! ```text
//!            gap                 victim                       live tail
//! +-----------------------+-----------------+- ... -+------------------+
//! | reclaimed  (reusable) | oldest tx + ftr |  ...  | tx | live footer |
//! +-----------------------+-----------------+- ... -+------------------+
//! ^ gap_begin             ^ gap_end          after vacuum: gap_end moves
//!                                            past the victim
//! ```
//!
//! The procedure walks the victim's trie restricted to nodes physically
//! inside the victim region, and for each key found runs a reachability
//! probe from the live root. A key is copied out only when the live walk
//! itself passes through the victim region — otherwise the live tree
//! already has a newer copy elsewhere and the old pair is garbage.
//!
//! Three transactions cooperate: `tr` views the live root, `vac` views the
//! victim root, and `tres` accumulates the surviving pairs. `tres` commits
//! with a gap-end override so the footer that makes the rewrite durable is
//! the same footer that publishes the reclaimed region; the victim's own
//! footer block is then re-tagged as removed.

use eyre::{Result, WrapErr};

use crate::config::{BLOCK_REMOVED_FOOTER, BLOCK_TRANSACTION, FOOTER_SIZE, TR_HEADER_SIZE};
use crate::cursor::Cursor;
use crate::database::Database;
use crate::error::corrupted;
use crate::storage::format::{Footer, TrHeader};
use crate::transaction::Transaction;

/// Rewrite the live subset of the oldest transaction after the gap and
/// reclaim its region. `tr`, `vac`, and `tres` must all belong to `db`;
/// all three are consumed as working state and reset by the commit.
pub fn vacuum(
    db: &Database,
    tr: &mut Transaction<'_>,
    vac: &mut Transaction<'_>,
    tres: &mut Transaction<'_>,
) -> Result<()> {
    let info = db.file().read_info()?;
    if info.filesize == 0 {
        return Ok(());
    }

    tr.begin()?;
    vac.begin()?;
    tres.begin()?;
    tr.load_root()?;

    // the victim is the first transaction block after the reclaimed gap;
    // its own footer carries its true size
    let victim_off = info.footer.gap_end.get();
    let mut header_buf = [0u8; TR_HEADER_SIZE];
    db.file()
        .read_exact_at(&mut header_buf, victim_off)
        .wrap_err("failed to read vacuum victim header")?;
    let header = TrHeader::from_bytes(&header_buf)?;
    if header.block_type != BLOCK_TRANSACTION {
        return Err(corrupted("vacuum victim is not a transaction block"));
    }

    let victim_footer_off = header.footer_off.get();
    let mut footer_buf = [0u8; FOOTER_SIZE];
    db.file()
        .read_exact_at(&mut footer_buf, victim_footer_off)
        .wrap_err("failed to read vacuum victim footer")?;
    let victim_footer = Footer::from_bytes(&footer_buf)?;
    if !victim_footer.is_footer_block() {
        return Err(corrupted("vacuum victim footer has a bad block type"));
    }

    let victim_size = victim_footer.transaction_size.get();
    let begin = victim_off;
    let end = victim_off + victim_size;

    // the reclaimed span swallows the victim's footer when it sits right
    // after the block (append-placed transactions); a gap-placed victim
    // left its footer elsewhere and that spot is reclaimed with its own
    // neighborhood
    let mut new_gap_end = end;
    if victim_footer_off == end {
        new_gap_end += FOOTER_SIZE as u64;
    }

    let vac_root = vac.read_node_at(begin + TR_HEADER_SIZE as u64)?;
    vac.set_root(vac_root);

    {
        let mut cursor = Cursor::new(vac);
        let mut positioned = cursor.vac_first(begin, end)?;
        while positioned {
            let key = cursor.key().to_vec();
            let (found, in_victim) = probe_reachable(tr, &key, begin, end)?;
            if found && in_victim {
                let val = cursor.val().to_vec();
                tres.put(&key, &val)?;
            }
            positioned = cursor.vac_next(begin, end)?;
        }
    }

    // when every victim key was dead the rewrite is empty, but the gap
    // bounds still have to reach the footer: give tres the live root so
    // its commit writes one
    if tres.root_id().is_none() {
        tres.load_root()?;
    }
    tres.commit_with_gap(Some(new_gap_end))
        .wrap_err("failed to commit vacuum rewrite")?;

    // bookkeeping for file scanners; root discovery never reads it
    db.file()
        .write_all_at(&[BLOCK_REMOVED_FOOTER], victim_footer_off)?;
    Ok(())
}

/// Walk the live trie to `key`, reporting whether the key exists and
/// whether any node on the walk lies inside `[begin, end]` — i.e. whether
/// the live tree still depends on the victim region for this key.
fn probe_reachable(
    tr: &mut Transaction<'_>,
    key: &[u8],
    begin: u64,
    end: u64,
) -> Result<(bool, bool)> {
    let Some(root) = tr.load_root()? else {
        return Ok((false, false));
    };

    let root_off = tr.snapshot().root_off;
    let mut in_victim = root_off >= begin && root_off <= end;
    let mut node = tr.arena().resolve(root);
    let mut ki = 0usize;
    let mut pi = 0usize;

    loop {
        if ki == key.len() {
            let n = tr.arena().node(node);
            let found = pi == n.prefix_size as usize && n.has_val();
            return Ok((found, in_victim));
        }

        let prefix_size = tr.arena().node(node).prefix_size as usize;
        if pi >= prefix_size {
            let sym = key[ki];
            let child_off = tr.arena().node(node).fnext[sym as usize];
            if child_off >= begin && child_off <= end {
                in_victim = true;
            }
            match tr.child(node, sym)? {
                Some(child) => {
                    node = child;
                    ki += 1;
                    pi = 0;
                }
                None => return Ok((false, in_victim)),
            }
            continue;
        }

        if tr.arena().prefix(node)[pi] != key[ki] {
            return Ok((false, in_victim));
        }
        ki += 1;
        pi += 1;
    }
}
