//! # Vacuum Tests
//!
//! Vacuum rewrites the still-live subset of the oldest transaction block
//! and publishes the reclaimed region in the footer's gap bounds. These
//! tests verify that no live key is lost, that the gap actually opens, and
//! that a later commit places its block inside the gap instead of growing
//! the file.

use tempfile::tempdir;
use triekv::config::{BLOCK_REMOVED_FOOTER, FOOTER_SIZE, TR_HEADER_SIZE};
use triekv::{vacuum, Cursor, Database, Transaction};

fn run_vacuum(db: &Database) {
    let mut tr = db.transaction().unwrap();
    let mut vac = db.transaction().unwrap();
    let mut tres = db.transaction().unwrap();
    vacuum(db, &mut tr, &mut vac, &mut tres).unwrap();
}

fn all_pairs(tr: &mut Transaction<'_>) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut cursor = Cursor::new(tr);
    let mut out = Vec::new();
    let mut positioned = cursor.first().unwrap();
    while positioned {
        out.push((cursor.key().to_vec(), cursor.val().to_vec()));
        positioned = cursor.next().unwrap();
    }
    out
}

#[test]
fn vacuum_of_the_only_transaction_keeps_every_key() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("single.tkv");
    let db = Database::open(&path).unwrap();

    let mut tr = db.transaction().unwrap();
    tr.begin().unwrap();
    tr.put(b"a", b"1").unwrap();
    tr.put(b"b", b"2").unwrap();
    tr.commit().unwrap();
    let len_before = std::fs::metadata(&path).unwrap().len();

    run_vacuum(&db);

    // the whole old region, footer included, became the gap
    let info = db.info().unwrap();
    assert_eq!(info.gap_begin, 0);
    assert_eq!(info.gap_end, len_before);

    let mut tr = db.transaction().unwrap();
    tr.begin().unwrap();
    assert_eq!(
        all_pairs(&mut tr),
        vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())]
    );
}

#[test]
fn vacuum_drops_dead_versions_and_keeps_shared_subtrees() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shared.tkv");
    let db = Database::open(&path).unwrap();

    // first transaction holds both keys; the second rewrites only k1, so
    // the live root still reaches k2 through the first block
    let mut tr = db.transaction().unwrap();
    tr.begin().unwrap();
    tr.put(b"k1", b"old").unwrap();
    tr.put(b"k2", b"keep").unwrap();
    tr.commit().unwrap();

    tr.begin().unwrap();
    tr.put(b"k1", b"new-value").unwrap();
    tr.commit().unwrap();

    run_vacuum(&db);
    let info = db.info().unwrap();
    assert!(info.gap_end > 0, "vacuum SHOULD open a gap over the old block");

    db.close().unwrap();
    let db = Database::open(&path).unwrap();
    let mut tr = db.transaction().unwrap();
    tr.begin().unwrap();
    assert_eq!(
        all_pairs(&mut tr),
        vec![
            (b"k1".to_vec(), b"new-value".to_vec()),
            (b"k2".to_vec(), b"keep".to_vec()),
        ]
    );
}

#[test]
fn vacuum_marks_the_victim_footer_removed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("marked.tkv");
    let db = Database::open(&path).unwrap();

    let mut tr = db.transaction().unwrap();
    tr.begin().unwrap();
    tr.put(b"x", b"1").unwrap();
    tr.commit().unwrap();
    let len1 = std::fs::metadata(&path).unwrap().len();

    run_vacuum(&db);

    let bytes = std::fs::read(&path).unwrap();
    let victim_footer_off = len1 as usize - FOOTER_SIZE;
    assert_eq!(bytes[victim_footer_off], BLOCK_REMOVED_FOOTER);
}

#[test]
fn next_commit_fills_the_gap_without_growing_the_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("reuse.tkv");
    let db = Database::open(&path).unwrap();

    // a bulky first transaction makes a gap comfortably larger than the
    // small commit that follows the vacuum (placement compares the gap
    // against the arena's in-memory footprint, a conservative bound)
    let mut tr = db.transaction().unwrap();
    tr.begin().unwrap();
    for i in 0..64u32 {
        tr.put(&i.to_be_bytes(), &[0u8; 512]).unwrap();
    }
    tr.commit().unwrap();

    tr.begin().unwrap();
    tr.put(&0u32.to_be_bytes(), &[1u8; 64]).unwrap();
    tr.commit().unwrap();

    run_vacuum(&db);
    let info_after_vacuum = db.info().unwrap();
    assert!(info_after_vacuum.gap_end > info_after_vacuum.gap_begin);
    let len_after_vacuum = std::fs::metadata(&path).unwrap().len();

    let mut tr = db.transaction().unwrap();
    tr.begin().unwrap();
    tr.put(b"tiny", b"t").unwrap();
    tr.commit().unwrap();

    let len_after_commit = std::fs::metadata(&path).unwrap().len();
    assert_eq!(
        len_after_commit,
        len_after_vacuum + FOOTER_SIZE as u64,
        "a gap-placed commit SHOULD only append its footer"
    );
    let info = db.info().unwrap();
    assert!(info.gap_begin > info_after_vacuum.gap_begin);
    assert_eq!(info.root_off, info_after_vacuum.gap_begin + TR_HEADER_SIZE as u64);

    // everything is still visible, old and gap-placed alike
    tr.begin().unwrap();
    assert_eq!(tr.get(b"tiny").unwrap(), Some(&b"t"[..]));
    assert_eq!(tr.get(&0u32.to_be_bytes()).unwrap(), Some(&[1u8; 64][..]));
    assert_eq!(tr.get(&63u32.to_be_bytes()).unwrap(), Some(&[0u8; 512][..]));
}

#[test]
fn repeated_vacuum_walks_forward_through_old_blocks() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("repeat.tkv");
    let db = Database::open(&path).unwrap();

    let mut tr = db.transaction().unwrap();
    for round in 0..3u8 {
        tr.begin().unwrap();
        tr.put(&[b'k', round], &[round]).unwrap();
        tr.commit().unwrap();
    }

    let mut last_gap_end = 0;
    for _ in 0..2 {
        run_vacuum(&db);
        let info = db.info().unwrap();
        assert!(info.gap_end > last_gap_end, "each vacuum SHOULD reclaim more");
        last_gap_end = info.gap_end;
    }

    let mut tr = db.transaction().unwrap();
    tr.begin().unwrap();
    for round in 0..3u8 {
        assert_eq!(tr.get(&[b'k', round]).unwrap(), Some(&[round][..]));
    }
}
