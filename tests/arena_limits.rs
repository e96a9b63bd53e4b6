//! # Arena Ceiling Tests
//!
//! A transaction's arena enforces a hard byte ceiling in both allocation
//! modes. The contract under pressure: the failing operation is refused
//! with `OutOfMemory`, everything inserted before it stays intact, and a
//! commit of the successful prefix persists cleanly.

use tempfile::tempdir;
use triekv::{Database, DbParams, StoreError, Transaction};

fn is_oom(err: &eyre::Report) -> bool {
    matches!(
        err.downcast_ref::<StoreError>(),
        Some(StoreError::OutOfMemory { .. })
    )
}

/// Insert numbered keys until the arena refuses, returning how many landed.
fn fill_until_oom(tr: &mut Transaction<'_>) -> u32 {
    for i in 0..10_000u32 {
        let key = i.to_be_bytes();
        match tr.put(&key, b"payload-bytes") {
            Ok(()) => {}
            Err(err) => {
                assert!(is_oom(&err), "unexpected failure: {err:?}");
                return i;
            }
        }
    }
    panic!("a bounded arena SHOULD refuse before 10k inserts");
}

#[test]
fn fixed_slab_refuses_and_keeps_prior_inserts() {
    let mut tr = Transaction::in_memory_with(64 * 1024, false).unwrap();
    tr.begin().unwrap();
    let landed = fill_until_oom(&mut tr);
    assert!(landed > 0);

    // every successful insert is still readable
    for i in 0..landed {
        let key = i.to_be_bytes();
        assert_eq!(
            tr.get(&key).unwrap(),
            Some(&b"payload-bytes"[..]),
            "key {i} SHOULD survive the refused allocation"
        );
    }

    // and further inserts still fail rather than corrupt
    let err = tr.put(b"one-more", b"v").unwrap_err();
    assert!(is_oom(&err));
}

#[test]
fn dynamic_arena_enforces_the_same_ceiling() {
    let mut tr = Transaction::in_memory_with(64 * 1024, true).unwrap();
    tr.begin().unwrap();
    let landed = fill_until_oom(&mut tr);
    assert!(landed > 0);
    for i in 0..landed {
        assert!(tr.get(&i.to_be_bytes()).unwrap().is_some());
    }
}

#[test]
fn rollback_frees_the_slab_for_reuse() {
    let mut tr = Transaction::in_memory_with(64 * 1024, false).unwrap();
    tr.begin().unwrap();
    let first_round = fill_until_oom(&mut tr);
    tr.rollback().unwrap();

    tr.begin().unwrap();
    let second_round = fill_until_oom(&mut tr);
    assert_eq!(first_round, second_round);
}

#[test]
fn successful_prefix_commits_after_oom() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bounded.tkv");
    let db = Database::open_with(&path, DbParams::new().tr_buf_limit(64 * 1024)).unwrap();

    let landed;
    {
        let mut tr = db.transaction().unwrap();
        tr.begin().unwrap();
        landed = fill_until_oom(&mut tr);
        tr.commit().unwrap();
        db.close().unwrap();
    }

    let db = Database::open(&path).unwrap();
    let mut tr = db.transaction().unwrap();
    tr.begin().unwrap();
    for i in 0..landed {
        assert_eq!(tr.get(&i.to_be_bytes()).unwrap(), Some(&b"payload-bytes"[..]));
    }
    assert_eq!(tr.get(&landed.to_be_bytes()).unwrap(), None);
}

#[test]
fn fixed_transactions_from_db_params_are_bounded() {
    let dir = tempdir().unwrap();
    let db = Database::open_with(
        dir.path().join("fixed.tkv"),
        DbParams::new()
            .tr_buf_limit(32 * 1024)
            .tr_buf_dynalloc(false),
    )
    .unwrap();

    let mut tr = db.transaction().unwrap();
    tr.begin().unwrap();
    let landed = fill_until_oom(&mut tr);
    assert!(landed > 0);
}
