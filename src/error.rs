//! # Typed Engine Errors
//!
//! Most failures in TrieKV travel as `eyre::Report` chains with positional
//! context attached via `wrap_err`. The conditions an embedder must react to
//! programmatically are raised as [`StoreError`] values inside those chains
//! and recovered with `Report::downcast_ref::<StoreError>()`:
//!
//! ```ignore
//! match tr.commit() {
//!     Ok(()) => {}
//!     Err(e) if e.downcast_ref::<StoreError>() == Some(&StoreError::Modified) => {
//!         // another transaction won the race; rebuild and retry
//!     }
//!     Err(e) => return Err(e),
//! }
//! ```
//!
//! Absence is not an error: `get` returns `Option`, `delete` and the cursor
//! moves return `Ok(false)` when there is nothing there.

/// Engine conditions with defined recovery semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A mutation or query was issued on a transaction that has not been
    /// started with `begin`.
    NotStarted,
    /// Between `begin` and `commit` the database file changed in a way that
    /// is inconsistent with a monotonic single-writer sequence. The
    /// transaction's work is discarded; rebuild it after a fresh `begin`.
    Modified,
    /// The file contents contradict the format: bad signature, a footer
    /// describing a transaction larger than the file, or a node whose
    /// declared size disagrees with its child structure.
    Corrupted,
    /// A cursor or lookup was used on a transaction with no root and no
    /// backing data.
    Empty,
    /// An arena or write-buffer ceiling was reached. Previously inserted
    /// data is intact; the failed operation had no effect.
    OutOfMemory { requested: usize, limit: usize },
    /// Reserved for file locking. Declared for API completeness; the engine
    /// never raises it.
    Locked,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotStarted => write!(f, "transaction not started"),
            StoreError::Modified => {
                write!(f, "database file was modified since the transaction began")
            }
            StoreError::Corrupted => write!(f, "database file is corrupted"),
            StoreError::Empty => write!(f, "database is empty"),
            StoreError::OutOfMemory { requested, limit } => write!(
                f,
                "memory limit exceeded: requested {} bytes with limit {}",
                requested, limit
            ),
            StoreError::Locked => write!(f, "database is locked"),
        }
    }
}

impl std::error::Error for StoreError {}

/// A `Corrupted` report with a note about what contradicted the format.
pub(crate) fn corrupted(msg: &'static str) -> eyre::Report {
    eyre::Report::new(StoreError::Corrupted).wrap_err(msg)
}
