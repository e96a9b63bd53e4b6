//! # Database Handle
//!
//! [`Database`] owns the file and the commit write buffer behind a
//! `parking_lot::Mutex`, so any number of transactions can hold a shared
//! reference to it at once. Isolation is optimistic: each transaction
//! snapshots the footer at `begin`, and the first commit to land wins —
//! later commits observe the moved tail and fail with `Modified`.
//!
//! ```ignore
//! let db = Database::open("data.tkv")?;
//!
//! let mut tr = db.transaction()?;
//! tr.begin()?;
//! tr.put(b"key", b"value")?;
//! tr.commit()?;
//!
//! let mut tr = db.transaction()?;
//! tr.begin()?;
//! assert_eq!(tr.get(b"key")?, Some(&b"value"[..]));
//! ```

use std::path::Path;

use eyre::{Result, WrapErr};
use parking_lot::{Mutex, MutexGuard};

use crate::storage::file::{DbFile, WriteBuffer};
use crate::transaction::Transaction;

/// Tunables for opening a database, mirroring the write-side and
/// transaction-side buffer ceilings.
#[derive(Debug, Clone)]
pub struct DbParams {
    write_buf_limit: usize,
    write_buf_dynalloc: bool,
    tr_buf_limit: usize,
    tr_buf_dynalloc: bool,
    create: bool,
    mode: u32,
}

impl Default for DbParams {
    fn default() -> Self {
        Self {
            write_buf_limit: usize::MAX,
            write_buf_dynalloc: true,
            tr_buf_limit: usize::MAX,
            tr_buf_dynalloc: true,
            create: true,
            mode: 0o600,
        }
    }
}

impl DbParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ceiling for the commit write buffer, in bytes.
    pub fn write_buf_limit(mut self, limit: usize) -> Self {
        self.write_buf_limit = limit;
        self
    }

    /// Whether the write buffer may grow on demand. When false, the full
    /// limit is reserved at open and never reallocated.
    pub fn write_buf_dynalloc(mut self, dynalloc: bool) -> Self {
        self.write_buf_dynalloc = dynalloc;
        self
    }

    /// Default arena ceiling for transactions created from this database.
    pub fn tr_buf_limit(mut self, limit: usize) -> Self {
        self.tr_buf_limit = limit;
        self
    }

    /// Default arena mode for transactions created from this database:
    /// dynamic (true) or fixed slab (false).
    pub fn tr_buf_dynalloc(mut self, dynalloc: bool) -> Self {
        self.tr_buf_dynalloc = dynalloc;
        self
    }

    /// Whether opening may create the file if it does not exist.
    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// Unix permission bits used when the file is created.
    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }
}

/// Snapshot of the live footer's placement fields, as reported by
/// [`Database::info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbInfo {
    /// File offset of the live root node.
    pub root_off: u64,
    /// Start of the reclaimable gap (half-open interval).
    pub gap_begin: u64,
    /// End of the reclaimable gap.
    pub gap_end: u64,
}

#[derive(Debug)]
pub struct Database {
    file: Mutex<DbFile>,
    params: DbParams,
}

impl Database {
    /// Open (creating if missing) a database file with default parameters.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, DbParams::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, params: DbParams) -> Result<Self> {
        let write_buf = WriteBuffer::new(params.write_buf_limit, params.write_buf_dynalloc)?;
        let file = DbFile::open(path.as_ref(), params.create, params.mode, write_buf)?;
        // validate the tail up front so a torn or foreign file fails at
        // open rather than at first use
        file.read_info().wrap_err_with(|| {
            format!(
                "failed to read database tail from '{}'",
                path.as_ref().display()
            )
        })?;
        Ok(Self {
            file: Mutex::new(file),
            params,
        })
    }

    /// New transaction with the database's default arena parameters.
    pub fn transaction(&self) -> Result<Transaction<'_>> {
        Transaction::new(
            Some(self),
            self.params.tr_buf_limit,
            self.params.tr_buf_dynalloc,
        )
    }

    /// New transaction with an explicit arena ceiling and mode.
    pub fn transaction_with(&self, limit: usize, dynalloc: bool) -> Result<Transaction<'_>> {
        Transaction::new(Some(self), limit, dynalloc)
    }

    /// Flush file contents to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync()
    }

    /// Sync and release the database. Dropping the handle also releases it,
    /// without the final sync.
    pub fn close(self) -> Result<()> {
        let file = self.file.into_inner();
        file.sync()
    }

    /// Read the live footer's root offset and gap bounds.
    pub fn info(&self) -> Result<DbInfo> {
        let info = self.file.lock().read_info()?;
        Ok(DbInfo {
            root_off: info.footer.root_off.get(),
            gap_begin: info.footer.gap_begin.get(),
            gap_end: info.footer.gap_end.get(),
        })
    }

    pub(crate) fn file(&self) -> MutexGuard<'_, DbFile> {
        self.file.lock()
    }
}
