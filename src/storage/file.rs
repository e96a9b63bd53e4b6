//! # Database File Access
//!
//! [`DbFile`] owns the file handle and the commit write buffer. The file is
//! an append-preferred log, so all access is positional (`pread`/`pwrite`
//! through `FileExt`) and there is no seek-position state to corrupt.
//!
//! ## Root discovery
//!
//! The live root is found from the file tail: the last 49 bytes are parsed
//! as a footer candidate and validated by signature. An empty file is an
//! empty database; a non-empty file shorter than one footer, a bad
//! signature, or a footer describing a transaction larger than the file are
//! all corruption.
//!
//! ## Write buffer
//!
//! Commits serialize a whole transaction block into one buffer and hand it
//! to a single positioned write, so a torn commit can only ever truncate
//! the tail — it never damages earlier transactions. The buffer honors the
//! configured ceiling, and in non-dynamic mode it is reserved once at open
//! and never reallocated.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::FileExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use eyre::{bail, eyre, Result, WrapErr};

use crate::config::{BLOCK_TRANSACTION, FOOTER_SIZE, TR_HEADER_SIZE};
use crate::error::StoreError;
use crate::storage::format::{Footer, TrHeader};
use zerocopy::FromZeros;

/// Decoded state of the file tail: size plus the live footer (zeroed for an
/// empty file).
#[derive(Debug, Clone, Copy)]
pub(crate) struct FileInfo {
    pub filesize: u64,
    pub footer: Footer,
}

#[derive(Debug)]
pub(crate) struct WriteBuffer {
    buf: Vec<u8>,
    limit: usize,
    dynalloc: bool,
}

impl WriteBuffer {
    pub fn new(limit: usize, dynalloc: bool) -> Result<Self> {
        let mut buf = Vec::new();
        if !dynalloc {
            buf.try_reserve_exact(limit).map_err(|_| {
                eyre!(StoreError::OutOfMemory {
                    requested: limit,
                    limit,
                })
            })?;
        }
        Ok(Self {
            buf,
            limit,
            dynalloc,
        })
    }

    /// Make the buffer at least `size` bytes long, within the ceiling.
    pub fn ensure(&mut self, size: usize) -> Result<()> {
        if size > self.limit || (!self.dynalloc && size > self.buf.capacity()) {
            bail!(StoreError::OutOfMemory {
                requested: size,
                limit: self.limit,
            });
        }
        if size > self.buf.len() {
            self.buf.resize(size, 0);
        }
        Ok(())
    }

    pub fn slice_mut(&mut self, size: usize) -> &mut [u8] {
        &mut self.buf[..size]
    }

    pub fn slice(&self, size: usize) -> &[u8] {
        &self.buf[..size]
    }
}

#[derive(Debug)]
pub(crate) struct DbFile {
    file: File,
    path: PathBuf,
    pub(crate) write_buf: WriteBuffer,
}

impl DbFile {
    pub fn open(
        path: &Path,
        create: bool,
        mode: u32,
        write_buf: WriteBuffer,
    ) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .mode(mode)
            .open(path)
            .wrap_err_with(|| format!("failed to open database file '{}'", path.display()))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            write_buf,
        })
    }

    /// Read the file tail and decode the live footer.
    pub fn read_info(&self) -> Result<FileInfo> {
        let filesize = self
            .file
            .metadata()
            .wrap_err_with(|| format!("failed to stat '{}'", self.path.display()))?
            .len();

        if filesize == 0 {
            return Ok(FileInfo {
                filesize,
                footer: Footer::new_zeroed(),
            });
        }
        if filesize <= FOOTER_SIZE as u64 {
            return Err(eyre!(StoreError::Corrupted)
                .wrap_err("non-empty database file is smaller than a footer"));
        }

        let footer_pos = filesize - FOOTER_SIZE as u64;
        let mut buf = [0u8; FOOTER_SIZE];
        self.read_exact_at(&mut buf, footer_pos)?;

        match Footer::from_bytes(&buf) {
            Ok(footer) if footer.transaction_size.get() <= footer_pos => {
                Ok(FileInfo { filesize, footer })
            }
            // A torn append leaves transaction bytes past the last durable
            // footer; the previous commit is still intact and wins. Walk
            // the block chain to find the most recent complete footer.
            _ => match self.recover_tail(filesize) {
                Some(footer) => Ok(FileInfo { filesize, footer }),
                None => Err(eyre!(StoreError::Corrupted).wrap_err(
                    "file tail is not a valid footer and no earlier footer is recoverable",
                )),
            },
        }
    }

    /// Follow the transaction-block chain from the start of the file and
    /// return the last footer that is fully present and valid.
    fn recover_tail(&self, filesize: u64) -> Option<Footer> {
        let mut pos = 0u64;
        let mut last: Option<Footer> = None;

        while pos + (TR_HEADER_SIZE + FOOTER_SIZE) as u64 <= filesize {
            let mut header_buf = [0u8; TR_HEADER_SIZE];
            if self.read_exact_at(&mut header_buf, pos).is_err() {
                break;
            }
            let Ok(header) = TrHeader::from_bytes(&header_buf) else {
                break;
            };
            if header.block_type != BLOCK_TRANSACTION {
                break;
            }
            let footer_off = header.footer_off.get();
            if footer_off <= pos || footer_off + FOOTER_SIZE as u64 > filesize {
                break;
            }

            let mut footer_buf = [0u8; FOOTER_SIZE];
            if self.read_exact_at(&mut footer_buf, footer_off).is_err() {
                break;
            }
            let Ok(footer) = Footer::from_bytes(&footer_buf) else {
                break;
            };
            if !footer.is_footer_block() || footer.transaction_size.get() > footer_off {
                break;
            }

            last = Some(footer);
            pos = footer_off + FOOTER_SIZE as u64;
        }
        last
    }

    pub fn read_exact_at(&self, buf: &mut [u8], off: u64) -> Result<()> {
        self.file.read_exact_at(buf, off).wrap_err_with(|| {
            format!(
                "failed to read {} bytes at offset {} from '{}'",
                buf.len(),
                off,
                self.path.display()
            )
        })
    }

    /// Read up to `buf.len()` bytes at `off`, stopping at end of file.
    /// Returns the number of bytes read.
    pub fn read_probe_at(&self, buf: &mut [u8], off: u64) -> Result<usize> {
        let mut total = 0usize;
        while total < buf.len() {
            match self.file.read_at(&mut buf[total..], off + total as u64) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(e).wrap_err_with(|| {
                        format!(
                            "failed to read at offset {} from '{}'",
                            off,
                            self.path.display()
                        )
                    })
                }
            }
        }
        Ok(total)
    }

    pub fn write_all_at(&self, buf: &[u8], off: u64) -> Result<()> {
        self.file.write_all_at(buf, off).wrap_err_with(|| {
            format!(
                "failed to write {} bytes at offset {} to '{}'",
                buf.len(),
                off,
                self.path.display()
            )
        })
    }

    /// Write the first `size` bytes of the write buffer at `off`.
    pub fn flush_buf_at(&self, off: u64, size: usize) -> Result<()> {
        self.write_all_at(self.write_buf.slice(size), off)
    }

    pub fn sync(&self) -> Result<()> {
        self.file
            .sync_all()
            .wrap_err_with(|| format!("failed to sync '{}'", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BLOCK_FOOTER, SIGNATURE, TR_HEADER_SIZE};
    use zerocopy::IntoBytes;

    fn open_temp(dir: &tempfile::TempDir) -> DbFile {
        let path = dir.path().join("test.tkv");
        DbFile::open(
            &path,
            true,
            0o600,
            WriteBuffer::new(usize::MAX, true).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn empty_file_reads_as_empty_info() {
        let dir = tempfile::tempdir().unwrap();
        let file = open_temp(&dir);
        let info = file.read_info().unwrap();
        assert_eq!(info.filesize, 0);
        assert_eq!(info.footer.root_off.get(), 0);
    }

    #[test]
    fn short_nonempty_file_is_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let file = open_temp(&dir);
        file.write_all_at(b"stub", 0).unwrap();
        let err = file.read_info().unwrap_err();
        assert_eq!(
            err.downcast_ref::<StoreError>(),
            Some(&StoreError::Corrupted)
        );
    }

    #[test]
    fn valid_tail_footer_is_discovered() {
        let dir = tempfile::tempdir().unwrap();
        let file = open_temp(&dir);

        let mut footer = Footer::new_zeroed();
        footer.block_type = BLOCK_FOOTER;
        footer.signature = SIGNATURE;
        footer.root_off.set(TR_HEADER_SIZE as u64);
        footer.transaction_size.set(30);

        file.write_all_at(&[0u8; 30], 0).unwrap();
        file.write_all_at(footer.as_bytes(), 30).unwrap();

        let info = file.read_info().unwrap();
        assert_eq!(info.filesize, 30 + FOOTER_SIZE as u64);
        assert_eq!(info.footer.root_off.get(), TR_HEADER_SIZE as u64);
    }

    #[test]
    fn oversized_transaction_in_footer_is_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let file = open_temp(&dir);

        let mut footer = Footer::new_zeroed();
        footer.block_type = BLOCK_FOOTER;
        footer.signature = SIGNATURE;
        footer.transaction_size.set(1_000_000);

        file.write_all_at(&[0u8; 10], 0).unwrap();
        file.write_all_at(footer.as_bytes(), 10).unwrap();

        let err = file.read_info().unwrap_err();
        assert_eq!(
            err.downcast_ref::<StoreError>(),
            Some(&StoreError::Corrupted)
        );
    }

    #[test]
    fn bounded_write_buffer_refuses_growth() {
        let mut buf = WriteBuffer::new(64, true).unwrap();
        buf.ensure(64).unwrap();
        let err = buf.ensure(65).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::OutOfMemory { .. })
        ));
    }

    #[test]
    fn probe_read_stops_at_end_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = open_temp(&dir);
        file.write_all_at(b"0123456789", 0).unwrap();

        let mut buf = [0u8; 64];
        let got = file.read_probe_at(&mut buf, 4).unwrap();
        assert_eq!(got, 6);
        assert_eq!(&buf[..6], b"456789");
    }
}
