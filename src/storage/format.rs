//! # On-Disk Structures
//!
//! This module provides type-safe, zerocopy-based structs for the three
//! fixed-layout records in a database file. All multi-byte fields are
//! little-endian; every struct is packed (alignment 1) so it can be read
//! straight out of an arbitrary file offset.
//!
//! ## Footer (49 bytes)
//!
//! ```text
//! Offset  Size  Description
//! 0       1     Block type (1 = footer, 2 = removed by vacuum)
//! 1       8     Signature "tkvdb003"
//! 9       8     Offset of the root node
//! 17      8     Size of the transaction block, header included
//! 25      8     Transaction id (monotonic per commit)
//! 33      8     Gap begin (reclaimable region, half-open)
//! 41      8     Gap end
//! ```
//!
//! The footer at the tail of the file names the live root. Its signature is
//! the durability marker: a torn transaction write leaves the previous
//! footer as the last valid tail, and a torn footer write fails the
//! signature check.
//!
//! ## Transaction header (9 bytes)
//!
//! ```text
//! Offset  Size  Description
//! 0       1     Block type (0 = transaction)
//! 1       8     Offset of this transaction's footer
//! ```
//!
//! ## Node header (11 bytes)
//!
//! ```text
//! Offset  Size  Description
//! 0       4     Total serialized node size, this header included
//! 4       1     Node flags (value present, metadata present)
//! 5       2     Child count
//! 7       4     Prefix length
//! ```
//!
//! The node header is followed by: the value length (4 bytes, if flagged),
//! the metadata length (4 bytes, if flagged), the child table, and the
//! prefix/value/metadata bytes. See the codec for the child table layouts.

use eyre::{ensure, eyre, Result};
use zerocopy::little_endian::{U16, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{
    BLOCK_FOOTER, BLOCK_REMOVED_FOOTER, DISK_NODE_HEADER_SIZE, FOOTER_SIZE, SIGNATURE,
    TR_HEADER_SIZE,
};
use crate::error::StoreError;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub(crate) struct Footer {
    pub block_type: u8,
    pub signature: [u8; 8],
    pub root_off: U64,
    pub transaction_size: U64,
    pub transaction_id: U64,
    pub gap_begin: U64,
    pub gap_end: U64,
}

const _: () = assert!(std::mem::size_of::<Footer>() == FOOTER_SIZE);

impl Footer {
    /// Parse and validate a footer candidate. The signature decides whether
    /// these bytes are a footer at all.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure!(
            bytes.len() >= FOOTER_SIZE,
            "buffer too small for footer: {} < {}",
            bytes.len(),
            FOOTER_SIZE
        );
        let footer = Footer::read_from_bytes(&bytes[..FOOTER_SIZE])
            .map_err(|e| eyre!("failed to parse footer: {:?}", e))?;
        if footer.signature != SIGNATURE {
            return Err(eyre!(StoreError::Corrupted).wrap_err("bad footer signature"));
        }
        Ok(footer)
    }

    /// True for the block types a valid footer may carry: live, or removed
    /// by vacuum.
    pub fn is_footer_block(&self) -> bool {
        self.block_type == BLOCK_FOOTER || self.block_type == BLOCK_REMOVED_FOOTER
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub(crate) struct TrHeader {
    pub block_type: u8,
    pub footer_off: U64,
}

const _: () = assert!(std::mem::size_of::<TrHeader>() == TR_HEADER_SIZE);

impl TrHeader {
    pub fn new(block_type: u8, footer_off: u64) -> Self {
        Self {
            block_type,
            footer_off: U64::new(footer_off),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure!(
            bytes.len() >= TR_HEADER_SIZE,
            "buffer too small for transaction header: {} < {}",
            bytes.len(),
            TR_HEADER_SIZE
        );
        TrHeader::read_from_bytes(&bytes[..TR_HEADER_SIZE])
            .map_err(|e| eyre!("failed to parse transaction header: {:?}", e))
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub(crate) struct DiskNodeHeader {
    pub size: U32,
    pub flags: u8,
    pub nsubnodes: U16,
    pub prefix_size: U32,
}

const _: () = assert!(std::mem::size_of::<DiskNodeHeader>() == DISK_NODE_HEADER_SIZE);

impl DiskNodeHeader {
    pub fn new(size: u32, flags: u8, nsubnodes: u16, prefix_size: u32) -> Self {
        Self {
            size: U32::new(size),
            flags,
            nsubnodes: U16::new(nsubnodes),
            prefix_size: U32::new(prefix_size),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure!(
            bytes.len() >= DISK_NODE_HEADER_SIZE,
            "buffer too small for node header: {} < {}",
            bytes.len(),
            DISK_NODE_HEADER_SIZE
        );
        DiskNodeHeader::read_from_bytes(&bytes[..DISK_NODE_HEADER_SIZE])
            .map_err(|e| eyre!("failed to parse node header: {:?}", e))
    }
}
