//! # Transaction Memory Management
//!
//! Every transaction owns a [`NodeArena`] that hands out trie nodes and
//! enforces a byte ceiling. Two allocation modes are supported:
//!
//! - **Dynamic**: each node's payload is an individually owned buffer and
//!   the arena grows on demand up to the ceiling.
//! - **Fixed slab**: a contiguous byte block is reserved up front and node
//!   payloads are bump-allocated from it at 16-byte alignment. Rollback
//!   resets the bump cursor without running per-payload teardown.
//!
//! Enforcement uses hard limits: an allocation that would push the tracked
//! total past the ceiling fails with
//! [`StoreError::OutOfMemory`](crate::StoreError::OutOfMemory) and leaves
//! everything previously allocated intact. This is what makes a bounded
//! transaction safe on memory-constrained hosts: the failure is a refusal,
//! never a partial write.

mod arena;

pub use arena::NodeArena;
