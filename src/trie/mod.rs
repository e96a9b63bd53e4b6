//! # Radix Trie Engine
//!
//! The in-memory side of the store: a radix (Patricia) trie in which each
//! edge carries a byte-string label and non-branching paths are compressed
//! into a single edge. A key's bytes spell a path from the root; a node
//! whose value flag is set marks the key formed by the path label plus the
//! node's own prefix.
//!
//! All mutation paths share one walk-by-byte loop with two inner steps:
//! advance through the current node's prefix, or descend into the child
//! indexed by the next key byte (faulting it in from disk when only an
//! on-disk offset is known). The walk terminates in a small set of match
//! cases handled by [`ops`].
//!
//! Mutations never edit a reachable node in place (with one deliberate
//! exception: overwriting a value with one of identical, non-zero length).
//! Instead a replacement node is allocated and the old node is forwarded to
//! it, which keeps previously taken references and older roots valid — the
//! copy-on-write discipline the persistence layer relies on to share
//! unmodified subtrees between commits.

pub mod node;
pub(crate) mod ops;
