//! # TrieKV Configuration Module
//!
//! This module centralizes the on-disk format constants and engine tuning
//! values. The format constants are load-bearing: writer and reader must
//! agree on every one of them or database files become unreadable, so they
//! live in one place with compile-time assertions instead of being scattered
//! across the codec and file layers.

pub mod constants;
pub use constants::*;
