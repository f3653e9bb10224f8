#![forbid(unsafe_code)]
//! SwarmFS public API facade.
//!
//! Re-exports the operation surface from `sfs-core` through one stable
//! crate for embedders.

pub use sfs_core::*;
