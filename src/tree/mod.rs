//! Content trees
//!
//! Hashing, path confinement, walking and listing filters for stored content,
//! whether it is a single file or an exploded directory.

pub mod filter;
pub mod hasher;
pub mod path;
pub mod walker;
