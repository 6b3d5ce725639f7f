//! # classwalk-core
//!
//! Region tree engine for decoding class images out of frozen process
//! snapshots.
//!
//! Given a byte-addressable snapshot and the base address of a class image,
//! the engine describes the image as a tree of named, addressed, sized
//! regions, and then:
//! - renders the tree as indented text ([`render`])
//! - resolves slash-delimited path queries against it ([`query`])
//! - folds many trees into per-name size statistics ([`summary`])
//!
//! ## Tolerating corruption
//!
//! Core dumps are frequently damaged. A read that faults marks one region as
//! corrupt and the walk moves on; members that break address ordering mark
//! their parent. Only a snapshot that cannot be read at all, or invalid
//! input from the caller, fails an operation outright (see [`error`]).
//!
//! ## Image kinds
//!
//! Layout knowledge lives in [`walker`]: one [`walker::SectionWalker`] per
//! image kind, combined in the [`walker::ClassWalker`] enum.

pub mod builder;
pub mod config;
pub mod error;
pub mod images;
pub mod memory;
pub mod prelude;
pub mod query;
pub mod region;
pub mod render;
pub mod summary;
pub mod types;
pub mod walker;

// Re-export commonly used types
pub use builder::{build, ImageLocation, RegionTree};
pub use error::{WalkError, WalkResult};
pub use region::{Region, RegionKind};
