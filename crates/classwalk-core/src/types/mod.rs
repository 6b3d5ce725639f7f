//! # Types
//!
//! Target-description types used throughout the engine.
//!
//! Snapshots come from targets of either byte order and either pointer
//! width; these types carry that choice explicitly instead of assuming the
//! host's layout.

pub mod address;
pub mod layout;

// Re-export all public types
pub use address::{Address, PaddedAddress};
pub use layout::{ByteOrder, PointerWidth, ScalarEncoding, ScalarType, ScalarValue};
