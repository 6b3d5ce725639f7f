//! Common module for library exports

pub use crate::builder::{build, ImageLocation, RegionTree};
pub use crate::config::{WalkConfig, MAX_NESTING_THRESHOLD};
pub use crate::error::{WalkError, WalkResult};
pub use crate::images::StoredImages;
pub use crate::memory::{AccessError, MemoryAccessor, MemoryReadExt, SnapshotMemory, UnavailableMemory};
pub use crate::query::{resolve, PathQuery, QueryOutcome};
pub use crate::region::{Region, RegionKind};
pub use crate::render::{render, RenderOptions};
pub use crate::summary::{aggregate, aggregate_parallel, write_report, SummaryStats};
pub use crate::types::{Address, ByteOrder, PointerWidth, ScalarType, ScalarValue};
pub use crate::walker::{ClassWalker, ImageKind, SectionWalker};
