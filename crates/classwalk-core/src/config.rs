//! Walk configuration shared by the CLI and library callers.

use crate::error::{WalkError, WalkResult};
use crate::types::{ByteOrder, PointerWidth};

/// Deepest nesting threshold a build accepts
pub const MAX_NESTING_THRESHOLD: usize = 64;

/// Default number of blob bytes shown before the dump is cut off
pub const DEFAULT_MAX_DUMP_BYTES: usize = 16;

/// Target description and output knobs for one walk
///
/// Byte order and pointer width describe the target that produced the
/// snapshot and are never guessed from its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkConfig
{
    pub byte_order: ByteOrder,
    pub pointer_width: PointerWidth,
    pub nesting_threshold: usize,
    pub max_dump_bytes: usize,
    pub show_min_max: bool,
}

impl Default for WalkConfig
{
    fn default() -> Self
    {
        Self {
            byte_order: ByteOrder::Little,
            pointer_width: PointerWidth::Bits64,
            nesting_threshold: 2,
            max_dump_bytes: DEFAULT_MAX_DUMP_BYTES,
            show_min_max: false,
        }
    }
}

impl WalkConfig
{
    /// Check the configuration before any image is touched
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if the threshold exceeds [`MAX_NESTING_THRESHOLD`]
    /// or the dump width is zero.
    pub fn validate(&self) -> WalkResult<()>
    {
        if self.nesting_threshold > MAX_NESTING_THRESHOLD {
            return Err(WalkError::InvalidArgument(format!(
                "nesting threshold {} exceeds maximum {MAX_NESTING_THRESHOLD}",
                self.nesting_threshold
            )));
        }
        if self.max_dump_bytes == 0 {
            return Err(WalkError::InvalidArgument("blob dump width must be at least 1 byte".to_string()));
        }
        Ok(())
    }
}
