//! # Error Types
//!
//! Fatal errors for engine operations.
//!
//! Partial failure is normal when walking a core dump, so most of what goes
//! wrong never becomes a [`WalkError`]:
//!
//! - a faulting read marks one region `corrupt` and the walk continues;
//! - a sibling that overlaps its predecessor marks the parent `corrupt`;
//! - a path query that matches nothing is a per-query outcome.
//!
//! Only conditions that make the whole operation meaningless propagate: the
//! snapshot being gone, invalid caller input, or a broken output sink.

use thiserror::Error;

use crate::memory::AccessError;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum WalkError
{
    /// The memory accessor cannot serve reads at all
    ///
    /// Unlike a fault, which is local to one address range, this means the
    /// target is gone (detached process, closed snapshot). No tree work is
    /// attempted once this is seen.
    #[error("Memory accessor unavailable: {0}")]
    AccessorUnavailable(String),

    /// Invalid argument passed by the caller
    ///
    /// Examples:
    /// - Nesting threshold above the supported maximum
    /// - Zero-width hex dumps
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A path query string could not be parsed
    ///
    /// Raised for every query before any resolution starts, so one bad path
    /// never leaves the caller with half the answers.
    #[error("Malformed query '{query}': {reason}")]
    MalformedQuery
    {
        /// The query text as supplied
        query: String,
        /// What is wrong with it
        reason: String,
    },

    /// I/O error, typically from the render or report sink
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WalkError
{
    /// Split a read error into a fault the caller can contain and a fatal
    /// accessor failure
    ///
    /// Faults come back as `Ok` for the caller to record; an unavailable
    /// accessor becomes [`WalkError::AccessorUnavailable`].
    pub(crate) fn escalate(err: AccessError) -> Result<AccessError, Self>
    {
        match err {
            AccessError::Unavailable(reason) => Err(WalkError::AccessorUnavailable(reason)),
            fault @ AccessError::Fault { .. } => Ok(fault),
        }
    }
}

/// Convenience type alias for `Result<T, WalkError>`
///
/// ```rust
/// use classwalk_core::error::WalkResult;
/// fn foo() -> WalkResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type WalkResult<T> = std::result::Result<T, WalkError>;
