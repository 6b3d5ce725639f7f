//! # classwalk Utilities
//!
//! Shared utilities, logging, and helpers for classwalk.
//!
//! This crate provides common functionality used across the classwalk
//! workspace, mainly the `tracing` subscriber setup used by the CLI.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{init_logging, init_logging_with_level, LogFormat, LogLevel, LoggingError};
pub use tracing::{debug, error, info, trace, warn};
