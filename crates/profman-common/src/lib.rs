//! # Profman Common
//!
//! Common types and utilities shared across the profman workspace.
//!
//! This crate provides the foundational pieces every other crate builds
//! upon: the error taxonomy, profile identifiers and the retry policy used
//! for transient infrastructure failures.

pub mod errors;
pub mod retry;
pub mod types;

// Re-export commonly used items
pub use errors::{Error, ErrorClass, ProcessError, ProcessResult, Result, ResultExt};
pub use retry::{retry, retry_with_backoff, RetryPolicy};
pub use types::{
    ProfileId, BROWSER_PROCESS_PREFIX, DEFAULT_CONTROL_PORT, ENGINE_SERVICE_NAME,
};
