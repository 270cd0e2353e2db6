//! Error types for the profman workspace.
//!
//! Two enums cover the whole system:
//!
//! - [`ProcessError`] for anything that touches OS processes, ports and
//!   lock files (the supervisor and hygiene layers).
//! - [`Error`] for domain and registry failures, wrapping `ProcessError`
//!   so callers above the supervisor deal with a single type.
//!
//! Every error maps onto one [`ErrorClass`]. Only transient errors are
//! eligible for automatic retry.
//!
//! ```rust
//! use profman_common::{Error, ErrorClass, Result};
//!
//! fn create(alias: &str) -> Result<()> {
//!     Err(Error::duplicate_alias(alias))
//! }
//!
//! let err = create("alpha").unwrap_err();
//! assert_eq!(err.class(), ErrorClass::Domain);
//! ```

use thiserror::Error;

/// Result type alias for profman operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for process operations.
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;

/// Coarse classification used to decide retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Missing executable, missing managed directory entry, malformed
    /// registry. Fatal to the triggering operation, never retried.
    Precondition,
    /// Port not yet free, service not yet reachable, process not yet
    /// terminated. Retried with bounded backoff.
    Transient,
    /// Unknown failure type, duplicate alias and friends. Retrying cannot
    /// change the outcome.
    Domain,
}

/// Main error type for profman operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A requested resource was not found.
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Invalid input or configuration.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// No profile is registered under this ID.
    #[error("Profile not found: {profile_id}")]
    ProfileNotFound { profile_id: String },

    /// Another profile already uses this alias.
    #[error("Duplicate alias: {alias}")]
    DuplicateAlias { alias: String },

    /// A lifecycle state machine is already running for this profile.
    #[error("Lifecycle already running for profile: {profile_id}")]
    LifecycleAlreadyRunning { profile_id: String },

    /// The lifecycle state machine for this profile is no longer accepting work.
    #[error("Lifecycle terminated for profile: {profile_id}")]
    LifecycleTerminated { profile_id: String },

    /// The lifecycle state machine refused a state change.
    #[error("Invalid transition for profile {profile_id}: {from} -> {to}")]
    InvalidTransition {
        profile_id: String,
        from: String,
        to: String,
    },

    /// Recovery was requested with a failure type that has no strategy.
    #[error("unknown failure type: {failure_type}")]
    UnknownFailureType { failure_type: String },

    /// The registry file could not be read, parsed or written.
    #[error("Registry error: {0}")]
    Registry(String),

    /// A system gate condition did not arrive in time.
    #[error("CONDITION_TIMEOUT: condition '{condition}' not satisfied within {timeout_ms}ms")]
    ConditionTimeout { condition: String, timeout_ms: u64 },

    /// The caller gave up waiting.
    #[error("Cancelled: {operation}")]
    Cancelled { operation: String },

    /// Process supervision error.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// I/O error (wraps std::io::Error).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context.
    #[error("{message}: {source}")]
    WithContext {
        message: String,
        source: Box<Error>,
    },
}

impl Error {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn profile_not_found(profile_id: impl Into<String>) -> Self {
        Self::ProfileNotFound {
            profile_id: profile_id.into(),
        }
    }

    pub fn duplicate_alias(alias: impl Into<String>) -> Self {
        Self::DuplicateAlias {
            alias: alias.into(),
        }
    }

    pub fn invalid_transition(
        profile_id: impl Into<String>,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            profile_id: profile_id.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn unknown_failure_type(failure_type: impl Into<String>) -> Self {
        Self::UnknownFailureType {
            failure_type: failure_type.into(),
        }
    }

    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry(message.into())
    }

    pub fn condition_timeout(condition: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::ConditionTimeout {
            condition: condition.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Adds context to an error.
    ///
    /// ```
    /// use profman_common::{Error, Result};
    ///
    /// fn inner() -> Result<()> {
    ///     Err(Error::not_found("profiles.json"))
    /// }
    ///
    /// fn outer() -> Result<()> {
    ///     inner().map_err(|e| e.context("Failed to load registry"))
    /// }
    ///
    /// assert!(outer().unwrap_err().to_string().contains("Failed to load registry"));
    /// ```
    pub fn context(self, message: impl Into<String>) -> Self {
        Self::WithContext {
            message: message.into(),
            source: Box::new(self),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Error::NotFound { .. }
            | Error::Validation { .. }
            | Error::Registry(_)
            | Error::Io(_) => ErrorClass::Precondition,
            Error::ProfileNotFound { .. }
            | Error::DuplicateAlias { .. }
            | Error::LifecycleAlreadyRunning { .. }
            | Error::LifecycleTerminated { .. }
            | Error::InvalidTransition { .. }
            | Error::UnknownFailureType { .. }
            | Error::Cancelled { .. } => ErrorClass::Domain,
            Error::ConditionTimeout { .. } => ErrorClass::Transient,
            Error::Process(e) => e.class(),
            Error::WithContext { source, .. } => source.class(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

// Convenience methods for Result types
pub trait ResultExt<T> {
    /// Adds context to an error result.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(message))
    }
}

// ==============================================================================
// Process Supervision Errors
// ==============================================================================

/// Process-specific error types for the supervisor and hygiene layers.
#[derive(Error, Debug, Clone)]
pub enum ProcessError {
    #[error("Process not found: {id}")]
    NotFound { id: String },

    #[error("Process already registered: {id}")]
    AlreadyExists { id: String },

    #[error("Process spawn failed: {id} - {reason}")]
    SpawnFailed { id: String, reason: String },

    #[error("Process stop failed: {id} - {reason}")]
    StopFailed { id: String, reason: String },

    #[error("Process timeout: {id} - {operation}")]
    Timeout { id: String, operation: String },

    #[error("Port {port} could not be freed: {reason}")]
    PortUnavailable { port: u16, reason: String },

    #[error("Service not reachable on {address} after {waited_ms}ms")]
    ServiceUnreachable { address: String, waited_ms: u64 },

    #[error("Control channel error: {id} - {reason}")]
    ControlChannel { id: String, reason: String },

    #[error("Process configuration error: {id} - {reason}")]
    Configuration { id: String, reason: String },

    #[error("Process inspection failed: {pid} - {reason}")]
    Inspection { pid: u32, reason: String },

    #[error("Unsupported on this platform: {operation}")]
    Unsupported { operation: String },
}

impl ProcessError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn already_exists(id: impl Into<String>) -> Self {
        Self::AlreadyExists { id: id.into() }
    }

    pub fn spawn_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn stop_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StopFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Timeout {
            id: id.into(),
            operation: operation.into(),
        }
    }

    pub fn port_unavailable(port: u16, reason: impl Into<String>) -> Self {
        Self::PortUnavailable {
            port,
            reason: reason.into(),
        }
    }

    pub fn control_channel(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ControlChannel {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn inspection(pid: u32, reason: impl Into<String>) -> Self {
        Self::Inspection {
            pid,
            reason: reason.into(),
        }
    }

    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ProcessError::Timeout { .. }
            | ProcessError::StopFailed { .. }
            | ProcessError::PortUnavailable { .. }
            | ProcessError::ServiceUnreachable { .. }
            | ProcessError::ControlChannel { .. } => ErrorClass::Transient,
            ProcessError::SpawnFailed { .. }
            | ProcessError::Configuration { .. }
            | ProcessError::Inspection { .. }
            | ProcessError::Unsupported { .. } => ErrorClass::Precondition,
            ProcessError::NotFound { .. } | ProcessError::AlreadyExists { .. } => {
                ErrorClass::Domain
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}
