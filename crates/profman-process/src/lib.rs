//! # Profman Process
//!
//! Low-level OS process primitives used by the supervisor and the hygiene
//! auditor:
//! - PID liveness checks
//! - Graceful and forced termination, process-tree kill
//! - Executable-path discovery for running processes
//! - TCP port probing and port-owner lookup
//!
//! Nothing in here owns a process handle. Handles live in the supervisor;
//! these functions work on bare PIDs.

pub mod check;
pub mod discovery;
pub mod port;
pub mod terminate;
pub mod validation;

pub use check::*;
pub use discovery::*;
pub use port::*;
pub use terminate::*;
pub use validation::*;
