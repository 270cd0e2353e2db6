//! # Profman Supervisor
//!
//! Owns every child process the orchestrator starts:
//! - [`ProcessSupervisor`], the single mutex-guarded process table (the reaper)
//! - [`ProcessControl`], the seam the lifecycle layer launches and stops through
//! - [`HygieneAuditor`], startup registry audit and stray-process cleanup

pub mod control;
pub mod hygiene;
pub mod supervisor;

#[cfg(all(test, unix))]
mod test_support;

pub use control::{
    ControlChannel, LaunchReceipt, ProcessControl, SupervisorControl, TcpControlChannel,
    RECOVERY_PING,
};
pub use hygiene::{CleanupReport, HygieneAuditor, HygieneReport};
pub use supervisor::{
    ProcessInfo, ProcessLaunch, ProcessSupervisor, ServiceSpec, SupervisorConfig,
    SupervisorStatus, STALE_LOCK_FILES,
};
