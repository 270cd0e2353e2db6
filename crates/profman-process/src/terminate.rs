//! Process termination primitives.
//!
//! Signalling a process that is already gone counts as success: the goal
//! of every function here is "this PID is no longer running".

use crate::check::process_exists;
use crate::discovery::{descendants_leaf_first, snapshot_processes};
use profman_common::{ProcessError, ProcessResult};
use std::time::Duration;
use tracing::{debug, warn};

/// Poll interval used while waiting for a PID to disappear.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Longest wait any polling loop is allowed to schedule.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + timeout`, saturating so an oversized timeout cannot overflow
/// the clock.
pub fn deadline_after(timeout: Duration) -> tokio::time::Instant {
    let now = tokio::time::Instant::now();
    now.checked_add(timeout.min(FAR_FUTURE)).unwrap_or(now)
}

/// Terminate a process gracefully (SIGTERM on Unix, Ctrl+Break on Windows).
pub fn terminate_gracefully(pid: u32) -> ProcessResult<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};

        match kill(to_nix_pid(pid)?, Signal::SIGTERM) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(ProcessError::stop_failed(pid.to_string(), e.to_string())),
        }
    }

    #[cfg(windows)]
    {
        use windows::Win32::System::Console::{GenerateConsoleCtrlEvent, CTRL_BREAK_EVENT};

        // Children are spawned in their own process group, whose ID is the PID.
        unsafe { GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pid) }
            .map_err(|e| ProcessError::stop_failed(pid.to_string(), e.to_string()))
    }
}

/// Force kill a process (SIGKILL on Unix, TerminateProcess on Windows).
pub fn force_kill(pid: u32) -> ProcessResult<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};

        match kill(to_nix_pid(pid)?, Signal::SIGKILL) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(ProcessError::stop_failed(pid.to_string(), e.to_string())),
        }
    }

    #[cfg(windows)]
    {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Threading::{OpenProcess, TerminateProcess, PROCESS_TERMINATE};

        if !process_exists(pid)? {
            return Ok(());
        }

        unsafe {
            let handle = match OpenProcess(PROCESS_TERMINATE, false, pid) {
                Ok(h) if !h.is_invalid() => h,
                _ => {
                    return Err(ProcessError::stop_failed(
                        pid.to_string(),
                        "Failed to open process for termination",
                    ));
                }
            };

            let result = TerminateProcess(handle, 1);
            let _ = CloseHandle(handle);

            result.map_err(|e| {
                ProcessError::stop_failed(pid.to_string(), format!("TerminateProcess failed: {}", e))
            })
        }
    }
}

#[cfg(unix)]
fn to_nix_pid(pid: u32) -> ProcessResult<nix::unistd::Pid> {
    // 0 and negative values address process groups, never a single process.
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Ok(nix::unistd::Pid::from_raw(raw)),
        _ => Err(ProcessError::configuration(
            pid.to_string(),
            "PID out of range for signalling",
        )),
    }
}

/// Waits until `pid` no longer exists, or `timeout` elapses.
///
/// Returns `true` if the process exited within the window.
pub async fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = deadline_after(timeout);
    loop {
        match process_exists(pid) {
            Ok(false) => return true,
            Ok(true) => {}
            Err(e) => {
                debug!("Liveness check for PID {} failed: {}", pid, e);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
    }
}

/// Force-kills `pid` and every descendant, children before parents.
///
/// Returns the PIDs that were signalled. Individual failures on
/// descendants are logged; a failure to kill the root is returned.
pub fn kill_process_tree(pid: u32) -> ProcessResult<Vec<u32>> {
    let entries = snapshot_processes();
    let descendants = descendants_leaf_first(pid, &entries);
    let own_pid = std::process::id();

    let mut killed = Vec::with_capacity(descendants.len() + 1);
    for child in descendants {
        if child == own_pid {
            continue;
        }
        match force_kill(child) {
            Ok(()) => killed.push(child),
            Err(e) => warn!("Failed to kill descendant {} of {}: {}", child, pid, e),
        }
    }

    force_kill(pid)?;
    killed.push(pid);
    debug!("Killed process tree rooted at {} ({} processes)", pid, killed.len());
    Ok(killed)
}
