//! Process existence checking.

use profman_common::{ProcessError, ProcessResult};

/// Check if a process with the given PID exists and is running.
///
/// On Unix this is `kill(pid, 0)`: no signal is delivered, only the
/// existence check runs. On Windows it opens a limited query handle.
///
/// # Returns
///
/// * `Ok(true)` - Process exists (including one we may not signal)
/// * `Ok(false)` - Process does not exist
/// * `Err(_)` - The check itself failed
///
/// ```rust,no_run
/// use profman_process::process_exists;
///
/// if process_exists(1234).unwrap_or(false) {
///     println!("Process 1234 is running");
/// }
/// ```
pub fn process_exists(pid: u32) -> ProcessResult<bool> {
    if pid == 0 {
        return Ok(false);
    }

    #[cfg(unix)]
    {
        process_exists_unix(pid)
    }

    #[cfg(windows)]
    {
        process_exists_windows(pid)
    }
}

#[cfg(unix)]
fn process_exists_unix(pid: u32) -> ProcessResult<bool> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let raw = match i32::try_from(pid) {
        Ok(raw) => raw,
        Err(_) => return Ok(false),
    };

    match kill(Pid::from_raw(raw), None) {
        Ok(_) => Ok(true),
        Err(nix::errno::Errno::ESRCH) => Ok(false),
        // Exists, owned by someone else
        Err(nix::errno::Errno::EPERM) => Ok(true),
        Err(e) => Err(ProcessError::inspection(
            pid,
            format!("Failed to check process: {}", e),
        )),
    }
}

#[cfg(windows)]
fn process_exists_windows(pid: u32) -> ProcessResult<bool> {
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    unsafe {
        let handle: HANDLE = match OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) {
            Ok(h) => h,
            Err(e) => {
                let error_code = e.code().0 as u32;
                const ERROR_INVALID_PARAMETER: u32 = 0x80070057;
                const ERROR_ACCESS_DENIED: u32 = 0x80070005;

                if error_code == ERROR_INVALID_PARAMETER {
                    return Ok(false);
                }
                if error_code == ERROR_ACCESS_DENIED {
                    return Ok(true);
                }
                return Err(ProcessError::inspection(
                    pid,
                    format!("Failed to check process: {}", e),
                ));
            }
        };

        let _ = CloseHandle(handle);
        Ok(true)
    }
}
