//! Process validation utilities.

use profman_common::{ProcessError, ProcessResult};
use std::path::Path;

/// Validate that an executable exists and is a regular file.
pub fn validate_executable(path: &Path) -> ProcessResult<()> {
    if path.as_os_str().is_empty() {
        return Err(ProcessError::configuration(
            "validation",
            "Executable path cannot be empty",
        ));
    }

    let metadata = std::fs::metadata(path).map_err(|e| {
        ProcessError::configuration(path.display().to_string(), format!("not accessible: {}", e))
    })?;

    if !metadata.is_file() {
        return Err(ProcessError::configuration(
            path.display().to_string(),
            "not a regular file",
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(ProcessError::configuration(
                path.display().to_string(),
                "file is not executable",
            ));
        }
    }

    Ok(())
}

/// Validate a supervisor-visible process name.
pub fn validate_process_name(name: &str) -> ProcessResult<()> {
    if name.is_empty() {
        return Err(ProcessError::configuration(
            "validation",
            "Process name cannot be empty",
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ProcessError::configuration(
            name,
            "Process name can only contain alphanumeric characters, hyphens, and underscores",
        ));
    }

    Ok(())
}
