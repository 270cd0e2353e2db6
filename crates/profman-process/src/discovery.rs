//! Process discovery via `sysinfo`.
//!
//! Used by the hygiene auditor to resolve a PID to its executable and to
//! enumerate every process living under the managed binary directory, and
//! by the tree kill to find descendants.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use sysinfo::{Pid, ProcessRefreshKind, System};
use tracing::trace;

/// One row of a process table snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub parent: Option<u32>,
    pub exe: Option<PathBuf>,
}

/// Takes a full snapshot of the OS process table.
pub fn snapshot_processes() -> Vec<ProcessEntry> {
    let mut system = System::new();
    system.refresh_processes_specifics(ProcessRefreshKind::everything());

    system
        .processes()
        .iter()
        .map(|(pid, process)| ProcessEntry {
            pid: pid.as_u32(),
            parent: process.parent().map(|p| p.as_u32()),
            exe: process.exe().map(Path::to_path_buf),
        })
        .collect()
}

/// Resolves the executable path of a running process.
///
/// Returns `None` if the process does not exist or its executable cannot be
/// read (for example a process owned by another user).
pub fn process_executable(pid: u32) -> Option<PathBuf> {
    let mut system = System::new();
    let sysinfo_pid = Pid::from_u32(pid);
    if !system.refresh_process_specifics(sysinfo_pid, ProcessRefreshKind::everything()) {
        return None;
    }
    system
        .process(sysinfo_pid)
        .and_then(|process| process.exe())
        .map(Path::to_path_buf)
}

/// True if `path` lives somewhere under `dir`.
///
/// Both sides are canonicalized when possible so symlinked install
/// directories still match.
pub fn path_is_under(path: &Path, dir: &Path) -> bool {
    let path = canonical_or_raw(path);
    let dir = canonical_or_raw(dir);
    path.starts_with(&dir)
}

fn canonical_or_raw(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// True if the process exists and its executable lives under `managed_dir`.
pub fn is_managed_process(pid: u32, managed_dir: &Path) -> bool {
    match process_executable(pid) {
        Some(exe) => path_is_under(&exe, managed_dir),
        None => false,
    }
}

/// Every process whose executable lives under `managed_dir`.
pub fn find_processes_under(managed_dir: &Path) -> Vec<ProcessEntry> {
    let dir = canonical_or_raw(managed_dir);
    let matches: Vec<ProcessEntry> = snapshot_processes()
        .into_iter()
        .filter(|entry| {
            entry
                .exe
                .as_deref()
                .map(|exe| canonical_or_raw(exe).starts_with(&dir))
                .unwrap_or(false)
        })
        .collect();

    trace!(
        "Found {} processes under {}",
        matches.len(),
        managed_dir.display()
    );
    matches
}

/// Descendants of `root` in leaf-first order (children before parents).
///
/// `root` itself is not included.
pub fn descendants_leaf_first(root: u32, entries: &[ProcessEntry]) -> Vec<u32> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for entry in entries {
        if let Some(parent) = entry.parent {
            if parent != entry.pid {
                children.entry(parent).or_default().push(entry.pid);
            }
        }
    }

    let mut ordered = Vec::new();
    let mut visited = std::collections::HashSet::new();
    collect_post_order(root, &children, &mut visited, &mut ordered);
    ordered.retain(|pid| *pid != root);
    ordered
}

fn collect_post_order(
    pid: u32,
    children: &HashMap<u32, Vec<u32>>,
    visited: &mut std::collections::HashSet<u32>,
    out: &mut Vec<u32>,
) {
    if !visited.insert(pid) {
        return;
    }
    if let Some(kids) = children.get(&pid) {
        for child in kids {
            collect_post_order(*child, children, visited, out);
        }
    }
    out.push(pid);
}
