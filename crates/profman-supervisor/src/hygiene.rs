//! Startup hygiene: registry audit and zombie cleanup.
//!
//! The audit is read-only. It loads the registry file without taking the
//! registry lock and proposes corrections; applying them is the caller's
//! job (see `ProfileRegistry::apply_corrections`).

use chrono::Utc;
use profman_common::{Error, ProfileId, Result};
use profman_process::{
    find_processes_under, is_addr_reachable, is_managed_process, kill_process_tree,
    process_exists,
};
use profman_registry::{read_document, Correction, Profile, RegistryDocument};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HygieneReport {
    pub total_profiles: usize,
    pub open_profiles: usize,
    pub orphaned_profiles: Vec<ProfileId>,
    pub corrections: Vec<Correction>,
    /// Corrections applied by whoever acted on this report.
    pub corrected_count: usize,
    pub errors: Vec<String>,
    pub timestamp: String,
}

impl HygieneReport {
    pub fn is_clean(&self) -> bool {
        self.orphaned_profiles.is_empty() && self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub killed: Vec<u32>,
    pub errors: Vec<String>,
}

/// Verdict on one open record.
enum Liveness {
    Live,
    Orphaned(&'static str),
    Unknown(String),
}

pub struct HygieneAuditor {
    managed_dir: PathBuf,
}

impl HygieneAuditor {
    pub fn new(managed_dir: impl Into<PathBuf>) -> Self {
        Self {
            managed_dir: managed_dir.into(),
        }
    }

    pub fn managed_dir(&self) -> &Path {
        &self.managed_dir
    }

    /// Audits every open record in the registry at `registry_path`.
    ///
    /// An open record is orphaned when it has no PID, its PID is dead, the
    /// PID belongs to an executable outside the managed directory, or an
    /// earlier open record already claimed the same live PID. When
    /// `service_address` is given, an unreachable service is noted in the
    /// report's errors.
    pub async fn startup_audit(
        &self,
        registry_path: &Path,
        service_address: Option<SocketAddr>,
    ) -> Result<HygieneReport> {
        // File reads and per-PID process inspection all block
        let registry_path = registry_path.to_path_buf();
        let managed_dir = self.managed_dir.clone();
        let mut report = tokio::task::spawn_blocking(move || {
            read_document(&registry_path).map(|document| audit_document(&document, &managed_dir))
        })
        .await
        .map_err(|e| Error::registry(format!("Audit task failed: {}", e)))??;

        if let Some(addr) = service_address {
            if !is_addr_reachable(addr).await {
                report
                    .errors
                    .push(format!("service not reachable at {}", addr));
            }
        }

        info!(
            "Hygiene audit: {} profiles, {} open, {} orphaned, {} errors",
            report.total_profiles,
            report.open_profiles,
            report.orphaned_profiles.len(),
            report.errors.len()
        );
        Ok(report)
    }

    /// Tree-kills every process running from the managed directory whose
    /// PID is not in `active_pids`.
    ///
    /// Only safe before any lifecycle has launched a process.
    pub fn safe_cleanup(&self, active_pids: &[u32]) -> CleanupReport {
        let own_pid = std::process::id();
        let active: HashSet<u32> = active_pids.iter().copied().collect();
        let mut report = CleanupReport::default();
        let mut killed = HashSet::new();

        for entry in find_processes_under(&self.managed_dir) {
            if entry.pid == own_pid || active.contains(&entry.pid) || killed.contains(&entry.pid)
            {
                continue;
            }

            match kill_process_tree(entry.pid) {
                Ok(pids) => {
                    info!(
                        "Cleaned up stray process {} ({} in tree)",
                        entry.pid,
                        pids.len()
                    );
                    for pid in pids {
                        if killed.insert(pid) {
                            report.killed.push(pid);
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to clean up process {}: {}", entry.pid, e);
                    report.errors.push(format!("pid {}: {}", entry.pid, e));
                }
            }
        }

        report.killed.sort_unstable();
        report
    }
}

fn audit_document(document: &RegistryDocument, managed_dir: &Path) -> HygieneReport {
    let mut report = HygieneReport {
        total_profiles: document.profiles.len(),
        open_profiles: 0,
        orphaned_profiles: Vec::new(),
        corrections: Vec::new(),
        corrected_count: 0,
        errors: Vec::new(),
        timestamp: Utc::now().to_rfc3339(),
    };
    let mut claimed = HashSet::new();

    for profile in document.open_profiles() {
        report.open_profiles += 1;
        match liveness(profile, managed_dir, &mut claimed) {
            Liveness::Live => {
                debug!("Profile {} is live (PID {:?})", profile.id, profile.pid);
            }
            Liveness::Orphaned(why) => {
                warn!(
                    "Profile {} is orphaned (PID {:?}): {}",
                    profile.id, profile.pid, why
                );
                report.orphaned_profiles.push(profile.id.clone());
                report.corrections.push(Correction::orphaned(profile));
            }
            Liveness::Unknown(reason) => {
                report
                    .errors
                    .push(format!("profile {}: {}", profile.id, reason));
            }
        }
    }
    report
}

/// A live PID is granted to the first open record that names it.
fn liveness(profile: &Profile, managed_dir: &Path, claimed: &mut HashSet<u32>) -> Liveness {
    let Some(pid) = profile.pid else {
        return Liveness::Orphaned("no recorded PID");
    };

    match process_exists(pid) {
        Ok(false) => Liveness::Orphaned("process is gone"),
        Ok(true) if !is_managed_process(pid, managed_dir) => {
            Liveness::Orphaned("PID belongs to an unmanaged executable")
        }
        Ok(true) if !claimed.insert(pid) => {
            Liveness::Orphaned("PID already claimed by another open record")
        }
        Ok(true) => Liveness::Live,
        Err(e) => Liveness::Unknown(e.to_string()),
    }
}
