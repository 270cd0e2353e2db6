//! Shared fixtures for the orchestration integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use profman_common::{Error, ProfileId, Result};
use profman_orchestration::{LifecycleSettings, Orchestrator};
use profman_profile_state::ProfileStatus;
use profman_supervisor::{LaunchReceipt, ProcessControl};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Process layer that keeps a table of "live" launches in memory.
///
/// `launch_failures` are returned, one per call, before launches succeed
/// again.
#[derive(Default)]
pub struct MockControl {
    pub table: Mutex<HashMap<ProfileId, u32>>,
    pub launches: Mutex<Vec<ProfileId>>,
    pub stops: Mutex<Vec<ProfileId>>,
    pub launch_failures: Mutex<VecDeque<String>>,
}

#[async_trait]
impl ProcessControl for MockControl {
    async fn launch_profile(&self, profile_id: &ProfileId) -> Result<LaunchReceipt> {
        self.launches.lock().push(profile_id.clone());
        if let Some(message) = self.launch_failures.lock().pop_front() {
            return Err(Error::validation(message));
        }
        let pid = 10_000 + self.launches.lock().len() as u32;
        self.table.lock().insert(profile_id.clone(), pid);
        Ok(LaunchReceipt {
            pid,
            launch_id: format!("launch-{}", pid),
        })
    }

    async fn stop_profile(&self, profile_id: &ProfileId) -> Result<()> {
        self.stops.lock().push(profile_id.clone());
        self.table.lock().remove(profile_id);
        Ok(())
    }

    async fn ping_profile(&self, profile_id: &ProfileId) -> Result<()> {
        if self.table.lock().contains_key(profile_id) {
            Ok(())
        } else {
            Err(Error::not_found(profile_id.browser_process_name()))
        }
    }

    async fn is_profile_running(&self, profile_id: &ProfileId) -> bool {
        self.table.lock().contains_key(profile_id)
    }
}

pub fn fast_settings() -> LifecycleSettings {
    LifecycleSettings {
        retry: profman_common::RetryPolicy {
            max_attempts: 2,
            initial_interval: Duration::from_millis(1),
            backoff_coefficient: 2.0,
            max_interval: Duration::from_millis(5),
        },
        grace_interval: Duration::from_millis(10),
        queue_capacity: 16,
        journal_path: None,
    }
}

pub fn mock_orchestrator() -> (Arc<Orchestrator>, Arc<MockControl>) {
    let control = Arc::new(MockControl::default());
    let orchestrator = Orchestrator::new(control.clone(), fast_settings());
    (Arc::new(orchestrator), control)
}

/// Polls the orchestrator until `predicate` holds for the profile's status.
pub async fn wait_for_status(
    orchestrator: &Orchestrator,
    profile_id: &ProfileId,
    predicate: impl Fn(&ProfileStatus) -> bool,
    timeout: Duration,
) -> ProfileStatus {
    let poll_interval = Duration::from_millis(5);
    let result = tokio::time::timeout(timeout, async {
        loop {
            if let Ok(status) = orchestrator.status(profile_id).await {
                if predicate(&status) {
                    return status;
                }
            }
            tokio::time::sleep(poll_interval).await;
        }
    })
    .await;

    match result {
        Ok(status) => status,
        Err(_) => panic!(
            "wait_for_status timed out after {:?}. Final status: {:?}",
            timeout,
            orchestrator.status(profile_id).await
        ),
    }
}

/// Writes `<base>/bin/engine`, a script that ignores its flags and sleeps.
#[cfg(unix)]
pub fn fake_engine(base: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let bin = base.join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let path = bin.join("engine");
    std::fs::write(&path, "#!/bin/sh\nexec sleep 30\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
