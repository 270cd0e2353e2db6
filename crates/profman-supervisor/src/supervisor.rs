//! The process supervisor (reaper).
//!
//! Sole owner of every child process handle the orchestrator creates. The
//! table is one mutex-guarded map; every read and write goes through it.
//! Children are spawned with `kill_on_drop`, so dropping the supervisor
//! also takes its children down.

use chrono::{DateTime, Utc};
use profman_common::{ProcessError, ProcessResult, ProfileId, ENGINE_SERVICE_NAME};
use profman_process::{
    deadline_after, is_port_open, kill_process_tree, local_addr, port_owner, terminate_gracefully,
    validate_executable, validate_process_name, wait_for_port, wait_for_port_release,
};
use profman_registry::LaunchSpec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lock files a crashed engine leaves in its user-data directory.
pub const STALE_LOCK_FILES: &[&str] = &["SingletonLock", "LOCK"];

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(25);
const FORCE_KILL_TIMEOUT: Duration = Duration::from_secs(5);
const REAP_TIMEOUT: Duration = Duration::from_secs(1);
const PORT_RELEASE_POLL: Duration = Duration::from_millis(100);

/// How to start the background engine service.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub environment: BTreeMap<String, String>,
    pub hidden: bool,
    pub startup_timeout: Duration,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub control_port: u16,
    pub graceful_timeout: Duration,
    pub port_reclaim_timeout: Duration,
    pub service: Option<ServiceSpec>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            control_port: profman_common::DEFAULT_CONTROL_PORT,
            graceful_timeout: Duration::from_secs(10),
            port_reclaim_timeout: Duration::from_secs(5),
            service: None,
        }
    }
}

/// OS-level launch request: path + argv + env + hidden.
#[derive(Debug, Clone)]
pub struct ProcessLaunch {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub environment: BTreeMap<String, String>,
    pub hidden: bool,
}

impl ProcessLaunch {
    pub fn from_spec(spec: &LaunchSpec) -> Self {
        Self {
            executable: spec.executable.clone(),
            args: spec.command_args(),
            working_dir: None,
            environment: spec.environment.clone(),
            hidden: spec.hidden,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.args(&self.args)
            .envs(&self.environment)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let working_dir = self.working_dir.clone().or_else(|| {
            self.executable
                .parent()
                .filter(|p| !p.as_os_str().is_empty() && p.is_dir())
                .map(Path::to_path_buf)
        });
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        if self.hidden {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        #[cfg(windows)]
        {
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            let mut flags = CREATE_NEW_PROCESS_GROUP;
            if self.hidden {
                flags |= CREATE_NO_WINDOW;
            }
            cmd.creation_flags(flags);
        }

        cmd
    }
}

/// Runtime-only record of one supervised child.
#[derive(Debug)]
struct ManagedProcess {
    name: String,
    pid: u32,
    child: Child,
    started_at: DateTime<Utc>,
}

impl ManagedProcess {
    /// True while the child has not exited.
    fn is_alive(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!("{} (PID {}) exited: {}", self.name, self.pid, status);
                false
            }
            Err(e) => {
                warn!("Failed to poll {} (PID {}): {}", self.name, self.pid, e);
                false
            }
        }
    }
}

/// Point-in-time view of the supervisor table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorStatus {
    pub running_processes: Vec<String>,
    pub control_port_open: bool,
}

/// Details of one live managed process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub name: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

pub struct ProcessSupervisor {
    config: SupervisorConfig,
    processes: Mutex<HashMap<String, ManagedProcess>>,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            processes: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Runs [`stop_all`](Self::stop_all) once `token` is cancelled.
    pub fn watch_cancellation(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            token.cancelled().await;
            info!("Supervisor context cancelled; reaping all processes");
            supervisor.stop_all().await;
        })
    }

    /// Frees the control port if a stranger holds it (only when the
    /// service is managed here) and clears stale engine lock files from
    /// the profile's user-data directory.
    ///
    /// Only a port that cannot be freed is an error.
    pub async fn preflight_check(
        &self,
        profile_id: &ProfileId,
        user_data_dir: &Path,
    ) -> ProcessResult<()> {
        debug!("Preflight checks for profile {}", profile_id);

        self.reclaim_control_port().await?;

        for name in STALE_LOCK_FILES {
            let path = user_data_dir.join(name);
            // symlink_metadata: SingletonLock is a dangling symlink on Linux
            if tokio::fs::symlink_metadata(&path).await.is_err() {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => info!("Removed stale lock {} for profile {}", path.display(), profile_id),
                Err(e) => warn!(
                    "Could not remove lock {} for profile {}: {}",
                    path.display(),
                    profile_id,
                    e
                ),
            }
        }

        Ok(())
    }

    async fn reclaim_control_port(&self) -> ProcessResult<()> {
        let port = self.config.control_port;
        // Without a managed service the port belongs to someone else.
        if self.config.service.is_none() || !is_port_open(port).await {
            return Ok(());
        }
        if self.is_running(ENGINE_SERVICE_NAME).await {
            debug!("Control port {} held by our engine service", port);
            return Ok(());
        }

        let owner = match port_owner(port) {
            Ok(Some(pid)) => pid,
            Ok(None) => {
                return Err(ProcessError::port_unavailable(
                    port,
                    "listener owner could not be identified",
                ))
            }
            Err(e) => return Err(ProcessError::port_unavailable(port, e.to_string())),
        };
        if owner == std::process::id() {
            return Err(ProcessError::port_unavailable(
                port,
                "port is held by the orchestrator itself",
            ));
        }

        warn!("Control port {} held by stale PID {}; killing it", port, owner);
        kill_process_tree(owner)
            .map_err(|e| ProcessError::port_unavailable(port, e.to_string()))?;

        if wait_for_port_release(port, self.config.port_reclaim_timeout, PORT_RELEASE_POLL).await {
            info!("Control port {} reclaimed", port);
            Ok(())
        } else {
            Err(ProcessError::port_unavailable(
                port,
                format!(
                    "still in use {:?} after killing PID {}",
                    self.config.port_reclaim_timeout, owner
                ),
            ))
        }
    }

    /// Starts the background engine service and blocks until its control
    /// port answers, bounded by the service startup timeout.
    pub async fn start_service(&self) -> ProcessResult<u32> {
        let service = self.config.service.clone().ok_or_else(|| {
            ProcessError::configuration(ENGINE_SERVICE_NAME, "no service executable configured")
        })?;

        if let Some(pid) = self.pid_of(ENGINE_SERVICE_NAME).await {
            debug!("Engine service already running (PID {})", pid);
            return Ok(pid);
        }

        validate_executable(&service.executable)?;
        let launch = ProcessLaunch {
            executable: service.executable.clone(),
            args: service.args.clone(),
            working_dir: service.working_dir.clone(),
            environment: service.environment.clone(),
            hidden: service.hidden,
        };
        let pid = self.spawn_managed(ENGINE_SERVICE_NAME, &launch).await?;

        let addr = local_addr(self.config.control_port);
        if let Err(e) = wait_for_port(addr, service.startup_timeout, service.poll_interval).await {
            error!("Engine service did not open {}: {}", addr, e);
            if let Err(kill_err) = self.kill_entry(ENGINE_SERVICE_NAME).await {
                warn!("Failed to reap unresponsive engine service: {}", kill_err);
            }
            return Err(e);
        }

        info!("Engine service ready on {} (PID {})", addr, pid);
        Ok(pid)
    }

    /// Starts a profile's browser from its launch spec.
    ///
    /// Returns right after spawn; readiness arrives later as an event.
    pub async fn launch_process(&self, spec: &LaunchSpec) -> ProcessResult<u32> {
        let name = spec.profile_id.browser_process_name();
        let pid = self
            .spawn_managed(&name, &ProcessLaunch::from_spec(spec))
            .await?;
        info!(
            "Launched profile {} (PID {}, launch {})",
            spec.profile_id, pid, spec.launch_id
        );
        Ok(pid)
    }

    /// Spawns and registers a child under `name`.
    pub async fn spawn_managed(&self, name: &str, launch: &ProcessLaunch) -> ProcessResult<u32> {
        validate_process_name(name)?;

        let mut processes = self.processes.lock().await;
        if let Some(existing) = processes.get_mut(name) {
            if existing.is_alive() {
                return Err(ProcessError::already_exists(name));
            }
            processes.remove(name);
        }

        let child = launch
            .command()
            .spawn()
            .map_err(|e| ProcessError::spawn_failed(name, format!("{}: {}", launch.executable.display(), e)))?;
        let pid = child
            .id()
            .ok_or_else(|| ProcessError::spawn_failed(name, "child exited before reporting a PID"))?;

        processes.insert(
            name.to_string(),
            ManagedProcess {
                name: name.to_string(),
                pid,
                child,
                started_at: Utc::now(),
            },
        );
        debug!("Registered {} (PID {})", name, pid);
        Ok(pid)
    }

    /// Gracefully stops a profile's browser.
    pub async fn stop_profile(&self, profile_id: &ProfileId) -> ProcessResult<()> {
        self.stop_process(&profile_id.browser_process_name()).await
    }

    /// Graceful stop: SIGTERM, wait up to the graceful timeout, then
    /// process-tree kill. The entry stays registered until exit is
    /// confirmed.
    pub async fn stop_process(&self, name: &str) -> ProcessResult<()> {
        let pid = match self.pid_of(name).await {
            Some(pid) => pid,
            None => {
                debug!("{} is not running; nothing to stop", name);
                return Ok(());
            }
        };

        info!("Stopping {} (PID {})", name, pid);
        if let Err(e) = terminate_gracefully(pid) {
            warn!("Graceful signal to {} failed: {}", name, e);
        }

        if self.wait_for_exit_confirmed(name, self.config.graceful_timeout).await {
            info!("{} stopped gracefully", name);
            return Ok(());
        }

        warn!(
            "{} (PID {}) ignored graceful stop for {:?}; killing process tree",
            name, pid, self.config.graceful_timeout
        );
        if let Err(e) = kill_process_tree(pid) {
            error!("Tree kill of {} failed: {}", name, e);
        }

        if self.wait_for_exit_confirmed(name, FORCE_KILL_TIMEOUT).await {
            info!("{} stopped after force kill", name);
            Ok(())
        } else {
            Err(ProcessError::stop_failed(
                name,
                format!("PID {} still running after force kill", pid),
            ))
        }
    }

    /// Polls the child under short lock holds; removes the entry once it
    /// has exited. An entry removed by someone else counts as exited.
    async fn wait_for_exit_confirmed(&self, name: &str, timeout: Duration) -> bool {
        let deadline = deadline_after(timeout);
        loop {
            {
                let mut processes = self.processes.lock().await;
                match processes.get_mut(name).map(|entry| entry.is_alive()) {
                    None => return true,
                    Some(false) => {
                        processes.remove(name);
                        return true;
                    }
                    Some(true) => {}
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }
    }

    async fn kill_entry(&self, name: &str) -> ProcessResult<()> {
        let mut processes = self.processes.lock().await;
        if let Some(mut entry) = processes.remove(name) {
            reap(&mut entry).await?;
        }
        Ok(())
    }

    /// Force-terminates every registered process tree and clears the
    /// table. Returns the names that were registered.
    pub async fn stop_all(&self) -> Vec<String> {
        let mut processes = self.processes.lock().await;
        if processes.is_empty() {
            return Vec::new();
        }

        info!("Reaping {} managed processes", processes.len());
        let mut names = Vec::with_capacity(processes.len());
        for (name, mut entry) in processes.drain() {
            if let Err(e) = reap(&mut entry).await {
                error!("Failed to kill {} (PID {}): {}", name, entry.pid, e);
            }
            names.push(name);
        }
        names.sort();
        info!("Reaper cleanup complete");
        names
    }

    /// Registered names and control-port state, after pruning exited
    /// children.
    pub async fn get_status(&self) -> SupervisorStatus {
        let mut running_processes: Vec<String> = {
            let mut processes = self.processes.lock().await;
            processes.retain(|_, entry| entry.is_alive());
            processes.keys().cloned().collect()
        };
        running_processes.sort();

        SupervisorStatus {
            running_processes,
            control_port_open: is_port_open(self.config.control_port).await,
        }
    }

    pub async fn list_processes(&self) -> Vec<ProcessInfo> {
        let mut processes = self.processes.lock().await;
        processes.retain(|_, entry| entry.is_alive());
        let mut infos: Vec<ProcessInfo> = processes
            .values()
            .map(|entry| ProcessInfo {
                name: entry.name.clone(),
                pid: entry.pid,
                started_at: entry.started_at,
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// PID of a live entry; prunes the entry if it has exited.
    pub async fn pid_of(&self, name: &str) -> Option<u32> {
        let mut processes = self.processes.lock().await;
        let live = processes
            .get_mut(name)
            .map(|entry| (entry.is_alive(), entry.pid));
        match live {
            Some((true, pid)) => Some(pid),
            Some((false, _)) => {
                processes.remove(name);
                None
            }
            None => None,
        }
    }

    pub async fn is_running(&self, name: &str) -> bool {
        self.pid_of(name).await.is_some()
    }

    pub async fn is_profile_running(&self, profile_id: &ProfileId) -> bool {
        self.is_running(&profile_id.browser_process_name()).await
    }

    /// PIDs of every live managed process.
    pub async fn active_pids(&self) -> Vec<u32> {
        self.list_processes().await.into_iter().map(|p| p.pid).collect()
    }
}

/// Kills an entry's tree and waits briefly so the child is reaped.
async fn reap(entry: &mut ManagedProcess) -> ProcessResult<()> {
    if !entry.is_alive() {
        return Ok(());
    }
    debug!("Killing {} (PID {})", entry.name, entry.pid);
    let result = kill_process_tree(entry.pid).map(|_| ());
    if result.is_err() {
        let _ = entry.child.start_kill();
    }
    if tokio::time::timeout(REAP_TIMEOUT, entry.child.wait())
        .await
        .is_err()
    {
        warn!("{} (PID {}) not reaped within {:?}", entry.name, entry.pid, REAP_TIMEOUT);
    }
    result
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::{fake_engine, spec_for};
    use profman_process::process_exists;

    fn supervisor(port: u16) -> ProcessSupervisor {
        ProcessSupervisor::new(SupervisorConfig {
            control_port: port,
            graceful_timeout: Duration::from_secs(2),
            port_reclaim_timeout: Duration::from_secs(2),
            service: None,
        })
    }

    fn unused_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_launch_registers_and_rejects_duplicates() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = fake_engine(tmp.path());
        let sup = supervisor(unused_port());
        let spec = spec_for(tmp.path(), &engine, "p1");

        let pid = sup.launch_process(&spec).await.unwrap();
        assert!(process_exists(pid).unwrap());
        assert!(sup.is_profile_running(&spec.profile_id).await);

        let err = sup.launch_process(&spec).await.unwrap_err();
        assert!(matches!(err, ProcessError::AlreadyExists { .. }));

        let status = sup.get_status().await;
        assert_eq!(status.running_processes, vec!["browser_p1".to_string()]);
        assert!(!status.control_port_open);

        sup.stop_all().await;
    }

    #[tokio::test]
    async fn test_stop_profile_confirms_exit() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = fake_engine(tmp.path());
        let sup = supervisor(unused_port());
        let spec = spec_for(tmp.path(), &engine, "p1");

        let pid = sup.launch_process(&spec).await.unwrap();
        sup.stop_profile(&spec.profile_id).await.unwrap();

        assert!(!sup.is_profile_running(&spec.profile_id).await);
        assert!(!process_exists(pid).unwrap());
        // stopping again is a no-op
        sup.stop_profile(&spec.profile_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_all_empties_the_table() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = fake_engine(tmp.path());
        let sup = supervisor(unused_port());

        let mut pids = Vec::new();
        for id in ["p1", "p2", "p3"] {
            pids.push(
                sup.launch_process(&spec_for(tmp.path(), &engine, id))
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(sup.get_status().await.running_processes.len(), 3);

        let reaped = sup.stop_all().await;
        assert_eq!(reaped, vec!["browser_p1", "browser_p2", "browser_p3"]);
        assert!(sup.get_status().await.running_processes.is_empty());
        for pid in pids {
            assert!(!process_exists(pid).unwrap());
        }
    }

    #[tokio::test]
    async fn test_exited_children_are_pruned() {
        let sup = supervisor(unused_port());
        let launch = ProcessLaunch {
            executable: PathBuf::from("true"),
            args: vec![],
            working_dir: None,
            environment: BTreeMap::new(),
            hidden: true,
        };
        sup.spawn_managed("short_lived", &launch).await.unwrap();

        let pruned = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if sup.get_status().await.running_processes.is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(pruned.is_ok());
    }

    #[tokio::test]
    async fn test_externally_killed_child_is_pruned_on_lookup() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = fake_engine(tmp.path());
        let sup = supervisor(unused_port());
        let spec = spec_for(tmp.path(), &engine, "p1");

        let pid = sup.launch_process(&spec).await.unwrap();
        assert_eq!(sup.pid_of("browser_p1").await, Some(pid));
        kill_process_tree(pid).unwrap();

        let gone = tokio::time::timeout(Duration::from_secs(5), async {
            while sup.pid_of("browser_p1").await.is_some() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(gone.is_ok());
        assert!(!sup.is_profile_running(&spec.profile_id).await);
        sup.stop_profile(&spec.profile_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_with_unbounded_graceful_timeout() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = fake_engine(tmp.path());
        let sup = ProcessSupervisor::new(SupervisorConfig {
            control_port: unused_port(),
            graceful_timeout: Duration::MAX,
            port_reclaim_timeout: Duration::from_secs(2),
            service: None,
        });
        let spec = spec_for(tmp.path(), &engine, "p1");

        let pid = sup.launch_process(&spec).await.unwrap();
        sup.stop_profile(&spec.profile_id).await.unwrap();
        assert!(!process_exists(pid).unwrap());
        assert!(sup.get_status().await.running_processes.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let sup = supervisor(unused_port());
        let launch = ProcessLaunch {
            executable: PathBuf::from("/nonexistent/engine"),
            args: vec![],
            working_dir: None,
            environment: BTreeMap::new(),
            hidden: true,
        };
        let err = sup.spawn_managed("browser_x", &launch).await.unwrap_err();
        assert!(matches!(err, ProcessError::SpawnFailed { .. }));
        assert!(sup.get_status().await.running_processes.is_empty());
    }

    #[tokio::test]
    async fn test_preflight_removes_stale_locks() {
        let tmp = tempfile::tempdir().unwrap();
        let user_data = tmp.path().join("userdata");
        std::fs::create_dir_all(&user_data).unwrap();
        std::fs::write(user_data.join("LOCK"), b"").unwrap();
        std::os::unix::fs::symlink("host-12345", user_data.join("SingletonLock")).unwrap();

        let sup = supervisor(unused_port());
        sup.preflight_check(&ProfileId::from("p1"), &user_data)
            .await
            .unwrap();

        assert!(std::fs::symlink_metadata(user_data.join("LOCK")).is_err());
        assert!(std::fs::symlink_metadata(user_data.join("SingletonLock")).is_err());
    }

    #[tokio::test]
    async fn test_preflight_refuses_port_held_by_self() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let tmp = tempfile::tempdir().unwrap();

        let engine = fake_engine(tmp.path());
        let sup = ProcessSupervisor::new(SupervisorConfig {
            control_port: port,
            service: Some(ServiceSpec {
                executable: engine,
                args: vec![],
                working_dir: None,
                environment: BTreeMap::new(),
                hidden: true,
                startup_timeout: Duration::from_secs(1),
                poll_interval: Duration::from_millis(50),
            }),
            ..SupervisorConfig::default()
        });
        let err = sup
            .preflight_check(&ProfileId::from("p1"), tmp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::PortUnavailable { .. }));

        // Unmanaged service: the port is left alone
        let unmanaged = supervisor(port);
        assert!(unmanaged
            .preflight_check(&ProfileId::from("p1"), tmp.path())
            .await
            .is_ok());
        drop(listener);
    }

    #[tokio::test]
    async fn test_start_service_times_out_and_reaps() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = fake_engine(tmp.path());
        let sup = ProcessSupervisor::new(SupervisorConfig {
            control_port: unused_port(),
            graceful_timeout: Duration::from_secs(1),
            port_reclaim_timeout: Duration::from_secs(1),
            service: Some(ServiceSpec {
                executable: engine,
                args: vec![],
                working_dir: None,
                environment: BTreeMap::new(),
                hidden: true,
                startup_timeout: Duration::from_millis(200),
                poll_interval: Duration::from_millis(50),
            }),
        });

        let err = sup.start_service().await.unwrap_err();
        assert!(matches!(err, ProcessError::ServiceUnreachable { .. }));
        assert!(!sup.is_running(ENGINE_SERVICE_NAME).await);
    }

    #[tokio::test]
    async fn test_cancellation_reaps_everything() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = fake_engine(tmp.path());
        let sup = Arc::new(supervisor(unused_port()));
        let token = CancellationToken::new();
        let watcher = sup.watch_cancellation(token.clone());

        let pid = sup
            .launch_process(&spec_for(tmp.path(), &engine, "p1"))
            .await
            .unwrap();

        token.cancel();
        watcher.await.unwrap();
        assert!(sup.get_status().await.running_processes.is_empty());
        assert!(!process_exists(pid).unwrap());
    }
}
