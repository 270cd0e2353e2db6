//! Bootstrap - startup ordering for a profman runtime.
//!
//! ```text
//! boot(config)
//!     ↓
//! 1. Create the directory layout, open the registry
//! 2. Hygiene audit (read-only), apply corrections if configured
//! 3. Safe cleanup of stray managed processes, if configured
//! 4. Supervisor + engine service (when managed)
//! 5. Orchestrator over SupervisorControl
//! 6. Signal DEPENDENCIES_READY; gated starter starts configured profiles
//! ```
//!
//! Cleanup always runs before any lifecycle exists, so its active set is
//! empty and nothing the runtime launched can be hit.

use crate::config::OrchestratorConfig;
use crate::gate::{SystemGate, DEPENDENCIES_READY};
use crate::lifecycle::LifecycleSettings;
use crate::orchestrator::Orchestrator;
use anyhow::{anyhow, Context, Result};
use profman_common::ProfileId;
use profman_profile_state::ProfileStatus;
use profman_registry::{OrchestratorPaths, Profile, ProfileRegistry};
use profman_supervisor::{
    CleanupReport, HygieneAuditor, HygieneReport, ProcessSupervisor, SupervisorControl,
    TcpControlChannel,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything a running orchestrator owns.
pub struct Runtime {
    pub orchestrator: Arc<Orchestrator>,
    pub supervisor: Arc<ProcessSupervisor>,
    pub registry: Arc<ProfileRegistry>,
    pub gate: Arc<SystemGate>,
    pub paths: OrchestratorPaths,
    pub report: HygieneReport,
    pub cleanup: Option<CleanupReport>,
    /// Profiles whose lifecycles were started at boot
    pub started: Vec<ProfileId>,
}

impl Runtime {
    /// Stops every lifecycle and then every supervised process.
    pub async fn shutdown(&self) -> Vec<ProfileStatus> {
        self.orchestrator.shutdown_all().await
    }
}

/// Probe target for the audit: only an external (unmanaged) service.
///
/// A managed service is started after the audit, so probing it would
/// always fail.
fn audit_service_address(config: &OrchestratorConfig) -> Option<SocketAddr> {
    match &config.service {
        Some(service) if !service.enabled => Some(config.service_address()),
        _ => None,
    }
}

/// Runs the startup audit and, when `apply` is set, applies its
/// corrections through the registry's compare-and-set path.
pub async fn audit(
    config: &OrchestratorConfig,
    registry: &ProfileRegistry,
    apply: bool,
) -> Result<HygieneReport> {
    let auditor = HygieneAuditor::new(&registry.paths().bin_dir);
    let mut report = auditor
        .startup_audit(registry.path(), audit_service_address(config))
        .await
        .context("Startup audit failed")?;

    info!(
        "Hygiene audit: {} profile(s), {} open, {} orphaned",
        report.total_profiles,
        report.open_profiles,
        report.orphaned_profiles.len()
    );
    for error in &report.errors {
        warn!("Hygiene audit: {}", error);
    }

    if apply && !report.corrections.is_empty() {
        report.corrected_count = registry
            .apply_corrections(&report.corrections)
            .await
            .context("Failed to apply hygiene corrections")?;
        info!(
            "Applied {}/{} hygiene correction(s)",
            report.corrected_count,
            report.corrections.len()
        );
    }

    Ok(report)
}

/// Kills managed-directory processes that nothing owns.
///
/// Must not be called while lifecycles are running.
pub async fn cleanup(paths: &OrchestratorPaths) -> Result<CleanupReport> {
    let managed_dir = paths.bin_dir.clone();
    let report = tokio::task::spawn_blocking(move || HygieneAuditor::new(managed_dir).safe_cleanup(&[]))
        .await
        .context("Safe cleanup task failed")?;

    if !report.killed.is_empty() {
        info!("Safe cleanup killed {} process(es)", report.killed.len());
    }
    for error in &report.errors {
        warn!("Safe cleanup: {}", error);
    }
    Ok(report)
}

pub async fn open_registry(config: &OrchestratorConfig) -> Result<(OrchestratorPaths, ProfileRegistry)> {
    let paths = config.paths()?;
    paths
        .ensure_dirs()
        .await
        .with_context(|| format!("Failed to create directories under {}", paths.base_dir.display()))?;

    let registry = ProfileRegistry::open(paths.clone())
        .await
        .context("Failed to open profile registry")?;
    Ok((paths, registry))
}

/// Creates a new profile in the registry.
pub async fn provision(config: &OrchestratorConfig, alias: &str, master: bool) -> Result<Profile> {
    let (_, registry) = open_registry(config).await?;
    let profile = registry
        .provision(alias, master)
        .await
        .with_context(|| format!("Failed to provision profile '{}'", alias))?;
    info!("Provisioned profile {} ({})", profile.id, profile.alias);
    Ok(profile)
}

/// Brings up a complete runtime in dependency order.
pub async fn boot(config: &OrchestratorConfig) -> Result<Runtime> {
    config.validate()?;

    let (paths, registry) = open_registry(config).await?;
    let registry = Arc::new(registry);

    let report = if config.hygiene.audit_on_startup {
        audit(config, &registry, config.hygiene.apply_corrections).await?
    } else {
        debug!("Startup audit disabled");
        HygieneReport {
            total_profiles: 0,
            open_profiles: 0,
            orphaned_profiles: Vec::new(),
            corrections: Vec::new(),
            corrected_count: 0,
            errors: Vec::new(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    };

    let cleanup_report = if config.hygiene.safe_cleanup_on_startup {
        Some(cleanup(&paths).await?)
    } else {
        None
    };

    let supervisor = Arc::new(ProcessSupervisor::new(config.supervisor_config(&paths)));
    if config.managed_service().is_some() {
        let pid = supervisor
            .start_service()
            .await
            .context("Failed to start engine service")?;
        info!("Engine service running (PID {})", pid);
    }

    let channel = Arc::new(TcpControlChannel::local(
        config.orchestrator.control_port,
        config.supervisor.control_timeout,
    ));
    let control = Arc::new(SupervisorControl::new(
        Arc::clone(&supervisor),
        Arc::clone(&registry),
        config.launch_spec_builder(&paths),
        channel,
    ));

    let settings = LifecycleSettings {
        retry: config.retry_policy(),
        grace_interval: config.recovery.grace_interval,
        queue_capacity: config.orchestrator.event_queue_capacity,
        journal_path: None,
    };
    let mut orchestrator =
        Orchestrator::new(control, settings).with_supervisor(Arc::clone(&supervisor));
    if config.journal.enabled {
        orchestrator = orchestrator.with_journal(paths.clone());
    }
    let orchestrator = Arc::new(orchestrator);
    supervisor.watch_cancellation(orchestrator.cancellation_token());

    let gate = Arc::new(SystemGate::new());
    let starter = {
        let gate = Arc::clone(&gate);
        let orchestrator = Arc::clone(&orchestrator);
        let registry = Arc::clone(&registry);
        let profiles: Vec<ProfileId> = config
            .profiles
            .iter()
            .map(|id| ProfileId::from(id.as_str()))
            .collect();
        let timeout = config.dependencies_timeout();
        let cancel = orchestrator.cancellation_token();

        tokio::spawn(async move {
            gate.wait_for_cancellable(DEPENDENCIES_READY, timeout, &cancel)
                .await?;

            let mut started = Vec::new();
            for id in profiles {
                if let Err(e) = registry.get(&id).await {
                    warn!("Skipping configured profile {}: {}", id, e);
                    continue;
                }
                match orchestrator.start(id.clone()).await {
                    Ok(_) => started.push(id),
                    Err(e) => warn!("Could not start lifecycle for {}: {}", id, e),
                }
            }
            Ok::<_, profman_common::Error>(started)
        })
    };

    gate.signal(DEPENDENCIES_READY);
    let started = starter
        .await
        .map_err(|e| anyhow!("Profile starter task failed: {}", e))?
        .context("Dependencies never became ready")?;

    info!("Runtime up with {} lifecycle(s)", started.len());

    Ok(Runtime {
        orchestrator,
        supervisor,
        registry,
        gate,
        paths,
        report,
        cleanup: cleanup_report,
        started,
    })
}
