//! Orchestrator - owns every profile's lifecycle actor.
//!
//! Operators address profiles by ID: start a lifecycle, send it an event,
//! query its status. Shutdown stops each lifecycle (which stops its
//! process) and then sweeps the supervisor with `stop_all`.

use crate::journal::replay_state;
use crate::lifecycle::{spawn_lifecycle, LifecycleHandle, LifecycleSettings};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use profman_common::{Error, ProfileId, Result};
use profman_profile_state::{FailureType, LifecycleEvent, LifecycleState, ProfileStatus};
use profman_registry::OrchestratorPaths;
use profman_supervisor::{ProcessControl, ProcessSupervisor};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Orchestrator {
    control: Arc<dyn ProcessControl>,
    settings: LifecycleSettings,
    lifecycles: DashMap<ProfileId, LifecycleHandle>,
    /// Set when lifecycles journal their transitions
    journal_paths: Option<OrchestratorPaths>,
    supervisor: Option<Arc<ProcessSupervisor>>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(control: Arc<dyn ProcessControl>, settings: LifecycleSettings) -> Self {
        Self {
            control,
            settings,
            lifecycles: DashMap::new(),
            journal_paths: None,
            supervisor: None,
            cancel: CancellationToken::new(),
        }
    }

    /// `shutdown_all` finishes with a `stop_all` sweep of this supervisor.
    pub fn with_supervisor(mut self, supervisor: Arc<ProcessSupervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    /// Journal each lifecycle to its `lifecycle.jsonl` under `paths`.
    pub fn with_journal(mut self, paths: OrchestratorPaths) -> Self {
        self.journal_paths = Some(paths);
        self
    }

    /// Cancelling this token aborts in-flight retry and grace waits.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Starts the lifecycle for `profile_id` in `IDLE`.
    ///
    /// A lifecycle that has already terminated is replaced.
    ///
    /// # Errors
    /// `LifecycleAlreadyRunning` if a live lifecycle exists for the profile.
    pub async fn start(&self, profile_id: ProfileId) -> Result<ProfileStatus> {
        let handle = self.register(profile_id)?;
        Ok(handle.status().await)
    }

    fn register(&self, profile_id: ProfileId) -> Result<LifecycleHandle> {
        match self.lifecycles.entry(profile_id.clone()) {
            Entry::Occupied(mut entry) => {
                if !entry.get().is_terminated() {
                    return Err(Error::LifecycleAlreadyRunning {
                        profile_id: profile_id.to_string(),
                    });
                }
                debug!("Replacing terminated lifecycle for profile {}", profile_id);
                let handle = self.spawn(profile_id);
                entry.insert(handle.clone());
                Ok(handle)
            }
            Entry::Vacant(entry) => {
                let handle = self.spawn(profile_id);
                entry.insert(handle.clone());
                Ok(handle)
            }
        }
    }

    fn spawn(&self, profile_id: ProfileId) -> LifecycleHandle {
        info!("Starting lifecycle for profile {}", profile_id);
        let mut settings = self.settings.clone();
        settings.journal_path = self
            .journal_paths
            .as_ref()
            .map(|paths| paths.journal_path(&profile_id));
        spawn_lifecycle(
            profile_id,
            Arc::clone(&self.control),
            settings,
            self.cancel.child_token(),
        )
    }

    /// Cloned out of the table so no map guard is held across an await.
    pub fn handle(&self, profile_id: &ProfileId) -> Result<LifecycleHandle> {
        self.lifecycles
            .get(profile_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::profile_not_found(profile_id.to_string()))
    }

    /// Routes an event to the lifecycle named in `event.profile_id`.
    pub async fn send_event(&self, event: LifecycleEvent) -> Result<ProfileStatus> {
        let handle = self.handle(&event.profile_id)?;
        handle.send_event(event).await
    }

    pub async fn recover(
        &self,
        profile_id: &ProfileId,
        failure: FailureType,
    ) -> Result<ProfileStatus> {
        let handle = self.handle(profile_id)?;
        handle.recover(failure).await
    }

    /// Lifecycle state plus whether the profile's process is alive right now.
    pub async fn status(&self, profile_id: &ProfileId) -> Result<ProfileStatus> {
        let handle = self.handle(profile_id)?;
        Ok(handle.status().await)
    }

    /// Status of every known lifecycle, ordered by profile ID.
    pub async fn list(&self) -> Vec<ProfileStatus> {
        let handles: Vec<_> = self
            .lifecycles
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        let mut statuses = join_all(handles.iter().map(|handle| handle.status())).await;
        statuses.sort_by(|a, b| a.profile_id.cmp(&b.profile_id));
        statuses
    }

    /// Shuts one lifecycle down and returns its final status.
    ///
    /// The terminated handle stays in the table so its status remains
    /// queryable; a later `start` replaces it.
    pub async fn stop(&self, profile_id: &ProfileId) -> Result<ProfileStatus> {
        let handle = self.handle(profile_id)?;
        Ok(handle.shutdown().await)
    }

    /// Last state recorded in the profile's journal, if journaling is on.
    pub async fn journaled_state(&self, profile_id: &ProfileId) -> Result<Option<LifecycleState>> {
        match &self.journal_paths {
            Some(paths) => replay_state(&paths.journal_path(profile_id)).await,
            None => Ok(None),
        }
    }

    /// Stops every lifecycle, then every supervised process.
    ///
    /// Returns the final status of each lifecycle.
    pub async fn shutdown_all(&self) -> Vec<ProfileStatus> {
        let handles: Vec<_> = self
            .lifecycles
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        info!("Shutting down {} lifecycle(s)", handles.len());
        let mut statuses = join_all(handles.iter().map(|handle| handle.shutdown())).await;
        statuses.sort_by(|a, b| a.profile_id.cmp(&b.profile_id));

        for status in statuses.iter().filter(|s| s.state == LifecycleState::Failed) {
            warn!(
                "Profile {} shut down in FAILED: {}",
                status.profile_id,
                status.error_message.as_deref().unwrap_or("no error recorded")
            );
        }

        if let Some(supervisor) = &self.supervisor {
            let stopped = supervisor.stop_all().await;
            if !stopped.is_empty() {
                info!("Final sweep stopped {} process(es)", stopped.len());
            }
        }

        self.cancel.cancel();
        statuses
    }
}
