//! LifecycleActor - owns one profile's state machine.
//!
//! Runs in a single task. Events are handled strictly one at a time in
//! delivery order; a second event is not looked at until the first one's
//! work, recovery included, has completed or failed.

use super::commands::{LifecycleCommand, ShutdownRequest};
use crate::journal::EventJournal;
use crate::recovery::{RecoveryFlow, RetryingControl};
use futures::FutureExt;
use parking_lot::RwLock;
use profman_common::{Error, ProfileId};
use profman_profile_state::{
    plan, Action, FailureType, LifecycleEvent, LifecycleState, LifecycleStateMachine,
    ProfileStatus,
};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub(super) struct LifecycleActor {
    pub machine: LifecycleStateMachine,
    pub status: Arc<RwLock<ProfileStatus>>,
    pub control: RetryingControl,
    pub recovery: RecoveryFlow,
    pub journal: Option<EventJournal>,
    /// Last error recorded; mirrored into the status snapshot
    pub error: Option<String>,
}

impl LifecycleActor {
    fn profile_id(&self) -> &ProfileId {
        self.machine.profile_id()
    }

    /// Main loop.
    ///
    /// Shutdown is polled first so a pending shutdown is never starved by
    /// queued events. The loop also ends when every handle is dropped.
    pub(super) async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<LifecycleCommand>,
        mut shutdown_rx: mpsc::Receiver<ShutdownRequest>,
        terminated: CancellationToken,
    ) {
        info!("Lifecycle for profile {} started", self.profile_id());

        let mut pending_shutdown = None;
        loop {
            tokio::select! {
                biased;

                request = shutdown_rx.recv() => {
                    pending_shutdown = request;
                    break;
                }

                maybe_cmd = cmd_rx.recv() => match maybe_cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        debug!("All handles for profile {} dropped", self.profile_id());
                        break;
                    }
                },
            }
        }

        let final_status = self.handle_shutdown().await;

        // Nothing queued behind the shutdown gets processed
        cmd_rx.close();
        while let Ok(cmd) = cmd_rx.try_recv() {
            if let LifecycleCommand::Event { resp, .. } = cmd {
                let _ = resp.send(Err(Error::LifecycleTerminated {
                    profile_id: self.profile_id().to_string(),
                }));
            }
        }

        if let Some(request) = pending_shutdown {
            let _ = request.resp.send(final_status.clone());
        }
        shutdown_rx.close();
        while let Ok(request) = shutdown_rx.try_recv() {
            let _ = request.resp.send(final_status.clone());
        }

        terminated.cancel();
        info!(
            "Lifecycle for profile {} terminated in {}",
            self.profile_id(),
            final_status.state
        );
    }

    async fn handle_command(&mut self, cmd: LifecycleCommand) {
        match cmd {
            LifecycleCommand::Event { event, resp } => {
                let status = self.handle_event(event).await;
                let _ = resp.send(Ok(status));
            }
            LifecycleCommand::Recover { failure, resp } => {
                let status = self.handle_recover(failure).await;
                let _ = resp.send(Ok(status));
            }
            LifecycleCommand::History { resp } => {
                let _ = resp.send(self.machine.state_history().to_vec());
            }
        }
    }

    /// Handles one event, converting any panic into a recorded `FAILED`.
    async fn handle_event(&mut self, event: LifecycleEvent) -> ProfileStatus {
        debug!(
            "Profile {} received {} in {}",
            self.profile_id(),
            event.kind,
            self.machine.current_state()
        );

        let outcome = AssertUnwindSafe(self.apply_event(&event))
            .catch_unwind()
            .await;

        if let Err(panic) = outcome {
            let message = panic_message(panic.as_ref());
            error!(
                "Handling {} for profile {} panicked: {}",
                event.kind,
                self.profile_id(),
                message
            );
            self.error = Some(format!("internal error while handling {}: {}", event.kind, message));
            self.force_state(LifecycleState::Failed, "panic").await;
        }

        self.publish().await
    }

    /// Operator-requested recovery; only meaningful while a process is expected.
    async fn handle_recover(&mut self, failure: FailureType) -> ProfileStatus {
        match self.machine.current_state() {
            LifecycleState::Ready | LifecycleState::Degraded => {
                let outcome = AssertUnwindSafe(self.recover(failure)).catch_unwind().await;
                if let Err(panic) = outcome {
                    self.error = Some(format!(
                        "internal error during recovery: {}",
                        panic_message(panic.as_ref())
                    ));
                    self.force_state(LifecycleState::Failed, "panic").await;
                }
            }
            state => debug!(
                "Profile {}: recovery ({}) ignored in {}",
                self.profile_id(),
                failure,
                state
            ),
        }
        self.publish().await
    }

    async fn apply_event(&mut self, event: &LifecycleEvent) {
        match plan(self.machine.current_state(), event) {
            Action::Ignore { reason } => {
                debug!("Profile {}: {}", self.profile_id(), reason);
            }
            Action::Transition { to, error } => {
                let reason = event.kind.to_string();
                if self.transition(to, &reason).await {
                    match error {
                        Some(message) => self.error = Some(message),
                        None if matches!(to, LifecycleState::Onboarding | LifecycleState::Ready) => {
                            self.error = None
                        }
                        None => {}
                    }
                }
            }
            Action::Launch => self.launch().await,
            Action::Reonboard => self.reonboard(&event.kind.to_string()).await,
            Action::Recover { failure } => self.recover(failure).await,
        }
    }

    /// A fresh onboarding for a profile that may still have a process.
    /// The old process must be gone before `ONBOARDING` is entered, so the
    /// next launch starts from a clean slate.
    async fn reonboard(&mut self, reason: &str) {
        let id = self.profile_id().clone();

        if self.control.is_running(&id).await {
            info!("Stopping profile {} for a fresh onboarding", id);
            if let Err(e) = self.control.stop(&id).await {
                error!("Stop of profile {} before re-onboarding failed: {}", id, e);
                self.error = Some(e.to_string());
                self.force_state(LifecycleState::Failed, "re-onboarding stop failed")
                    .await;
                return;
            }
        }

        if self.transition(LifecycleState::Onboarding, reason).await {
            self.error = None;
        }
    }

    async fn launch(&mut self) {
        let id = self.profile_id().clone();
        self.journal_launch("onboarding").await;

        match self.control.launch(&id).await {
            Ok(receipt) => {
                info!(
                    "Profile {} is running (PID {}, launch {})",
                    id, receipt.pid, receipt.launch_id
                );
                self.error = None;
                self.transition(LifecycleState::Ready, "launched").await;
            }
            Err(e) => {
                error!("Launch of profile {} failed: {}", id, e);
                self.error = Some(e.to_string());
                self.force_state(LifecycleState::Failed, "launch failed").await;
            }
        }
    }

    async fn recover(&mut self, failure: FailureType) {
        let id = self.profile_id().clone();
        self.transition(LifecycleState::Degraded, &failure.to_string())
            .await;
        if failure == FailureType::Heartbeat {
            self.journal_launch("recovery").await;
        }

        let outcome = self.recovery.run(&id, &failure).await;
        if outcome.success {
            self.error = None;
            self.transition(outcome.new_state, "recovered").await;
        } else {
            // Stay degraded; the failure reason stays visible in the status
            warn!(
                "Profile {} remains {} after failed recovery",
                id,
                self.machine.current_state()
            );
            self.error = outcome.error;
        }
    }

    async fn handle_shutdown(&mut self) -> ProfileStatus {
        let id = self.profile_id().clone();

        if self.control.is_running(&id).await {
            info!("Stopping profile {} for shutdown", id);
            match self.control.stop(&id).await {
                Ok(()) => {
                    self.transition(LifecycleState::Idle, "shutdown").await;
                }
                Err(e) => {
                    error!("Stop of profile {} during shutdown failed: {}", id, e);
                    self.error = Some(e.to_string());
                    self.force_state(LifecycleState::Failed, "shutdown stop failed")
                        .await;
                }
            }
        } else if self.machine.current_state() != LifecycleState::Failed {
            self.transition(LifecycleState::Idle, "shutdown").await;
        }

        self.publish().await
    }

    /// Applies a transition, journaling it. Returns whether it was allowed.
    async fn transition(&mut self, to: LifecycleState, reason: &str) -> bool {
        let from = self.machine.current_state();
        match self.machine.transition_to(to, Some(reason.to_string())) {
            Ok(()) => {
                if from != to {
                    info!("Profile {}: {} -> {} ({})", self.profile_id(), from, to, reason);
                    self.journal_transition(from, to, reason).await;
                }
                true
            }
            Err(e) => {
                warn!("Profile {}: {}", self.profile_id(), e);
                false
            }
        }
    }

    /// `FAILED` and `IDLE` are reachable from every state.
    async fn force_state(&mut self, to: LifecycleState, reason: &str) {
        if !self.transition(to, reason).await {
            error!(
                "Profile {} could not be forced into {}",
                self.profile_id(),
                to
            );
        }
    }

    /// Refreshes the shared snapshot, reconciling `process_running` with
    /// the supervisor's table.
    async fn publish(&mut self) -> ProfileStatus {
        let process_running = self.control.is_running(self.profile_id()).await;
        let mut status = self.status.write();
        status.state = self.machine.current_state();
        status.last_update = chrono::Utc::now();
        status.process_running = process_running;
        status.error_message = self.error.clone();
        status.clone()
    }

    async fn journal_transition(&self, from: LifecycleState, to: LifecycleState, reason: &str) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal
                .record_transition(self.profile_id(), from, to, Some(reason.to_string()))
                .await
            {
                warn!("Journal write for profile {} failed: {}", self.profile_id(), e);
            }
        }
    }

    async fn journal_launch(&self, trigger: &str) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.record_launch(self.profile_id(), trigger).await {
                warn!("Journal write for profile {} failed: {}", self.profile_id(), e);
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
