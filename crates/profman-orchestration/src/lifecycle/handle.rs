//! LifecycleHandle - public API for one profile's lifecycle actor.
//!
//! The handle is cheap to clone. Events and shutdown go to the actor over
//! channels; status reads go straight to the shared snapshot and never
//! wait for the actor. `process_running` is re-read from the process
//! layer on every query, so a process that died or was reaped since the
//! last event is reported as gone.

use super::commands::{LifecycleCommand, ShutdownRequest};
use parking_lot::RwLock;
use profman_common::{Error, ProfileId, Result};
use profman_profile_state::{FailureType, LifecycleEvent, ProfileStatus, StateTransition};
use profman_supervisor::ProcessControl;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct LifecycleHandle {
    pub(super) profile_id: ProfileId,
    pub(super) cmd_tx: mpsc::Sender<LifecycleCommand>,
    pub(super) shutdown_tx: mpsc::Sender<ShutdownRequest>,
    pub(super) status: Arc<RwLock<ProfileStatus>>,
    pub(super) control: Arc<dyn ProcessControl>,
    pub(super) terminated: CancellationToken,
}

impl LifecycleHandle {
    fn terminated_err(&self) -> Error {
        Error::LifecycleTerminated {
            profile_id: self.profile_id.to_string(),
        }
    }

    pub fn profile_id(&self) -> &ProfileId {
        &self.profile_id
    }

    /// Status as the actor last published it.
    pub fn snapshot(&self) -> ProfileStatus {
        self.status.read().clone()
    }

    /// Current status with `process_running` reconciled against the
    /// process layer. Never blocks on event processing.
    pub async fn status(&self) -> ProfileStatus {
        let running = self.control.is_profile_running(&self.profile_id).await;
        let mut status = self.snapshot();
        status.process_running = running;
        status
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.is_cancelled()
    }

    /// Delivers one event and waits until the actor has fully handled it,
    /// including any recovery it triggered.
    ///
    /// # Errors
    /// - `Validation` if the event is addressed to another profile
    /// - `LifecycleTerminated` once the actor has shut down
    pub async fn send_event(&self, event: LifecycleEvent) -> Result<ProfileStatus> {
        if event.profile_id != self.profile_id {
            return Err(Error::validation(format!(
                "event for profile {} delivered to lifecycle of {}",
                event.profile_id, self.profile_id
            )));
        }

        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(LifecycleCommand::Event { event, resp: tx })
            .await
            .map_err(|_| self.terminated_err())?;
        rx.await.map_err(|_| self.terminated_err())?
    }

    /// Runs the recovery flow for `failure` if the profile is `READY` or
    /// `DEGRADED`; otherwise returns the unchanged status.
    pub async fn recover(&self, failure: FailureType) -> Result<ProfileStatus> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(LifecycleCommand::Recover { failure, resp: tx })
            .await
            .map_err(|_| self.terminated_err())?;
        rx.await.map_err(|_| self.terminated_err())?
    }

    pub async fn history(&self) -> Result<Vec<StateTransition>> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(LifecycleCommand::History { resp: tx })
            .await
            .map_err(|_| self.terminated_err())?;
        rx.await.map_err(|_| self.terminated_err())
    }

    /// Stops the profile's process if it runs and terminates the actor.
    ///
    /// Waits for the in-flight event to finish first. Calling this on an
    /// already terminated lifecycle returns its final status.
    pub async fn shutdown(&self) -> ProfileStatus {
        let (tx, rx) = oneshot::channel();
        if self.shutdown_tx.send(ShutdownRequest { resp: tx }).await.is_ok() {
            if let Ok(status) = rx.await {
                return status;
            }
        }
        self.terminated.cancelled().await;
        self.status().await
    }

    /// Resolves once the actor loop has exited.
    pub async fn wait_terminated(&self) {
        self.terminated.cancelled().await;
    }
}
