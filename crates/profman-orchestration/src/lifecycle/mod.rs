//! Per-profile lifecycle, actor style:
//! - A single task owns the state machine and handles events in order
//! - A command enum carries events and queries to that task
//! - [`LifecycleHandle`] is the cloneable public API
//!
//! Shutdown travels on its own channel and the actor polls it first
//! (biased select), so shutdown is never stuck behind a queue of events.
//! An event that is already being handled runs to completion first.
//!
//! Status reads do not go through the actor. The actor publishes a
//! [`ProfileStatus`] snapshot behind a short-lived lock after every event,
//! which keeps the query path usable while a recovery is in progress. The
//! handle overlays the live process flag on that snapshot at query time.
//!
//! Every collaborator error is converted into a recorded error plus a
//! `FAILED` or `DEGRADED` state; nothing escapes the actor task, and a
//! panic while handling an event is caught and recorded as `FAILED`.

mod actor;
mod commands;
mod handle;


pub use handle::LifecycleHandle;

use crate::journal::EventJournal;
use crate::recovery::{RecoveryFlow, RetryingControl};
use actor::LifecycleActor;
use parking_lot::RwLock;
use profman_common::{ProfileId, RetryPolicy};
use profman_profile_state::{LifecycleStateMachine, ProfileStatus};
use profman_supervisor::ProcessControl;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Knobs shared by every lifecycle an orchestrator starts.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub retry: RetryPolicy,
    pub grace_interval: Duration,
    pub queue_capacity: usize,
    /// Journal file for this profile, when journaling is on
    pub journal_path: Option<PathBuf>,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            grace_interval: Duration::from_secs(5),
            queue_capacity: 64,
            journal_path: None,
        }
    }
}

/// Spawns the actor for `profile_id` in `IDLE` and returns its handle.
///
/// `cancel` aborts in-flight retry and grace waits; cancelling it does not
/// by itself terminate the lifecycle.
pub fn spawn_lifecycle(
    profile_id: ProfileId,
    control: Arc<dyn ProcessControl>,
    settings: LifecycleSettings,
    cancel: CancellationToken,
) -> LifecycleHandle {
    let capacity = settings.queue_capacity.max(1);
    let (cmd_tx, cmd_rx) = mpsc::channel(capacity);
    let (shutdown_tx, shutdown_rx) = mpsc::channel(4);
    let status = Arc::new(RwLock::new(ProfileStatus::new(profile_id.clone())));
    let terminated = CancellationToken::new();

    let live_control = Arc::clone(&control);
    let control = RetryingControl::new(control, settings.retry, cancel);
    let actor = LifecycleActor {
        machine: LifecycleStateMachine::new(profile_id.clone()),
        status: Arc::clone(&status),
        recovery: RecoveryFlow::new(control.clone(), settings.grace_interval),
        control,
        journal: settings.journal_path.map(EventJournal::new),
        error: None,
    };

    tokio::spawn(actor.run(cmd_rx, shutdown_rx, terminated.clone()));

    LifecycleHandle {
        profile_id,
        cmd_tx,
        shutdown_tx,
        status,
        control: live_control,
        terminated,
    }
}
