//! Internal command protocol for the lifecycle actor.

use profman_common::Result;
use profman_profile_state::{FailureType, LifecycleEvent, ProfileStatus, StateTransition};
use tokio::sync::oneshot;

pub(super) enum LifecycleCommand {
    /// Process one inbound event; replies with the status after it
    Event {
        event: LifecycleEvent,
        resp: oneshot::Sender<Result<ProfileStatus>>,
    },
    /// Run the recovery flow for a failure reported out of band
    Recover {
        failure: FailureType,
        resp: oneshot::Sender<Result<ProfileStatus>>,
    },
    /// Recorded transitions, oldest first
    History {
        resp: oneshot::Sender<Vec<StateTransition>>,
    },
}

/// Sent on the dedicated shutdown channel.
pub(super) struct ShutdownRequest {
    pub resp: oneshot::Sender<ProfileStatus>,
}
