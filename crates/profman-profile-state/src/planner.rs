//! Maps (current state, event) to the work the lifecycle must do.
//!
//! The planner decides, the lifecycle actor executes. Keeping the decision
//! pure makes the event-handling rules testable without processes.

use crate::event::{EventKind, FailureType, LifecycleEvent};
use crate::LifecycleState;

/// What the lifecycle must do for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Change state only. `error` replaces the recorded error when set.
    Transition {
        to: LifecycleState,
        error: Option<String>,
    },
    /// Build a fresh launch spec and ask the supervisor to start the profile.
    Launch,
    /// Stop whatever process the profile still has, then re-enter
    /// `ONBOARDING` with the recorded error cleared.
    Reonboard,
    /// Enter `DEGRADED` and run the recovery flow synchronously.
    Recover { failure: FailureType },
    /// Event does not apply in the current state.
    Ignore { reason: String },
}

pub fn plan(state: LifecycleState, event: &LifecycleEvent) -> Action {
    use LifecycleState::*;

    match (event.kind, state) {
        (EventKind::OnboardingStarted, Idle | Failed) => Action::Transition {
            to: Onboarding,
            error: None,
        },
        (EventKind::OnboardingStarted, Ready | Degraded | Recovering) => Action::Reonboard,

        // Exactly-once launch: only the first delivery while onboarding acts.
        (EventKind::OnboardingComplete, Onboarding) => Action::Launch,

        (EventKind::OnboardingFailed, Onboarding) => Action::Transition {
            to: Failed,
            error: Some(
                event
                    .error
                    .clone()
                    .unwrap_or_else(|| "onboarding failed".to_string()),
            ),
        },

        (EventKind::ExtensionError, Ready) => Action::Transition {
            to: Degraded,
            error: Some(
                event
                    .error
                    .clone()
                    .unwrap_or_else(|| "extension error reported".to_string()),
            ),
        },

        // A degraded profile is recovered by an operator or a fresh onboarding
        (EventKind::HeartbeatFailed, Ready) => Action::Recover {
            failure: FailureType::Heartbeat,
        },

        (EventKind::ServiceRecoveryStarted, Ready | Degraded) => Action::Transition {
            to: Recovering,
            error: None,
        },

        (EventKind::ServiceRecoveryComplete, Recovering) => Action::Transition {
            to: Ready,
            error: None,
        },

        (EventKind::ServiceRecoveryFailed, Recovering) => Action::Transition {
            to: Failed,
            error: Some(
                event
                    .error
                    .clone()
                    .unwrap_or_else(|| "service recovery failed".to_string()),
            ),
        },

        (kind, state) => Action::Ignore {
            reason: format!("{} has no effect in state {}", kind, state),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use profman_common::ProfileId;

    fn event(kind: EventKind) -> LifecycleEvent {
        LifecycleEvent::new(kind, ProfileId::from("p1"))
    }

    #[test]
    fn test_onboarding_complete_launches_only_while_onboarding() {
        assert_eq!(
            plan(LifecycleState::Onboarding, &event(EventKind::OnboardingComplete)),
            Action::Launch
        );
        for state in [
            LifecycleState::Idle,
            LifecycleState::Ready,
            LifecycleState::Degraded,
            LifecycleState::Recovering,
            LifecycleState::Failed,
        ] {
            assert!(matches!(
                plan(state, &event(EventKind::OnboardingComplete)),
                Action::Ignore { .. }
            ));
        }
    }

    #[test]
    fn test_onboarding_started_reenters_from_failed() {
        let action = plan(LifecycleState::Failed, &event(EventKind::OnboardingStarted));
        assert_eq!(
            action,
            Action::Transition {
                to: LifecycleState::Onboarding,
                error: None
            }
        );
        assert!(matches!(
            plan(LifecycleState::Onboarding, &event(EventKind::OnboardingStarted)),
            Action::Ignore { .. }
        ));
    }

    #[test]
    fn test_onboarding_started_restarts_a_live_profile() {
        for state in [
            LifecycleState::Ready,
            LifecycleState::Degraded,
            LifecycleState::Recovering,
        ] {
            assert_eq!(
                plan(state, &event(EventKind::OnboardingStarted)),
                Action::Reonboard,
                "{}",
                state
            );
        }
    }

    #[test]
    fn test_extension_error_degrades_without_restart() {
        let action = plan(
            LifecycleState::Ready,
            &event(EventKind::ExtensionError).with_error("content script crashed"),
        );
        assert_eq!(
            action,
            Action::Transition {
                to: LifecycleState::Degraded,
                error: Some("content script crashed".to_string())
            }
        );
    }

    #[test]
    fn test_heartbeat_failure_triggers_recovery() {
        assert_eq!(
            plan(LifecycleState::Ready, &event(EventKind::HeartbeatFailed)),
            Action::Recover {
                failure: FailureType::Heartbeat
            }
        );
        for state in [
            LifecycleState::Idle,
            LifecycleState::Onboarding,
            LifecycleState::Degraded,
            LifecycleState::Recovering,
            LifecycleState::Failed,
        ] {
            assert!(
                matches!(
                    plan(state, &event(EventKind::HeartbeatFailed)),
                    Action::Ignore { .. }
                ),
                "{}",
                state
            );
        }
    }

    #[test]
    fn test_external_recovery_bridge() {
        assert_eq!(
            plan(LifecycleState::Degraded, &event(EventKind::ServiceRecoveryStarted)),
            Action::Transition {
                to: LifecycleState::Recovering,
                error: None
            }
        );
        assert_eq!(
            plan(LifecycleState::Recovering, &event(EventKind::ServiceRecoveryComplete)),
            Action::Transition {
                to: LifecycleState::Ready,
                error: None
            }
        );
        assert!(matches!(
            plan(LifecycleState::Recovering, &event(EventKind::ServiceRecoveryFailed)),
            Action::Transition {
                to: LifecycleState::Failed,
                error: Some(_)
            }
        ));
    }

    #[test]
    fn test_onboarding_failed_defaults_error_text() {
        assert_eq!(
            plan(LifecycleState::Onboarding, &event(EventKind::OnboardingFailed)),
            Action::Transition {
                to: LifecycleState::Failed,
                error: Some("onboarding failed".to_string())
            }
        );
    }
}
