//! # Profman Profile State
//!
//! The lifecycle state of a profile, the events that drive it and the
//! transition table that keeps it honest. Everything here is pure and
//! synchronous; the async actor that owns one of these machines lives in
//! `profman-orchestration`.

pub mod event;
pub mod planner;

pub use event::{EventKind, FailureType, LifecycleEvent};
pub use planner::{plan, Action};

use chrono::{DateTime, Utc};
use profman_common::{Error, ProfileId, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_HISTORY: usize = 100;

/// Operational state of one profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// No process, no pending work
    Idle,
    /// Readiness sequence in progress
    Onboarding,
    /// Process launched and healthy
    Ready,
    /// Soft failure signalled, process not yet restarted
    Degraded,
    /// Recovery driven by an external supervisor
    Recovering,
    /// Unrecoverable error; a fresh onboarding can re-enter
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Idle => "IDLE",
            LifecycleState::Onboarding => "ONBOARDING",
            LifecycleState::Ready => "READY",
            LifecycleState::Degraded => "DEGRADED",
            LifecycleState::Recovering => "RECOVERING",
            LifecycleState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for LifecycleState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "IDLE" => Ok(LifecycleState::Idle),
            "ONBOARDING" => Ok(LifecycleState::Onboarding),
            "READY" => Ok(LifecycleState::Ready),
            "DEGRADED" => Ok(LifecycleState::Degraded),
            "RECOVERING" => Ok(LifecycleState::Recovering),
            "FAILED" => Ok(LifecycleState::Failed),
            other => Err(Error::validation(format!("unknown lifecycle state: {}", other))),
        }
    }
}

impl LifecycleState {
    /// Terminal for a given run: nothing happens until a new onboarding.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Idle | LifecycleState::Failed)
    }

    /// States in which the profile's process is expected to be alive.
    pub fn expects_process(&self) -> bool {
        matches!(
            self,
            LifecycleState::Ready | LifecycleState::Degraded | LifecycleState::Recovering
        )
    }
}

/// Queryable snapshot of one profile's lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileStatus {
    pub profile_id: ProfileId,
    pub state: LifecycleState,
    pub last_update: DateTime<Utc>,
    pub process_running: bool,
    #[serde(rename = "error", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ProfileStatus {
    pub fn new(profile_id: ProfileId) -> Self {
        Self {
            profile_id,
            state: LifecycleState::Idle,
            last_update: Utc::now(),
            process_running: false,
            error_message: None,
        }
    }
}

/// Represents a state transition with timestamp and optional reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: LifecycleState,
    pub to_state: LifecycleState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Guards every state change of one profile.
#[derive(Debug, Clone)]
pub struct LifecycleStateMachine {
    profile_id: ProfileId,
    current_state: LifecycleState,
    previous_state: Option<LifecycleState>,
    state_history: Vec<StateTransition>,
    last_transition_time: DateTime<Utc>,
}

impl LifecycleStateMachine {
    pub fn new(profile_id: ProfileId) -> Self {
        Self::from_saved_state(profile_id, LifecycleState::Idle)
    }

    /// Rebuilds a machine at a known state, e.g. replayed from a journal.
    pub fn from_saved_state(profile_id: ProfileId, state: LifecycleState) -> Self {
        Self {
            profile_id,
            current_state: state,
            previous_state: None,
            state_history: Vec::new(),
            last_transition_time: Utc::now(),
        }
    }

    pub fn profile_id(&self) -> &ProfileId {
        &self.profile_id
    }

    pub fn current_state(&self) -> LifecycleState {
        self.current_state
    }

    pub fn previous_state(&self) -> Option<LifecycleState> {
        self.previous_state
    }

    pub fn state_history(&self) -> &[StateTransition] {
        &self.state_history
    }

    pub fn last_transition(&self) -> Option<&StateTransition> {
        self.state_history.last()
    }

    pub fn last_transition_time(&self) -> DateTime<Utc> {
        self.last_transition_time
    }

    /// Check if a transition from current state to target state is valid
    pub fn is_valid_transition(&self, target_state: LifecycleState) -> bool {
        use LifecycleState::*;

        match (self.current_state, target_state) {
            // Same state (no-op)
            (state, target) if state == target => true,

            // A fresh onboarding can start from anywhere
            (_, Onboarding) => true,

            // From Onboarding
            (Onboarding, Ready) => true,

            // From Ready
            (Ready, Degraded) | (Ready, Recovering) => true,

            // From Degraded
            (Degraded, Recovering) | (Degraded, Ready) => true,

            // From Recovering
            (Recovering, Ready) => true,

            // Supervisor errors and shutdown can land anywhere
            (_, Failed) | (_, Idle) => true,

            _ => false,
        }
    }

    /// Moves to `target_state`. A same-state request succeeds without
    /// recording history.
    pub fn transition_to(
        &mut self,
        target_state: LifecycleState,
        reason: Option<String>,
    ) -> Result<()> {
        if !self.is_valid_transition(target_state) {
            return Err(Error::invalid_transition(
                self.profile_id.as_str(),
                self.current_state,
                target_state,
            ));
        }

        if target_state == self.current_state {
            return Ok(());
        }

        let now = Utc::now();
        let from_state = self.current_state;
        self.state_history.push(StateTransition {
            from_state,
            to_state: target_state,
            timestamp: now,
            reason,
        });

        // Limit history size to prevent unbounded growth
        if self.state_history.len() > MAX_HISTORY {
            self.state_history.remove(0);
        }

        self.previous_state = Some(from_state);
        self.current_state = target_state;
        self.last_transition_time = now;

        tracing::debug!(
            "Profile {} transitioned from {} to {}",
            self.profile_id,
            from_state,
            target_state
        );

        Ok(())
    }

    /// Count transitions to a specific state
    pub fn count_transitions_to(&self, state: LifecycleState) -> usize {
        self.state_history
            .iter()
            .filter(|t| t.to_state == state)
            .count()
    }
}
