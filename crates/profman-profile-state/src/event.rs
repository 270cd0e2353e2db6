//! Inbound lifecycle events and recovery failure types.

use chrono::{DateTime, Utc};
use profman_common::{Error, ProfileId, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed events consumed by a profile's lifecycle.
///
/// Serialized in kebab case; the upper snake case names emitted by the
/// browser-side driver are accepted as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    #[serde(alias = "ONBOARDING_STARTED")]
    OnboardingStarted,
    #[serde(alias = "ONBOARDING_COMPLETE")]
    OnboardingComplete,
    #[serde(alias = "ONBOARDING_FAILED")]
    OnboardingFailed,
    #[serde(alias = "EXTENSION_ERROR")]
    ExtensionError,
    #[serde(alias = "HEARTBEAT_FAILED")]
    HeartbeatFailed,
    #[serde(alias = "SERVICE_RECOVERY_STARTED")]
    ServiceRecoveryStarted,
    #[serde(alias = "SERVICE_RECOVERY_COMPLETE")]
    ServiceRecoveryComplete,
    #[serde(alias = "SERVICE_RECOVERY_FAILED")]
    ServiceRecoveryFailed,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::OnboardingStarted,
        EventKind::OnboardingComplete,
        EventKind::OnboardingFailed,
        EventKind::ExtensionError,
        EventKind::HeartbeatFailed,
        EventKind::ServiceRecoveryStarted,
        EventKind::ServiceRecoveryComplete,
        EventKind::ServiceRecoveryFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::OnboardingStarted => "onboarding-started",
            EventKind::OnboardingComplete => "onboarding-complete",
            EventKind::OnboardingFailed => "onboarding-failed",
            EventKind::ExtensionError => "extension-error",
            EventKind::HeartbeatFailed => "heartbeat-failed",
            EventKind::ServiceRecoveryStarted => "service-recovery-started",
            EventKind::ServiceRecoveryComplete => "service-recovery-complete",
            EventKind::ServiceRecoveryFailed => "service-recovery-failed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        EventKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| Error::validation(format!("unknown event type: {}", s)))
    }
}

/// One event delivered to a profile's lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub profile_id: ProfileId,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl LifecycleEvent {
    pub fn new(kind: EventKind, profile_id: ProfileId) -> Self {
        Self {
            kind,
            profile_id,
            timestamp: Utc::now(),
            error: None,
            data: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Remediation strategy selector for the recovery flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FailureType {
    Heartbeat,
    ExtensionError,
    /// Anything else; recovery reports it as a defect.
    Unknown(String),
}

impl FailureType {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "heartbeat" | "heartbeat-failed" => FailureType::Heartbeat,
            "extension-error" => FailureType::ExtensionError,
            _ => FailureType::Unknown(s.to_string()),
        }
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Heartbeat => f.write_str("heartbeat"),
            FailureType::ExtensionError => f.write_str("extension-error"),
            FailureType::Unknown(other) => f.write_str(other),
        }
    }
}
