//! Recovery flow for degraded profiles.
//!
//! A recovery run holds no state between invocations. It selects a
//! strategy from the failure type, drives the process layer through
//! [`RetryingControl`] and reports a [`RecoveryOutcome`] to the lifecycle
//! that invoked it.

use profman_common::{Error, ProfileId, Result, RetryPolicy};
use profman_profile_state::{FailureType, LifecycleState};
use profman_supervisor::{LaunchReceipt, ProcessControl};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// [`ProcessControl`] calls wrapped in the shared retry policy.
#[derive(Clone)]
pub struct RetryingControl {
    inner: Arc<dyn ProcessControl>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RetryingControl {
    pub fn new(inner: Arc<dyn ProcessControl>, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            inner,
            policy,
            cancel,
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn launch(&self, profile_id: &ProfileId) -> Result<LaunchReceipt> {
        let label = format!("launch of profile {}", profile_id);
        profman_common::retry_with_backoff(&self.policy, &label, Some(&self.cancel), |_| {
            let inner = Arc::clone(&self.inner);
            let id = profile_id.clone();
            async move { inner.launch_profile(&id).await }
        })
        .await
    }

    pub async fn stop(&self, profile_id: &ProfileId) -> Result<()> {
        let label = format!("stop of profile {}", profile_id);
        profman_common::retry_with_backoff(&self.policy, &label, Some(&self.cancel), |_| {
            let inner = Arc::clone(&self.inner);
            let id = profile_id.clone();
            async move { inner.stop_profile(&id).await }
        })
        .await
    }

    pub async fn ping(&self, profile_id: &ProfileId) -> Result<()> {
        let label = format!("recovery ping of profile {}", profile_id);
        profman_common::retry_with_backoff(&self.policy, &label, Some(&self.cancel), |_| {
            let inner = Arc::clone(&self.inner);
            let id = profile_id.clone();
            async move { inner.ping_profile(&id).await }
        })
        .await
    }

    pub async fn is_running(&self, profile_id: &ProfileId) -> bool {
        self.inner.is_profile_running(profile_id).await
    }
}

/// Result of one recovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryOutcome {
    pub success: bool,
    pub new_state: LifecycleState,
    pub error: Option<String>,
    /// Set when the strategy relaunched the process.
    pub relaunch: Option<LaunchReceipt>,
}

impl RecoveryOutcome {
    fn recovered(relaunch: Option<LaunchReceipt>) -> Self {
        Self {
            success: true,
            new_state: LifecycleState::Ready,
            error: None,
            relaunch,
        }
    }

    fn failed(error: &Error) -> Self {
        Self {
            success: false,
            new_state: LifecycleState::Failed,
            error: Some(error.to_string()),
            relaunch: None,
        }
    }
}

pub struct RecoveryFlow {
    control: RetryingControl,
    grace_interval: Duration,
}

impl RecoveryFlow {
    pub fn new(control: RetryingControl, grace_interval: Duration) -> Self {
        Self {
            control,
            grace_interval,
        }
    }

    pub async fn run(&self, profile_id: &ProfileId, failure: &FailureType) -> RecoveryOutcome {
        info!("Recovering profile {} from {} failure", profile_id, failure);

        let result = match failure {
            FailureType::Heartbeat => self.restart(profile_id).await.map(Some),
            FailureType::ExtensionError => self.ping(profile_id).await.map(|_| None),
            FailureType::Unknown(other) => Err(Error::unknown_failure_type(other.as_str())),
        };

        match result {
            Ok(relaunch) => {
                info!("Recovery of profile {} succeeded", profile_id);
                RecoveryOutcome::recovered(relaunch)
            }
            Err(e) => {
                warn!("Recovery of profile {} failed: {}", profile_id, e);
                RecoveryOutcome::failed(&e)
            }
        }
    }

    /// Stop, let locks and ports drain, relaunch from a fresh spec.
    async fn restart(&self, profile_id: &ProfileId) -> Result<LaunchReceipt> {
        self.control
            .stop(profile_id)
            .await
            .map_err(|e| e.context("stop failed"))?;

        tokio::select! {
            _ = tokio::time::sleep(self.grace_interval) => {}
            _ = self.control.cancellation_token().cancelled() => {
                return Err(Error::cancelled(format!("recovery of profile {}", profile_id)));
            }
        }

        self.control
            .launch(profile_id)
            .await
            .map_err(|e| e.context("launch failed"))
    }

    async fn ping(&self, profile_id: &ProfileId) -> Result<()> {
        self.control
            .ping(profile_id)
            .await
            .map_err(|e| e.context("ping failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use profman_common::ProcessError;
    use std::collections::VecDeque;

    /// Scripted control: each call pops the next result for its operation.
    #[derive(Default)]
    struct Scripted {
        calls: Mutex<Vec<&'static str>>,
        stops: Mutex<VecDeque<Result<()>>>,
        launches: Mutex<VecDeque<Result<LaunchReceipt>>>,
        pings: Mutex<VecDeque<Result<()>>>,
    }

    fn receipt() -> LaunchReceipt {
        LaunchReceipt {
            pid: 4242,
            launch_id: "relaunch".into(),
        }
    }

    #[async_trait]
    impl ProcessControl for Scripted {
        async fn launch_profile(&self, _: &ProfileId) -> Result<LaunchReceipt> {
            self.calls.lock().push("launch");
            self.launches.lock().pop_front().unwrap_or_else(|| Ok(receipt()))
        }

        async fn stop_profile(&self, _: &ProfileId) -> Result<()> {
            self.calls.lock().push("stop");
            self.stops.lock().pop_front().unwrap_or(Ok(()))
        }

        async fn ping_profile(&self, _: &ProfileId) -> Result<()> {
            self.calls.lock().push("ping");
            self.pings.lock().pop_front().unwrap_or(Ok(()))
        }

        async fn is_profile_running(&self, _: &ProfileId) -> bool {
            true
        }
    }

    fn flow(control: Arc<Scripted>) -> RecoveryFlow {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_interval: Duration::from_millis(1),
            backoff_coefficient: 2.0,
            max_interval: Duration::from_millis(5),
        };
        RecoveryFlow::new(
            RetryingControl::new(control, policy, CancellationToken::new()),
            Duration::from_millis(10),
        )
    }

    fn id() -> ProfileId {
        ProfileId::from("p1")
    }

    #[tokio::test]
    async fn test_heartbeat_restarts_process() {
        let control = Arc::new(Scripted::default());
        let outcome = flow(control.clone()).run(&id(), &FailureType::Heartbeat).await;

        assert!(outcome.success);
        assert_eq!(outcome.new_state, LifecycleState::Ready);
        assert_eq!(outcome.relaunch, Some(receipt()));
        assert_eq!(*control.calls.lock(), vec!["stop", "launch"]);
    }

    #[tokio::test]
    async fn test_heartbeat_relaunch_failure_is_reported() {
        let control = Arc::new(Scripted::default());
        control
            .launches
            .lock()
            .push_back(Err(Error::validation("Engine executable is not configured")));

        let outcome = flow(control.clone()).run(&id(), &FailureType::Heartbeat).await;

        assert!(!outcome.success);
        assert_eq!(outcome.new_state, LifecycleState::Failed);
        let error = outcome.error.unwrap();
        assert!(error.starts_with("launch failed"));
        assert!(error.contains("not configured"));
    }

    #[tokio::test]
    async fn test_stop_failure_aborts_before_relaunch() {
        let control = Arc::new(Scripted::default());
        control
            .stops
            .lock()
            .push_back(Err(ProcessError::configuration("browser_p1", "bad handle").into()));

        let outcome = flow(control.clone()).run(&id(), &FailureType::Heartbeat).await;

        assert!(!outcome.success);
        assert!(outcome.error.unwrap().starts_with("stop failed"));
        assert_eq!(*control.calls.lock(), vec!["stop"]);
    }

    #[tokio::test]
    async fn test_transient_stop_failure_is_retried() {
        let control = Arc::new(Scripted::default());
        control
            .stops
            .lock()
            .push_back(Err(ProcessError::timeout("browser_p1", "stop").into()));

        let outcome = flow(control.clone()).run(&id(), &FailureType::Heartbeat).await;

        assert!(outcome.success);
        assert_eq!(*control.calls.lock(), vec!["stop", "stop", "launch"]);
    }

    #[tokio::test]
    async fn test_extension_error_pings_without_restart() {
        let control = Arc::new(Scripted::default());
        let outcome = flow(control.clone())
            .run(&id(), &FailureType::ExtensionError)
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.relaunch, None);
        assert_eq!(*control.calls.lock(), vec!["ping"]);
    }

    #[tokio::test]
    async fn test_failed_ping_reports_failed() {
        let control = Arc::new(Scripted::default());
        control
            .pings
            .lock()
            .push_back(Err(ProcessError::not_found("browser_p1").into()));

        let outcome = flow(control).run(&id(), &FailureType::ExtensionError).await;
        assert!(!outcome.success);
        assert_eq!(outcome.new_state, LifecycleState::Failed);
    }

    #[tokio::test]
    async fn test_unknown_failure_type_takes_no_action() {
        let control = Arc::new(Scripted::default());
        let outcome = flow(control.clone())
            .run(&id(), &FailureType::parse("disk-full"))
            .await;

        assert!(!outcome.success);
        assert_eq!(
            outcome.error.as_deref(),
            Some("unknown failure type: disk-full")
        );
        assert!(control.calls.lock().is_empty());
    }
}
