//! Named-condition wait primitive used to sequence startup.
//!
//! A condition, once signalled, stays satisfied for the lifetime of the
//! gate, so late waiters return immediately.

use profman_common::{Error, Result};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Core dependencies (registry, hygiene, engine service) are up.
pub const DEPENDENCIES_READY: &str = "DEPENDENCIES_READY";

pub struct SystemGate {
    satisfied: watch::Sender<HashSet<String>>,
}

impl Default for SystemGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemGate {
    pub fn new() -> Self {
        let (satisfied, _) = watch::channel(HashSet::new());
        Self { satisfied }
    }

    pub fn signal(&self, condition: &str) {
        let newly = self.satisfied.send_if_modified(|set| set.insert(condition.to_string()));
        if newly {
            info!("Condition {} satisfied", condition);
        }
    }

    pub fn is_satisfied(&self, condition: &str) -> bool {
        self.satisfied.borrow().contains(condition)
    }

    /// Waits until `condition` is signalled.
    ///
    /// `None` or a zero timeout waits indefinitely. Otherwise the wait
    /// fails with `CONDITION_TIMEOUT` once the timeout elapses.
    pub async fn wait_for(&self, condition: &str, timeout: Option<Duration>) -> Result<()> {
        match timeout.filter(|t| !t.is_zero()) {
            None => self.wait_satisfied(condition).await,
            Some(limit) => tokio::time::timeout(limit, self.wait_satisfied(condition))
                .await
                .map_err(|_| Error::condition_timeout(condition, limit))?,
        }
    }

    /// Like [`wait_for`](Self::wait_for), but also gives up when `cancel` fires.
    pub async fn wait_for_cancellable(
        &self,
        condition: &str,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tokio::select! {
            result = self.wait_for(condition, timeout) => result,
            _ = cancel.cancelled() => Err(Error::cancelled(format!("wait for {}", condition))),
        }
    }

    async fn wait_satisfied(&self, condition: &str) -> Result<()> {
        let mut rx = self.satisfied.subscribe();
        loop {
            if rx.borrow_and_update().contains(condition) {
                debug!("Wait for {} released", condition);
                return Ok(());
            }
            // The sender lives in `self`, so this only fails if the gate is gone.
            rx.changed()
                .await
                .map_err(|_| Error::cancelled(format!("wait for {}", condition)))?;
        }
    }
}
