//! Seams between the lifecycle layer and the supervisor.
//!
//! [`ProcessControl`] is everything a profile's lifecycle may ask of the
//! process layer. [`SupervisorControl`] implements it on top of the
//! supervisor, the registry and the launch-spec builder, so the lifecycle
//! never touches a process handle.
//!
//! [`ControlChannel`] carries lightweight requests to a running profile
//! through the engine service. [`TcpControlChannel`] speaks JSON lines on
//! the service control port:
//!
//! ```text
//! -> {"type":"RECOVERY_PING","profile_id":"…","command_id":"…"}
//! <- {"success":true}
//! ```

use crate::supervisor::ProcessSupervisor;
use async_trait::async_trait;
use profman_common::{ProcessError, ProcessResult, ProfileId, Result};
use profman_process::local_addr;
use profman_registry::{LaunchSpecBuilder, ProfileRegistry};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

pub const RECOVERY_PING: &str = "RECOVERY_PING";

/// What a successful launch produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchReceipt {
    pub pid: u32,
    pub launch_id: String,
}

/// Process operations available to a profile's lifecycle.
///
/// Each call is a single attempt; callers apply their retry policy.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Prepares a fresh launch spec and starts the profile's process.
    async fn launch_profile(&self, profile_id: &ProfileId) -> Result<LaunchReceipt>;

    /// Gracefully stops the profile's process, confirming exit.
    async fn stop_profile(&self, profile_id: &ProfileId) -> Result<()>;

    /// Asks the running profile to execute a no-op action.
    async fn ping_profile(&self, profile_id: &ProfileId) -> Result<()>;

    /// Whether the supervisor currently holds a live handle for the profile.
    async fn is_profile_running(&self, profile_id: &ProfileId) -> bool;
}

#[async_trait]
pub trait ControlChannel: Send + Sync {
    async fn ping(&self, profile_id: &ProfileId) -> ProcessResult<()>;
}

#[derive(Debug, Serialize)]
struct IntentRequest<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    profile_id: &'a str,
    command_id: String,
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

/// JSON-lines request/response over the service control port.
#[derive(Debug, Clone)]
pub struct TcpControlChannel {
    addr: SocketAddr,
    timeout: Duration,
}

impl TcpControlChannel {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    pub fn local(port: u16, timeout: Duration) -> Self {
        Self::new(local_addr(port), timeout)
    }

    async fn round_trip(&self, profile_id: &ProfileId) -> ProcessResult<IntentResponse> {
        let id = profile_id.as_str();
        let err = |reason: String| ProcessError::control_channel(id, reason);

        let mut stream = TcpStream::connect(self.addr)
            .await
            .map_err(|e| err(format!("connect {}: {}", self.addr, e)))?;

        let request = IntentRequest {
            kind: RECOVERY_PING,
            profile_id: id,
            command_id: format!("recovery_ping_{}", chrono::Utc::now().timestamp_millis()),
        };
        let mut line = serde_json::to_vec(&request).map_err(|e| err(e.to_string()))?;
        line.push(b'\n');
        stream
            .write_all(&line)
            .await
            .map_err(|e| err(format!("write: {}", e)))?;

        let mut reader = BufReader::new(stream);
        let mut response = String::new();
        let read = reader
            .read_line(&mut response)
            .await
            .map_err(|e| err(format!("read: {}", e)))?;
        if read == 0 {
            return Err(err("connection closed without a response".to_string()));
        }

        serde_json::from_str(response.trim())
            .map_err(|e| err(format!("invalid response {:?}: {}", response.trim(), e)))
    }
}

#[async_trait]
impl ControlChannel for TcpControlChannel {
    async fn ping(&self, profile_id: &ProfileId) -> ProcessResult<()> {
        let response = tokio::time::timeout(self.timeout, self.round_trip(profile_id))
            .await
            .map_err(|_| ProcessError::timeout(profile_id.as_str(), RECOVERY_PING))??;

        if response.success {
            debug!("Recovery ping acknowledged for profile {}", profile_id);
            Ok(())
        } else {
            Err(ProcessError::control_channel(
                profile_id.as_str(),
                response
                    .error
                    .unwrap_or_else(|| "ping rejected".to_string()),
            ))
        }
    }
}

/// [`ProcessControl`] backed by the real supervisor.
pub struct SupervisorControl {
    supervisor: Arc<ProcessSupervisor>,
    registry: Arc<ProfileRegistry>,
    spec_builder: LaunchSpecBuilder,
    channel: Arc<dyn ControlChannel>,
}

impl SupervisorControl {
    pub fn new(
        supervisor: Arc<ProcessSupervisor>,
        registry: Arc<ProfileRegistry>,
        spec_builder: LaunchSpecBuilder,
        channel: Arc<dyn ControlChannel>,
    ) -> Self {
        Self {
            supervisor,
            registry,
            spec_builder,
            channel,
        }
    }

    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }
}

#[async_trait]
impl ProcessControl for SupervisorControl {
    async fn launch_profile(&self, profile_id: &ProfileId) -> Result<LaunchReceipt> {
        let profile = self.registry.get(profile_id).await?;

        self.supervisor
            .preflight_check(profile_id, &profile.user_data_dir())
            .await?;

        let spec = self.spec_builder.prepare(&profile).await?;
        let pid = self.supervisor.launch_process(&spec).await?;

        if let Err(e) = self
            .registry
            .record_launch(profile_id, pid, &spec.launch_id)
            .await
        {
            warn!(
                "Launch of profile {} could not be recorded; stopping it: {}",
                profile_id, e
            );
            if let Err(stop_err) = self.supervisor.stop_profile(profile_id).await {
                warn!("Rollback stop for profile {} failed: {}", profile_id, stop_err);
            }
            return Err(e);
        }

        info!(
            "Profile {} launched (PID {}, launch {})",
            profile_id, pid, spec.launch_id
        );
        Ok(LaunchReceipt {
            pid,
            launch_id: spec.launch_id,
        })
    }

    async fn stop_profile(&self, profile_id: &ProfileId) -> Result<()> {
        self.supervisor.stop_profile(profile_id).await?;
        self.registry.record_closed(profile_id).await
    }

    async fn ping_profile(&self, profile_id: &ProfileId) -> Result<()> {
        if !self.supervisor.is_profile_running(profile_id).await {
            return Err(ProcessError::not_found(profile_id.browser_process_name()).into());
        }
        Ok(self.channel.ping(profile_id).await?)
    }

    async fn is_profile_running(&self, profile_id: &ProfileId) -> bool {
        self.supervisor.is_profile_running(profile_id).await
    }
}
