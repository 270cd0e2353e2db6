use anyhow::{anyhow, Context, Result};
use profman_common::{RetryPolicy, DEFAULT_CONTROL_PORT};
use profman_registry::{LaunchSpecBuilder, OrchestratorPaths};
use profman_supervisor::{ServiceSpec, SupervisorConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod validation;

/// Top-level configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorOptions,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceConfig>,
    #[serde(default)]
    pub supervisor: SupervisorOptions,
    #[serde(default)]
    pub recovery: RecoveryOptions,
    #[serde(default)]
    pub retry: RetryOptions,
    #[serde(default)]
    pub hygiene: HygieneOptions,
    #[serde(default)]
    pub gate: GateOptions,
    #[serde(default)]
    pub journal: JournalOptions,
    /// Profile IDs whose lifecycles start at boot
    #[serde(default)]
    pub profiles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorOptions {
    /// App data root. Defaults to the user's local data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_directory: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_control_port")]
    pub control_port: u16,
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            base_directory: None,
            log_level: default_log_level(),
            control_port: default_control_port(),
            event_queue_capacity: default_event_queue_capacity(),
        }
    }
}

/// Browser engine launch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Relative paths resolve against the managed binary directory
    #[serde(default)]
    pub executable: String,
    #[serde(default)]
    pub default_flags: Vec<String>,
    #[serde(default)]
    pub custom_flags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(default = "default_true")]
    pub hidden: bool,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            executable: String::new(),
            default_flags: Vec::new(),
            custom_flags: Vec::new(),
            target_url: None,
            hidden: true,
            environment: BTreeMap::new(),
        }
    }
}

/// Background engine service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub executable: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default = "default_startup_timeout", with = "duration_serde")]
    pub startup_timeout: Duration,
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,
    #[serde(default = "default_true")]
    pub hidden: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorOptions {
    #[serde(default = "default_graceful_timeout", with = "duration_serde")]
    pub graceful_timeout: Duration,
    #[serde(default = "default_port_reclaim_timeout", with = "duration_serde")]
    pub port_reclaim_timeout: Duration,
    /// Round-trip limit for control channel requests
    #[serde(default = "default_control_timeout", with = "duration_serde")]
    pub control_timeout: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            graceful_timeout: default_graceful_timeout(),
            port_reclaim_timeout: default_port_reclaim_timeout(),
            control_timeout: default_control_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryOptions {
    /// Pause between stop and relaunch so locks and ports are released
    #[serde(default = "default_grace_interval", with = "duration_serde")]
    pub grace_interval: Duration,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            grace_interval: default_grace_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryOptions {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_interval", with = "duration_serde")]
    pub initial_interval: Duration,
    #[serde(default = "default_backoff_coefficient")]
    pub backoff_coefficient: f64,
    #[serde(default = "default_max_interval", with = "duration_serde")]
    pub max_interval: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_interval: default_initial_interval(),
            backoff_coefficient: default_backoff_coefficient(),
            max_interval: default_max_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HygieneOptions {
    #[serde(default = "default_true")]
    pub audit_on_startup: bool,
    #[serde(default)]
    pub safe_cleanup_on_startup: bool,
    /// Apply audit corrections before any lifecycle starts
    #[serde(default)]
    pub apply_corrections: bool,
}

impl Default for HygieneOptions {
    fn default() -> Self {
        Self {
            audit_on_startup: true,
            safe_cleanup_on_startup: false,
            apply_corrections: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateOptions {
    /// Zero waits indefinitely
    #[serde(default, with = "duration_serde")]
    pub dependencies_timeout: Duration,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournalOptions {
    #[serde(default)]
    pub enabled: bool,
}

impl OrchestratorConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: OrchestratorConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Directory layout under the configured (or default) base directory.
    pub fn paths(&self) -> Result<OrchestratorPaths> {
        let base = match &self.orchestrator.base_directory {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_local_dir()
                .map(|dir| dir.join("profman"))
                .ok_or_else(|| anyhow!("No base_directory configured and no user data directory found"))?,
        };
        Ok(OrchestratorPaths::new(base))
    }

    /// The service is managed only when configured and enabled.
    pub fn managed_service(&self) -> Option<&ServiceConfig> {
        self.service.as_ref().filter(|s| s.enabled)
    }

    pub fn service_address(&self) -> SocketAddr {
        profman_process::local_addr(self.orchestrator.control_port)
    }

    pub fn supervisor_config(&self, paths: &OrchestratorPaths) -> SupervisorConfig {
        SupervisorConfig {
            control_port: self.orchestrator.control_port,
            graceful_timeout: self.supervisor.graceful_timeout,
            port_reclaim_timeout: self.supervisor.port_reclaim_timeout,
            service: self.managed_service().map(|service| ServiceSpec {
                executable: paths.resolve_binary(Path::new(&service.executable)),
                args: service.args.clone(),
                working_dir: service.working_directory.as_ref().map(PathBuf::from),
                environment: service.environment.clone(),
                hidden: service.hidden,
                startup_timeout: service.startup_timeout,
                poll_interval: service.poll_interval,
            }),
        }
    }

    pub fn launch_spec_builder(&self, paths: &OrchestratorPaths) -> LaunchSpecBuilder {
        let executable = if self.engine.executable.is_empty() {
            PathBuf::new()
        } else {
            paths.resolve_binary(Path::new(&self.engine.executable))
        };

        LaunchSpecBuilder::new(executable)
            .engine_flags(self.engine.default_flags.iter().cloned())
            .custom_flags(self.engine.custom_flags.iter().cloned())
            .target_url(self.engine.target_url.clone())
            .environment(self.engine.environment.clone())
            .hidden(self.engine.hidden)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_interval: self.retry.initial_interval,
            backoff_coefficient: self.retry.backoff_coefficient,
            max_interval: self.retry.max_interval,
        }
    }

    /// `None` when the gate should wait forever.
    pub fn dependencies_timeout(&self) -> Option<Duration> {
        Some(self.gate.dependencies_timeout).filter(|t| !t.is_zero())
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_control_port() -> u16 {
    DEFAULT_CONTROL_PORT
}

fn default_event_queue_capacity() -> usize {
    64
}

fn default_true() -> bool {
    true
}

fn default_startup_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_graceful_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_port_reclaim_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_control_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_grace_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_backoff_coefficient() -> f64 {
    2.0
}

fn default_max_interval() -> Duration {
    Duration::from_secs(60)
}

// Custom serialization for Duration
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        // Check for "ms" BEFORE "s" since "ms" ends with 's'
        if let Some(num_str) = s.strip_suffix("ms") {
            let millis: u64 = num_str.parse().map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_millis(millis))
        } else if let Some(num_str) = s.strip_suffix('s') {
            let secs: u64 = num_str.parse().map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_secs(secs))
        } else if let Some(num_str) = s.strip_suffix('m') {
            let mins: u64 = num_str.parse().map_err(|_| format!("Invalid duration: {}", s))?;
            mins.checked_mul(60)
                .map(Duration::from_secs)
                .ok_or_else(|| format!("Duration out of range: {}", s))
        } else {
            Err(format!("Duration must end with 's', 'ms', or 'm': {}", s))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
orchestrator:
  base_directory: /tmp/profman-test
  log_level: debug
  control_port: 5679
engine:
  executable: chrome/chrome
  default_flags: ["--lang=en"]
  target_url: https://example.test/start
service:
  executable: engine-service
  args: ["--serve"]
  startup_timeout: 20s
  poll_interval: 250ms
recovery:
  grace_interval: 2s
retry:
  max_attempts: 5
  max_interval: 1m
gate:
  dependencies_timeout: 45s
profiles: ["p1", "p2"]
"#;

    #[test]
    fn test_load_sample() {
        let config = OrchestratorConfig::load_from_string(SAMPLE).unwrap();
        assert_eq!(config.orchestrator.control_port, 5679);
        assert_eq!(config.orchestrator.event_queue_capacity, 64);
        assert_eq!(config.recovery.grace_interval, Duration::from_secs(2));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_interval, Duration::from_secs(1));
        assert_eq!(config.retry.max_interval, Duration::from_secs(60));
        assert_eq!(config.dependencies_timeout(), Some(Duration::from_secs(45)));
        assert!(config.hygiene.audit_on_startup);
        assert!(!config.hygiene.apply_corrections);
        assert_eq!(config.profiles, vec!["p1", "p2"]);

        let service = config.managed_service().unwrap();
        assert_eq!(service.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = OrchestratorConfig::load_from_string("{}").unwrap();
        assert_eq!(config.orchestrator.control_port, DEFAULT_CONTROL_PORT);
        assert_eq!(config.supervisor.graceful_timeout, Duration::from_secs(10));
        assert_eq!(config.recovery.grace_interval, Duration::from_secs(5));
        assert!(config.engine.hidden);
        assert!(config.managed_service().is_none());
        assert_eq!(config.dependencies_timeout(), None);
    }

    #[test]
    fn test_conversions_resolve_binaries_under_bin_dir() {
        let config = OrchestratorConfig::load_from_string(SAMPLE).unwrap();
        let paths = config.paths().unwrap();
        assert_eq!(paths.base_dir, PathBuf::from("/tmp/profman-test"));

        let supervisor = config.supervisor_config(&paths);
        assert_eq!(supervisor.control_port, 5679);
        let service = supervisor.service.unwrap();
        assert_eq!(service.executable, paths.bin_dir.join("engine-service"));
        assert_eq!(service.startup_timeout, Duration::from_secs(20));

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff_coefficient, 2.0);
    }

    #[test]
    fn test_disabled_service_is_unmanaged() {
        let yaml = "service:\n  executable: svc\n  enabled: false\n";
        let config = OrchestratorConfig::load_from_string(yaml).unwrap();
        assert!(config.service.is_some());
        assert!(config.managed_service().is_none());
    }

    #[test]
    fn test_duration_parsing() {
        use duration_serde::parse_duration;
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration(&format!("{}m", u64::MAX)).is_err());
        assert!(parse_duration("99999999999999999999999s").is_err());
    }

    #[test]
    fn test_duration_round_trip_keeps_millis() {
        let mut config = OrchestratorConfig::default();
        config.service = Some(ServiceConfig {
            executable: "svc".into(),
            args: vec![],
            working_directory: None,
            environment: BTreeMap::new(),
            startup_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            hidden: true,
            enabled: true,
        });
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("500ms"));
        let back = OrchestratorConfig::load_from_string(&yaml).unwrap();
        assert_eq!(
            back.service.unwrap().poll_interval,
            Duration::from_millis(500)
        );
    }
}
