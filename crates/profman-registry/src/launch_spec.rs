//! Immutable per-launch process specification.
//!
//! A [`LaunchSpec`] is built fresh for every (re)launch from a profile's
//! record and the engine settings, written once to the profile's spec file
//! and handed to the supervisor. It is never edited afterwards.

use crate::profile::Profile;
use crate::store::write_atomic;
use chrono::{DateTime, Utc};
use profman_common::{Error, ProfileId, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Hardening flags applied to every launch.
const SILENT_FLAGS: &[&str] = &[
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-breakpad",
    "--disable-crash-reporter",
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-renderer-backgrounding",
    "--disable-features=Translate",
    "--disable-sync",
    "--disable-notifications",
    "--noerrdialogs",
    "--disable-gpu",
    "--disable-software-rasterizer",
    "--mute-audio",
    // Ephemeral; concurrent profiles must not contend for one debug port
    "--remote-debugging-port=0",
    "--remote-allow-origins=*",
];

#[cfg(windows)]
const PLATFORM_FLAGS: &[&str] = &["--disable-features=RendererCodeIntegrity"];
#[cfg(not(windows))]
const PLATFORM_FLAGS: &[&str] = &[];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchSpec {
    pub profile_id: ProfileId,
    pub launch_id: String,
    pub executable: PathBuf,
    pub user_data_dir: PathBuf,
    pub extension_dir: PathBuf,
    pub log_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(default)]
    pub engine_flags: Vec<String>,
    #[serde(default)]
    pub custom_flags: Vec<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default = "default_hidden")]
    pub hidden: bool,
    pub created_at: DateTime<Utc>,
}

fn default_hidden() -> bool {
    true
}

impl LaunchSpec {
    /// Full argv (without the executable), in launch order.
    pub fn command_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(
            self.engine_flags.len() + SILENT_FLAGS.len() + self.custom_flags.len() + 8,
        );

        args.extend(self.engine_flags.iter().cloned());
        args.extend(SILENT_FLAGS.iter().map(|f| f.to_string()));
        args.extend(PLATFORM_FLAGS.iter().map(|f| f.to_string()));

        args.push(format!("--user-data-dir={}", self.user_data_dir.display()));
        args.push(format!("--load-extension={}", self.extension_dir.display()));

        let prefix = self.log_dir.join(self.created_at.format("%Y%m%d-%H%M%S").to_string());
        args.push(format!("--log-net-log={}_netlog.json", prefix.display()));
        args.push("--net-log-capture-mode=IncludeAll".to_string());
        args.push(format!("--log-file={}_debug.log", prefix.display()));

        if let Some(url) = &self.target_url {
            args.push(url.clone());
        }

        args.extend(self.custom_flags.iter().cloned());
        args
    }

    /// Writes the spec to `path` atomically, creating the log dir too.
    pub async fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| Error::registry(format!("Failed to serialize launch spec: {}", e)))?;
        tokio::fs::create_dir_all(&self.log_dir).await?;
        write_atomic(path, &json).await
    }

    pub async fn read_from(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::registry(format!("Failed to read launch spec {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            Error::registry(format!("Invalid launch spec {}: {}", path.display(), e))
        })
    }
}

/// Resolves a profile plus engine settings into a [`LaunchSpec`].
#[derive(Debug, Clone)]
pub struct LaunchSpecBuilder {
    executable: PathBuf,
    engine_flags: Vec<String>,
    target_url: Option<String>,
    environment: BTreeMap<String, String>,
    hidden: bool,
    custom_flags: Vec<String>,
}

impl LaunchSpecBuilder {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            engine_flags: Vec::new(),
            target_url: None,
            environment: BTreeMap::new(),
            hidden: true,
            custom_flags: Vec::new(),
        }
    }

    pub fn engine_flags(mut self, flags: impl IntoIterator<Item = String>) -> Self {
        self.engine_flags = flags.into_iter().collect();
        self
    }

    pub fn target_url(mut self, url: Option<String>) -> Self {
        self.target_url = url;
        self
    }

    pub fn environment(mut self, env: BTreeMap<String, String>) -> Self {
        self.environment = env;
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn custom_flags(mut self, flags: impl IntoIterator<Item = String>) -> Self {
        self.custom_flags = flags.into_iter().collect();
        self
    }

    /// Builds a spec with a new launch ID.
    pub fn build(&self, profile: &Profile) -> Result<LaunchSpec> {
        if self.executable.as_os_str().is_empty() {
            return Err(Error::validation("Engine executable is not configured"));
        }
        if profile.archived {
            return Err(Error::validation(format!(
                "Profile {} is archived",
                profile.id
            )));
        }

        Ok(LaunchSpec {
            profile_id: profile.id.clone(),
            launch_id: uuid::Uuid::new_v4().to_string(),
            executable: self.executable.clone(),
            user_data_dir: profile.user_data_dir(),
            extension_dir: profile.extension_path.clone(),
            log_dir: profile.logs_dir.clone(),
            target_url: self.target_url.clone(),
            engine_flags: self.engine_flags.clone(),
            custom_flags: self.custom_flags.clone(),
            environment: self.environment.clone(),
            hidden: self.hidden,
            created_at: Utc::now(),
        })
    }

    /// Builds a spec and writes it to the profile's spec file.
    pub async fn prepare(&self, profile: &Profile) -> Result<LaunchSpec> {
        let spec = self.build(profile)?;
        spec.write_to(&profile.spec_path).await?;
        tracing::debug!(
            "Launch spec {} written for profile {} at {}",
            spec.launch_id,
            profile.id,
            profile.spec_path.display()
        );
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::OrchestratorPaths;
    use crate::profile::RecordStatus;

    fn profile(base: &Path) -> Profile {
        let paths = OrchestratorPaths::new(base);
        let id = ProfileId::from("p1");
        Profile {
            id: id.clone(),
            alias: "alpha".into(),
            master: false,
            path: paths.profile_root(&id),
            extension_path: paths.extension_dir(&id),
            logs_dir: paths.profile_logs_dir(&id),
            spec_path: paths.spec_path(&id),
            config_dir: paths.profile_config_dir(&id),
            launch_count: 0,
            status: RecordStatus::Closed,
            pid: None,
            launch_id: None,
            archived: false,
        }
    }

    #[test]
    fn test_argument_order() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = LaunchSpecBuilder::new("/opt/engine/chrome")
            .engine_flags(vec!["--lang=en".to_string()])
            .target_url(Some("https://example.test/start".into()))
            .custom_flags(vec!["--custom".to_string()])
            .build(&profile(tmp.path()))
            .unwrap();

        let args = spec.command_args();
        let pos = |needle: &str| {
            args.iter()
                .position(|a| a.starts_with(needle))
                .unwrap_or_else(|| panic!("missing {}", needle))
        };

        assert_eq!(args[0], "--lang=en");
        assert!(pos("--lang=en") < pos("--no-first-run"));
        assert!(pos("--remote-allow-origins=*") < pos("--user-data-dir="));
        assert!(pos("--user-data-dir=") < pos("--load-extension="));
        assert!(pos("--load-extension=") < pos("--log-net-log="));
        assert!(pos("--log-file=") < pos("https://example.test/start"));
        assert_eq!(args.last().unwrap(), "--custom");
        assert!(args[pos("--user-data-dir=")].ends_with("userdata"));
    }

    #[test]
    fn test_each_build_gets_a_new_launch_id() {
        let tmp = tempfile::tempdir().unwrap();
        let builder = LaunchSpecBuilder::new("/opt/engine/chrome");
        let p = profile(tmp.path());
        let a = builder.build(&p).unwrap();
        let b = builder.build(&p).unwrap();
        assert_ne!(a.launch_id, b.launch_id);
        assert!(a.hidden);
    }

    #[test]
    fn test_debug_port_is_ephemeral() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = LaunchSpecBuilder::new("/opt/engine/chrome")
            .build(&profile(tmp.path()))
            .unwrap();
        let ports: Vec<_> = spec
            .command_args()
            .into_iter()
            .filter(|a| a.starts_with("--remote-debugging-port="))
            .collect();
        assert_eq!(ports, vec!["--remote-debugging-port=0".to_string()]);
    }

    #[test]
    fn test_missing_executable_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(LaunchSpecBuilder::new("").build(&profile(tmp.path())).is_err());
    }

    #[tokio::test]
    async fn test_prepare_writes_spec_file() {
        let tmp = tempfile::tempdir().unwrap();
        let p = profile(tmp.path());
        let spec = LaunchSpecBuilder::new("/opt/engine/chrome")
            .prepare(&p)
            .await
            .unwrap();

        assert!(p.logs_dir.is_dir());
        let read_back = LaunchSpec::read_from(&p.spec_path).await.unwrap();
        assert_eq!(read_back, spec);
    }
}
