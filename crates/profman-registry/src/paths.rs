//! On-disk layout derived from the orchestrator's base directory.
//!
//! ```text
//! <base>/
//!   bin/                              managed binaries (engine, service)
//!   profiles/<id>/                    profile root
//!   profiles/<id>/userdata/           engine user-data dir
//!   profiles/<id>/extension/          extension payload
//!   logs/profiles/<id>/               per-profile logs and lifecycle journal
//!   config/profiles.json              the registry
//!   config/profile/<id>/launch_spec.json
//! ```

use profman_common::ProfileId;
use std::path::{Path, PathBuf};

pub const REGISTRY_FILE_NAME: &str = "profiles.json";
pub const SPEC_FILE_NAME: &str = "launch_spec.json";
pub const JOURNAL_FILE_NAME: &str = "lifecycle.jsonl";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorPaths {
    pub base_dir: PathBuf,
    pub bin_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub config_dir: PathBuf,
    pub registry_file: PathBuf,
}

impl OrchestratorPaths {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let config_dir = base_dir.join("config");
        Self {
            bin_dir: base_dir.join("bin"),
            profiles_dir: base_dir.join("profiles"),
            logs_dir: base_dir.join("logs"),
            registry_file: config_dir.join(REGISTRY_FILE_NAME),
            config_dir,
            base_dir,
        }
    }

    pub fn profile_root(&self, id: &ProfileId) -> PathBuf {
        self.profiles_dir.join(id.as_str())
    }

    pub fn user_data_dir(&self, id: &ProfileId) -> PathBuf {
        self.profile_root(id).join("userdata")
    }

    pub fn extension_dir(&self, id: &ProfileId) -> PathBuf {
        self.profile_root(id).join("extension")
    }

    pub fn profile_logs_dir(&self, id: &ProfileId) -> PathBuf {
        self.logs_dir.join("profiles").join(id.as_str())
    }

    pub fn profile_config_dir(&self, id: &ProfileId) -> PathBuf {
        self.config_dir.join("profile").join(id.as_str())
    }

    pub fn spec_path(&self, id: &ProfileId) -> PathBuf {
        self.profile_config_dir(id).join(SPEC_FILE_NAME)
    }

    pub fn journal_path(&self, id: &ProfileId) -> PathBuf {
        self.profile_logs_dir(id).join(JOURNAL_FILE_NAME)
    }

    /// Resolves a binary name against `bin/` unless it is already absolute.
    pub fn resolve_binary(&self, executable: &Path) -> PathBuf {
        if executable.is_absolute() {
            executable.to_path_buf()
        } else {
            self.bin_dir.join(executable)
        }
    }

    /// Creates the top-level directories.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            &self.bin_dir,
            &self.profiles_dir,
            &self.logs_dir,
            &self.config_dir,
        ] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }
}
