//! Profile records as persisted in `profiles.json`.

use profman_common::ProfileId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Whether the registry believes the profile's process is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Open,
    #[default]
    Closed,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordStatus::Open => f.write_str("open"),
            RecordStatus::Closed => f.write_str("closed"),
        }
    }
}

/// One profile identity and its resolved filesystem layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub alias: String,
    #[serde(default)]
    pub master: bool,
    pub path: PathBuf,
    pub extension_path: PathBuf,
    pub logs_dir: PathBuf,
    pub spec_path: PathBuf,
    pub config_dir: PathBuf,
    #[serde(default)]
    pub launch_count: u32,
    #[serde(default)]
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_id: Option<String>,
    #[serde(default)]
    pub archived: bool,
}

impl Profile {
    pub fn is_open(&self) -> bool {
        self.status == RecordStatus::Open
    }

    pub fn user_data_dir(&self) -> PathBuf {
        self.path.join("userdata")
    }
}

/// The whole registry file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryDocument {
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

impl RegistryDocument {
    pub fn get(&self, id: &ProfileId) -> Option<&Profile> {
        self.profiles.iter().find(|p| &p.id == id)
    }

    pub fn get_mut(&mut self, id: &ProfileId) -> Option<&mut Profile> {
        self.profiles.iter_mut().find(|p| &p.id == id)
    }

    pub fn find_by_alias(&self, alias: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.alias == alias)
    }

    pub fn master(&self) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.master)
    }

    pub fn open_profiles(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.iter().filter(|p| p.is_open())
    }
}

pub const ORPHANED_PID_REASON: &str = "orphaned_pid";

/// A proposed status fix for one registry record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    pub profile_id: ProfileId,
    pub old_status: RecordStatus,
    pub new_status: RecordStatus,
    pub old_pid: Option<u32>,
    pub reason: String,
}

impl Correction {
    /// Open record whose PID is dead or foreign: close it, clear the PID.
    pub fn orphaned(profile: &Profile) -> Self {
        Self {
            profile_id: profile.id.clone(),
            old_status: profile.status,
            new_status: RecordStatus::Closed,
            old_pid: profile.pid,
            reason: ORPHANED_PID_REASON.to_string(),
        }
    }
}
