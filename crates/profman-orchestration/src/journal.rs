//! Append-only JSON-lines journal of lifecycle transitions and launch
//! requests, one file per profile.

use chrono::{DateTime, Utc};
use profman_common::{Error, ProfileId, Result};
use profman_profile_state::LifecycleState;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum JournalEntry {
    Transition {
        profile_id: ProfileId,
        from: LifecycleState,
        to: LifecycleState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },
    LaunchRequested {
        profile_id: ProfileId,
        /// `onboarding` or `recovery`
        trigger: String,
        timestamp: DateTime<Utc>,
    },
}

pub struct EventJournal {
    path: PathBuf,
}

impl EventJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, entry: &JournalEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)
            .map_err(|e| Error::validation(format!("Unserializable journal entry: {}", e)))?;
        line.push(b'\n');

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn record_transition(
        &self,
        profile_id: &ProfileId,
        from: LifecycleState,
        to: LifecycleState,
        reason: Option<String>,
    ) -> Result<()> {
        self.append(&JournalEntry::Transition {
            profile_id: profile_id.clone(),
            from,
            to,
            reason,
            timestamp: Utc::now(),
        })
        .await
    }

    pub async fn record_launch(&self, profile_id: &ProfileId, trigger: &str) -> Result<()> {
        self.append(&JournalEntry::LaunchRequested {
            profile_id: profile_id.clone(),
            trigger: trigger.to_string(),
            timestamp: Utc::now(),
        })
        .await
    }

    pub async fn entries(&self) -> Result<Vec<JournalEntry>> {
        read_entries(&self.path).await
    }
}

async fn read_entries(path: &Path) -> Result<Vec<JournalEntry>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut entries = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(entry) => entries.push(entry),
            // A torn final line after a crash is expected
            Err(e) => warn!("Skipping journal line {} in {}: {}", index + 1, path.display(), e),
        }
    }
    Ok(entries)
}

/// The state the last journaled transition ended in, if any.
pub async fn replay_state(path: &Path) -> Result<Option<LifecycleState>> {
    let entries = read_entries(path).await?;
    Ok(entries.iter().rev().find_map(|entry| match entry {
        JournalEntry::Transition { to, .. } => Some(*to),
        JournalEntry::LaunchRequested { .. } => None,
    }))
}
