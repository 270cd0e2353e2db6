//! The persisted profile registry.
//!
//! The whole document is held in memory behind one async mutex. Every
//! mutation clones the document, applies the change, rewrites the file
//! atomically and only then commits the clone, so a failed write leaves
//! memory and disk in agreement.

use crate::paths::OrchestratorPaths;
use crate::profile::{Correction, Profile, RecordStatus, RegistryDocument};
use profman_common::{Error, ProfileId, Result};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Reads a registry file without taking any lock.
///
/// A missing file is an empty registry; a malformed one is an error.
pub fn read_document(path: &Path) -> Result<RegistryDocument> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_document(path, &content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RegistryDocument::default()),
        Err(e) => Err(Error::registry(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

fn parse_document(path: &Path, content: &str) -> Result<RegistryDocument> {
    if content.trim().is_empty() {
        return Ok(RegistryDocument::default());
    }
    serde_json::from_str(content).map_err(|e| {
        Error::registry(format!("Invalid registry format in {}: {}", path.display(), e))
    })
}

/// Writes `path` via a sibling temp file and a rename.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            Error::registry(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let temp_path = path.with_extension("tmp");
    tokio::fs::write(&temp_path, bytes)
        .await
        .map_err(|e| Error::registry(format!("Failed to write {}: {}", temp_path.display(), e)))?;

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(Error::registry(format!(
            "Failed to replace {}: {}",
            path.display(),
            e
        )));
    }
    Ok(())
}

pub struct ProfileRegistry {
    paths: OrchestratorPaths,
    document: Mutex<RegistryDocument>,
}

impl ProfileRegistry {
    /// Loads the registry at `paths.registry_file`.
    pub async fn open(paths: OrchestratorPaths) -> Result<Self> {
        let path = paths.registry_file.clone();
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(Error::registry(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        let document = match content {
            Some(content) => parse_document(&path, &content)?,
            None => RegistryDocument::default(),
        };

        info!(
            "Loaded profile registry {} ({} profiles)",
            path.display(),
            document.profiles.len()
        );

        Ok(Self {
            paths,
            document: Mutex::new(document),
        })
    }

    pub fn path(&self) -> &Path {
        &self.paths.registry_file
    }

    pub fn paths(&self) -> &OrchestratorPaths {
        &self.paths
    }

    pub async fn snapshot(&self) -> RegistryDocument {
        self.document.lock().await.clone()
    }

    pub async fn list(&self) -> Vec<Profile> {
        self.document.lock().await.profiles.clone()
    }

    pub async fn get(&self, id: &ProfileId) -> Result<Profile> {
        self.document
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::profile_not_found(id.as_str()))
    }

    pub async fn find_by_alias(&self, alias: &str) -> Option<Profile> {
        self.document.lock().await.find_by_alias(alias).cloned()
    }

    /// Serialized read-modify-write.
    async fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut RegistryDocument) -> Result<T>,
    {
        let mut guard = self.document.lock().await;
        let mut next = guard.clone();
        let value = f(&mut next)?;

        let json = serde_json::to_vec_pretty(&next)
            .map_err(|e| Error::registry(format!("Failed to serialize registry: {}", e)))?;
        write_atomic(&self.paths.registry_file, &json).await?;

        *guard = next;
        Ok(value)
    }

    /// Creates a new profile identity with its directory layout.
    pub async fn provision(&self, alias: &str, master: bool) -> Result<Profile> {
        let alias = alias.trim();
        if alias.is_empty() {
            return Err(Error::validation("Profile alias cannot be empty"));
        }

        // Cheap pre-check so a duplicate never creates directories
        if self.find_by_alias(alias).await.is_some() {
            return Err(Error::duplicate_alias(alias));
        }

        let id = ProfileId::new(uuid::Uuid::new_v4().to_string());
        let profile = Profile {
            id: id.clone(),
            alias: alias.to_string(),
            master,
            path: self.paths.profile_root(&id),
            extension_path: self.paths.extension_dir(&id),
            logs_dir: self.paths.profile_logs_dir(&id),
            spec_path: self.paths.spec_path(&id),
            config_dir: self.paths.profile_config_dir(&id),
            launch_count: 0,
            status: RecordStatus::Closed,
            pid: None,
            launch_id: None,
            archived: false,
        };

        for dir in [
            profile.path.clone(),
            profile.user_data_dir(),
            profile.extension_path.clone(),
            profile.logs_dir.clone(),
            profile.config_dir.clone(),
        ] {
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                Error::registry(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }

        let created = profile.clone();
        self.mutate(move |doc| {
            if doc.find_by_alias(&profile.alias).is_some() {
                return Err(Error::duplicate_alias(profile.alias.clone()));
            }
            if profile.master {
                demote_all(doc);
            }
            doc.profiles.push(profile);
            Ok(())
        })
        .await?;

        info!(
            "Provisioned profile {} (alias: {}, master: {})",
            created.id, created.alias, created.master
        );
        Ok(created)
    }

    /// Makes `id` the single master profile.
    pub async fn promote_master(&self, id: &ProfileId) -> Result<()> {
        self.mutate(|doc| {
            if doc.get(id).is_none() {
                return Err(Error::profile_not_found(id.as_str()));
            }
            demote_all(doc);
            if let Some(profile) = doc.get_mut(id) {
                profile.master = true;
            }
            Ok(())
        })
        .await?;
        info!("Profile {} promoted to master", id);
        Ok(())
    }

    /// Marks a profile archived. Archived profiles cannot be launched.
    pub async fn archive(&self, id: &ProfileId) -> Result<()> {
        self.mutate(|doc| {
            let profile = doc
                .get_mut(id)
                .ok_or_else(|| Error::profile_not_found(id.as_str()))?;
            if profile.is_open() {
                return Err(Error::validation(format!(
                    "Profile {} is open; close it before archiving",
                    id
                )));
            }
            profile.archived = true;
            profile.master = false;
            Ok(())
        })
        .await?;
        info!("Profile {} archived", id);
        Ok(())
    }

    /// Removes a closed profile's record. Its directories are left on disk.
    pub async fn unregister(&self, id: &ProfileId) -> Result<Profile> {
        let removed = self
            .mutate(|doc| {
                let index = doc
                    .profiles
                    .iter()
                    .position(|p| &p.id == id)
                    .ok_or_else(|| Error::profile_not_found(id.as_str()))?;
                if doc.profiles[index].is_open() {
                    return Err(Error::validation(format!(
                        "Profile {} is open; close it before unregistering",
                        id
                    )));
                }
                Ok(doc.profiles.remove(index))
            })
            .await?;
        info!("Profile {} unregistered", id);
        Ok(removed)
    }

    /// Records a successful launch: open, new PID, bumped counter.
    pub async fn record_launch(&self, id: &ProfileId, pid: u32, launch_id: &str) -> Result<u32> {
        let count = self
            .mutate(|doc| {
                let profile = doc
                    .get_mut(id)
                    .ok_or_else(|| Error::profile_not_found(id.as_str()))?;
                if profile.archived {
                    return Err(Error::validation(format!("Profile {} is archived", id)));
                }
                profile.status = RecordStatus::Open;
                profile.pid = Some(pid);
                profile.launch_id = Some(launch_id.to_string());
                profile.launch_count += 1;
                Ok(profile.launch_count)
            })
            .await?;
        debug!("Profile {} launch #{} recorded (pid {})", id, count, pid);
        Ok(count)
    }

    /// Records that the profile's process is gone.
    pub async fn record_closed(&self, id: &ProfileId) -> Result<()> {
        self.mutate(|doc| {
            let profile = doc
                .get_mut(id)
                .ok_or_else(|| Error::profile_not_found(id.as_str()))?;
            profile.status = RecordStatus::Closed;
            profile.pid = None;
            Ok(())
        })
        .await?;
        debug!("Profile {} recorded closed", id);
        Ok(())
    }

    /// Applies audited corrections with compare-and-set semantics.
    ///
    /// A correction lands only if the record still carries the audited
    /// status and PID; anything changed since the audit is skipped.
    /// Returns the number applied.
    pub async fn apply_corrections(&self, corrections: &[Correction]) -> Result<usize> {
        if corrections.is_empty() {
            return Ok(0);
        }

        let applied = self
            .mutate(|doc| {
                let mut applied = 0;
                for correction in corrections {
                    match doc.get_mut(&correction.profile_id) {
                        Some(profile)
                            if profile.status == correction.old_status
                                && profile.pid == correction.old_pid =>
                        {
                            profile.status = correction.new_status;
                            profile.pid = None;
                            applied += 1;
                        }
                        Some(_) => {
                            warn!(
                                "Skipping stale correction for profile {}",
                                correction.profile_id
                            );
                        }
                        None => {
                            warn!(
                                "Skipping correction for unknown profile {}",
                                correction.profile_id
                            );
                        }
                    }
                }
                Ok(applied)
            })
            .await?;

        info!(
            "Applied {}/{} hygiene corrections",
            applied,
            corrections.len()
        );
        Ok(applied)
    }
}

fn demote_all(doc: &mut RegistryDocument) {
    for profile in doc.profiles.iter_mut().filter(|p| p.master) {
        debug!("Demoting previous master {}", profile.id);
        profile.master = false;
    }
}

/// Path of the registry temp file, exposed for cleanup tooling.
pub fn temp_path_for(path: &Path) -> PathBuf {
    path.with_extension("tmp")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registry(dir: &Path) -> ProfileRegistry {
        ProfileRegistry::open(OrchestratorPaths::new(dir)).await.unwrap()
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path()).await;
        assert!(reg.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_file_is_precondition_error() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = OrchestratorPaths::new(tmp.path());
        std::fs::create_dir_all(&paths.config_dir).unwrap();
        std::fs::write(&paths.registry_file, "{not json").unwrap();

        let err = ProfileRegistry::open(paths.clone()).await.err().unwrap();
        assert_eq!(err.class(), profman_common::ErrorClass::Precondition);
        assert!(read_document(&paths.registry_file).is_err());
    }

    #[tokio::test]
    async fn test_provision_persists_and_creates_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path()).await;

        let profile = reg.provision("alpha", false).await.unwrap();
        assert!(profile.path.is_dir());
        assert!(profile.user_data_dir().is_dir());
        assert!(profile.extension_path.is_dir());
        assert!(profile.logs_dir.is_dir());
        assert_eq!(profile.status, RecordStatus::Closed);
        assert!(uuid::Uuid::parse_str(profile.id.as_str()).is_ok());

        let on_disk = read_document(reg.path()).unwrap();
        assert_eq!(on_disk.profiles.len(), 1);
        assert_eq!(on_disk.profiles[0].alias, "alpha");
        assert!(!temp_path_for(reg.path()).exists());

        // Reload from disk
        let reopened = registry(tmp.path()).await;
        assert_eq!(reopened.get(&profile.id).await.unwrap(), profile);
    }

    #[tokio::test]
    async fn test_duplicate_alias_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path()).await;
        reg.provision("alpha", false).await.unwrap();

        let err = reg.provision("alpha", true).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateAlias { .. }));
        assert_eq!(reg.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_single_master() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path()).await;

        let first = reg.provision("first", true).await.unwrap();
        let second = reg.provision("second", true).await.unwrap();
        let doc = reg.snapshot().await;
        assert_eq!(doc.master().unwrap().id, second.id);
        assert_eq!(doc.profiles.iter().filter(|p| p.master).count(), 1);

        reg.promote_master(&first.id).await.unwrap();
        let doc = reg.snapshot().await;
        assert_eq!(doc.master().unwrap().id, first.id);
        assert_eq!(doc.profiles.iter().filter(|p| p.master).count(), 1);
    }

    #[tokio::test]
    async fn test_launch_and_close_bookkeeping() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path()).await;
        let profile = reg.provision("alpha", false).await.unwrap();

        assert_eq!(reg.record_launch(&profile.id, 4242, "launch-1").await.unwrap(), 1);
        let open = reg.get(&profile.id).await.unwrap();
        assert!(open.is_open());
        assert_eq!(open.pid, Some(4242));
        assert_eq!(open.launch_id.as_deref(), Some("launch-1"));

        reg.record_closed(&profile.id).await.unwrap();
        let closed = reg.get(&profile.id).await.unwrap();
        assert_eq!(closed.status, RecordStatus::Closed);
        assert_eq!(closed.pid, None);
        assert_eq!(closed.launch_count, 1);
    }

    #[tokio::test]
    async fn test_archived_profiles_cannot_launch() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path()).await;
        let profile = reg.provision("alpha", true).await.unwrap();

        reg.archive(&profile.id).await.unwrap();
        let archived = reg.get(&profile.id).await.unwrap();
        assert!(archived.archived);
        assert!(!archived.master);
        assert!(reg.record_launch(&profile.id, 1, "l").await.is_err());
    }

    #[tokio::test]
    async fn test_unregister_refuses_open_profiles() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path()).await;
        let profile = reg.provision("alpha", false).await.unwrap();
        reg.record_launch(&profile.id, 77, "l").await.unwrap();

        assert!(reg.unregister(&profile.id).await.is_err());
        reg.record_closed(&profile.id).await.unwrap();
        reg.unregister(&profile.id).await.unwrap();
        assert!(matches!(
            reg.get(&profile.id).await,
            Err(Error::ProfileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_apply_corrections_is_compare_and_set() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path()).await;
        let a = reg.provision("a", false).await.unwrap();
        let b = reg.provision("b", false).await.unwrap();
        reg.record_launch(&a.id, 100, "la").await.unwrap();
        reg.record_launch(&b.id, 200, "lb").await.unwrap();

        let corrections = vec![
            Correction::orphaned(&reg.get(&a.id).await.unwrap()),
            Correction::orphaned(&reg.get(&b.id).await.unwrap()),
        ];

        // b relaunched after the audit: its correction is stale
        reg.record_launch(&b.id, 201, "lb2").await.unwrap();

        assert_eq!(reg.apply_corrections(&corrections).await.unwrap(), 1);
        assert_eq!(reg.get(&a.id).await.unwrap().status, RecordStatus::Closed);
        assert_eq!(reg.get(&b.id).await.unwrap().pid, Some(201));

        // Applying again is a no-op
        assert_eq!(reg.apply_corrections(&corrections).await.unwrap(), 0);
    }
}
