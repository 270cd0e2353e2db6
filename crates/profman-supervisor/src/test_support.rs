//! Fixtures shared by the supervisor tests.

use profman_common::ProfileId;
use profman_registry::LaunchSpec;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Writes `<dir>/bin/engine`, a script that ignores its flags and sleeps.
pub fn fake_engine(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let bin = dir.join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let path = bin.join("engine");
    std::fs::write(&path, "#!/bin/sh\nexec sleep 30\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn spec_for(dir: &Path, engine: &Path, profile: &str) -> LaunchSpec {
    let root = dir.join("profiles").join(profile);
    LaunchSpec {
        profile_id: ProfileId::from(profile),
        launch_id: format!("launch-{}", profile),
        executable: engine.to_path_buf(),
        user_data_dir: root.join("userdata"),
        extension_dir: root.join("extension"),
        log_dir: dir.join("logs").join(profile),
        target_url: None,
        engine_flags: vec![],
        custom_flags: vec![],
        environment: BTreeMap::new(),
        hidden: true,
        created_at: chrono::Utc::now(),
    }
}
