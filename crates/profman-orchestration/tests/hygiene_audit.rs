//! Startup audit against a registry written through the real store.

use profman_orchestration::bootstrap::{audit, open_registry};
use profman_orchestration::OrchestratorConfig;
use profman_registry::{RecordStatus, ORPHANED_PID_REASON};

fn config_in(base: &std::path::Path) -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.orchestrator.base_directory = Some(base.to_string_lossy().into_owned());
    config
}

#[tokio::test]
async fn test_audit_reports_exactly_the_dead_pids() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    let (_, registry) = open_registry(&config).await.unwrap();

    let mut dead = Vec::new();
    for (n, alias) in ["alpha", "beta", "gamma"].iter().enumerate() {
        let profile = registry.provision(alias, n == 0).await.unwrap();
        registry
            .record_launch(&profile.id, 4_000_000 + n as u32, "gone")
            .await
            .unwrap();
        dead.push(profile.id);
    }
    let closed = registry.provision("delta", false).await.unwrap();
    dead.sort();

    let before = std::fs::read(registry.path()).unwrap();
    let first = audit(&config, &registry, false).await.unwrap();
    let second = audit(&config, &registry, false).await.unwrap();

    assert_eq!(first.total_profiles, 4);
    assert_eq!(first.open_profiles, 3);
    let mut orphaned = first.orphaned_profiles.clone();
    orphaned.sort();
    assert_eq!(orphaned, dead);
    assert_eq!(first.corrections.len(), 3);
    assert!(first
        .corrections
        .iter()
        .all(|c| c.reason == ORPHANED_PID_REASON && c.new_status == RecordStatus::Closed));
    assert!(!first.orphaned_profiles.contains(&closed.id));

    // Read-only: a second pass sees the same registry
    assert_eq!(first.orphaned_profiles, second.orphaned_profiles);
    assert_eq!(first.corrections, second.corrections);
    assert_eq!(first.corrected_count, 0);
    assert_eq!(std::fs::read(registry.path()).unwrap(), before);
}

#[tokio::test]
async fn test_applied_corrections_close_orphans() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    let (_, registry) = open_registry(&config).await.unwrap();

    let profile = registry.provision("alpha", false).await.unwrap();
    registry
        .record_launch(&profile.id, 4_000_123, "gone")
        .await
        .unwrap();

    let applied = audit(&config, &registry, true).await.unwrap();
    assert_eq!(applied.corrections.len(), 1);
    assert_eq!(applied.corrected_count, 1);

    let record = registry.get(&profile.id).await.unwrap();
    assert_eq!(record.status, RecordStatus::Closed);
    assert_eq!(record.pid, None);

    let after = audit(&config, &registry, false).await.unwrap();
    assert!(after.orphaned_profiles.is_empty());
    assert_eq!(after.open_profiles, 0);
}

#[tokio::test]
async fn test_correction_skips_record_relaunched_meanwhile() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    let (_, registry) = open_registry(&config).await.unwrap();

    let profile = registry.provision("alpha", false).await.unwrap();
    registry
        .record_launch(&profile.id, 4_000_200, "first")
        .await
        .unwrap();
    let report = audit(&config, &registry, false).await.unwrap();
    assert_eq!(report.corrections.len(), 1);

    // A new launch lands between audit and apply
    registry
        .record_launch(&profile.id, 4_000_201, "second")
        .await
        .unwrap();
    let applied = registry.apply_corrections(&report.corrections).await.unwrap();

    assert_eq!(applied, 0);
    let record = registry.get(&profile.id).await.unwrap();
    assert_eq!(record.status, RecordStatus::Open);
    assert_eq!(record.pid, Some(4_000_201));
}
