//! End-to-end tier lifecycle: commit → hot → warm → cold.

mod helpers;

use helpers::{manual_clock, test_config, SpikeEmbedder};
use std::sync::Arc;
use strata::memory::session::EventKind;
use strata::memory::types::Importance;
use strata::MemoryManager;

#[test]
fn committed_interactions_flow_down_the_tiers() {
    let dir = tempfile::tempdir().unwrap();
    let clock = manual_clock();
    let manager = MemoryManager::open_with_clock(
        test_config(dir.path()),
        Some(Arc::new(SpikeEmbedder)),
        clock.clone(),
    )
    .unwrap();

    manager.on_event(EventKind::SessionStart, "").unwrap();
    manager
        .on_event(
            EventKind::ResponseCompleted,
            "agreed to shard the metrics table by tenant id",
        )
        .unwrap();

    // Fresh commit: hot only.
    let stats = manager.stats().unwrap();
    assert_eq!(stats.hot_entries, 1);
    assert_eq!(stats.warm_entries, 0);

    // Two days later the entry has aged out of hot; the sweep promotes it warm.
    clock.advance(chrono::Duration::days(2));
    let report = manager.run_sweep();
    assert_eq!(report.promoted_to_warm, 1);
    let stats = manager.stats().unwrap();
    assert_eq!(stats.hot_entries, 0);
    assert_eq!(stats.warm_entries, 1);

    // Past the warm window it ages to cold.
    clock.advance(chrono::Duration::days(8));
    let report = manager.run_sweep();
    assert_eq!(report.aged_to_cold, 1);
    let stats = manager.stats().unwrap();
    assert_eq!(stats.warm_entries, 0);
    assert!(stats.cold_indexed >= 1);
}

#[test]
fn high_importance_commits_are_eagerly_warm_indexed() {
    let dir = tempfile::tempdir().unwrap();
    let clock = manual_clock();
    let manager = MemoryManager::open_with_clock(
        test_config(dir.path()),
        Some(Arc::new(SpikeEmbedder)),
        clock,
    )
    .unwrap();

    manager.commit_interaction(
        "the production database password rotation runbook moved",
        Importance::High,
        None,
    );

    let stats = manager.stats().unwrap();
    assert_eq!(stats.hot_entries, 1);
    assert_eq!(stats.warm_entries, 1, "high importance is indexed immediately");
}

#[test]
fn normal_commits_wait_for_the_promotion_path() {
    let dir = tempfile::tempdir().unwrap();
    let clock = manual_clock();
    let manager = MemoryManager::open_with_clock(
        test_config(dir.path()),
        Some(Arc::new(SpikeEmbedder)),
        clock,
    )
    .unwrap();

    manager.commit_interaction("routine small talk", Importance::Normal, None);
    let stats = manager.stats().unwrap();
    assert_eq!(stats.warm_entries, 0);
}

#[test]
fn hot_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    {
        let manager = MemoryManager::open_with_clock(
            config.clone(),
            Some(Arc::new(SpikeEmbedder)),
            manual_clock(),
        )
        .unwrap();
        manager.commit_interaction("remember me across restarts", Importance::Normal, None);
    }

    let manager =
        MemoryManager::open_with_clock(config, Some(Arc::new(SpikeEmbedder)), manual_clock())
            .unwrap();
    let stats = manager.stats().unwrap();
    assert_eq!(stats.hot_entries, 1);

    let context = manager.context_for_prompt("ok");
    assert!(context.contains("remember me across restarts"));
}

#[test]
fn warm_removal_never_touches_the_cold_log() {
    let dir = tempfile::tempdir().unwrap();
    let clock = manual_clock();
    let manager = MemoryManager::open_with_clock(
        test_config(dir.path()),
        Some(Arc::new(SpikeEmbedder)),
        clock.clone(),
    )
    .unwrap();

    manager
        .on_event(
            EventKind::ResponseCompleted,
            "the ingestion pipeline backfills from the snapshot bucket",
        )
        .unwrap();

    // hot → warm → cold.
    clock.advance(chrono::Duration::days(2));
    manager.run_sweep();
    clock.advance(chrono::Duration::days(8));
    manager.run_sweep();

    let stats = manager.stats().unwrap();
    assert_eq!(stats.warm_entries, 0);
    let before = stats.cold_indexed;

    // Nothing left in warm to remove; repeated sweeps must not shrink cold.
    manager.run_sweep();
    assert_eq!(manager.stats().unwrap().cold_indexed, before);
    assert!(before >= 1);
}

#[test]
fn readmitted_cold_copies_reenter_hot() {
    let dir = tempfile::tempdir().unwrap();
    let clock = manual_clock();
    let manager = MemoryManager::open_with_clock(
        test_config(dir.path()),
        Some(Arc::new(SpikeEmbedder)),
        clock.clone(),
    )
    .unwrap();

    manager
        .on_event(
            EventKind::ResponseCompleted,
            "decided the retention window is ninety days",
        )
        .unwrap();
    clock.advance(chrono::Duration::days(2));
    manager.run_sweep();
    clock.advance(chrono::Duration::days(8));
    manager.run_sweep();
    assert_eq!(manager.stats().unwrap().hot_entries, 0);

    let readmitted = manager
        .readmit_from_cold("retention window ninety", 3)
        .unwrap();
    assert_eq!(readmitted, 1);
    assert_eq!(manager.stats().unwrap().hot_entries, 1);

    // The cold log still holds the original.
    assert!(manager.stats().unwrap().cold_indexed >= 1);

    let context = manager.context_for_prompt("ok");
    assert!(context.contains("retention window is ninety days"));
}

#[test]
fn reclassify_changes_importance_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let manager = MemoryManager::open_with_clock(
        test_config(dir.path()),
        Some(Arc::new(SpikeEmbedder)),
        manual_clock(),
    )
    .unwrap();

    let id = manager.commit_interaction("turned out to matter a lot", Importance::Low, None);
    manager.reclassify(&id, Importance::Critical).unwrap();

    assert!(manager.reclassify("no-such-id", Importance::High).is_err());
}
