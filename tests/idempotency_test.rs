//! Rebuild decision tests
//!
//! A target is rebuilt when its recipe changes, when it has no success
//! record, or when its last build failed. Unchanged recipes are skipped.

mod common;

use common::{engine, package_file, target, FakeBackend, RecordingIndex, TestWorkspace};
use repowright::core::cache::Outcome;
use repowright::infra::fetch::compute_checksum;
use std::sync::Arc;

const RECIPE: &[u8] = b"pkgname=alpha\npkgver=1\npkgrel=1\n";

fn setup() -> (TestWorkspace, Arc<FakeBackend>, Arc<RecordingIndex>) {
    let ws = TestWorkspace::new();
    let backend = Arc::new(FakeBackend::new(ws.dirs()));
    backend.set_recipe("alpha", RECIPE);
    (ws, backend, Arc::new(RecordingIndex::default()))
}

#[tokio::test]
async fn test_unchanged_recipe_is_not_rebuilt() {
    let (ws, backend, index) = setup();
    let engine = engine(&ws, ws.settings(vec![target("alpha")], 1), Arc::clone(&backend), index);

    let first = engine.run_once(&[]).await.unwrap();
    assert_eq!(first.built, vec!["alpha"]);
    assert!(ws.published(&package_file("alpha")));

    let second = engine.run_once(&[]).await.unwrap();
    assert_eq!(second.skipped, vec!["alpha"]);
    assert!(second.built.is_empty());
    assert_eq!(backend.builds(), 1);
    assert_eq!(backend.fetches(), 2);
}

#[tokio::test]
async fn test_single_byte_change_forces_rebuild() {
    let (ws, backend, index) = setup();
    let engine = engine(&ws, ws.settings(vec![target("alpha")], 1), Arc::clone(&backend), index);
    engine.run_once(&[]).await.unwrap();

    let mut changed = RECIPE.to_vec();
    let idx = changed.len() - 2;
    changed[idx] = b'2';
    backend.set_recipe("alpha", &changed);

    let report = engine.run_once(&[]).await.unwrap();
    assert_eq!(report.built, vec!["alpha"]);
    assert_eq!(backend.builds(), 2);

    let record = engine.cache().inspect("alpha").unwrap().unwrap();
    assert_eq!(record.content_hash, Some(compute_checksum(&changed)));
    assert_eq!(
        std::fs::read(ws.dirs().recipe_path("alpha")).unwrap(),
        changed
    );
}

#[tokio::test]
async fn test_failed_build_keeps_previous_record() {
    let (ws, backend, index) = setup();
    let engine = engine(&ws, ws.settings(vec![target("alpha")], 1), Arc::clone(&backend), index);
    engine.run_once(&[]).await.unwrap();

    let changed = b"pkgname=alpha\npkgver=2\npkgrel=1\n";
    backend.set_recipe("alpha", changed);
    backend.fail_build("alpha");

    let failed = engine.run_once(&[]).await.unwrap();
    assert_eq!(failed.failed.len(), 1);
    assert!(failed.failed[0].1.starts_with("build"));
    let record = engine.cache().inspect("alpha").unwrap().unwrap();
    assert_eq!(record.content_hash, Some(compute_checksum(RECIPE)));

    // Still broken: the build is attempted again rather than skipped
    let again = engine.run_once(&[]).await.unwrap();
    assert_eq!(again.failed.len(), 1);

    backend.clear_failure("alpha");
    let fixed = engine.run_once(&[]).await.unwrap();
    assert_eq!(fixed.built, vec!["alpha"]);
    assert_eq!(backend.builds(), 4);
    let record = engine.cache().inspect("alpha").unwrap().unwrap();
    assert!(record.matches(&compute_checksum(changed)));
}

#[tokio::test]
async fn test_forget_forces_rebuild() {
    let (ws, backend, index) = setup();
    let engine = engine(&ws, ws.settings(vec![target("alpha")], 1), Arc::clone(&backend), index);
    engine.run_once(&[]).await.unwrap();

    assert!(engine.cache().forget("alpha").unwrap());
    assert!(!engine.cache().forget("alpha").unwrap());

    let report = engine.run_once(&[]).await.unwrap();
    assert_eq!(report.built, vec!["alpha"]);
    assert_eq!(backend.builds(), 2);
}

#[tokio::test]
async fn test_records_survive_restart() {
    let (ws, backend, index) = setup();
    {
        let engine = engine(&ws, ws.settings(vec![target("alpha")], 1), Arc::clone(&backend), index);
        engine.run_once(&[]).await.unwrap();
    }

    let restarted = Arc::new(FakeBackend::new(ws.dirs()));
    restarted.set_recipe("alpha", RECIPE);
    let engine = engine(
        &ws,
        ws.settings(vec![target("alpha")], 1),
        Arc::clone(&restarted),
        Arc::new(RecordingIndex::default()),
    );

    let report = engine.run_once(&[]).await.unwrap();
    assert_eq!(report.skipped, vec!["alpha"]);
    assert_eq!(restarted.builds(), 0);
    assert_eq!(
        engine.cache().inspect("alpha").unwrap().unwrap().outcome,
        Outcome::Success
    );
}

#[tokio::test]
async fn test_corrupt_marker_triggers_rebuild() {
    let (ws, backend, index) = setup();
    let engine = engine(&ws, ws.settings(vec![target("alpha")], 1), Arc::clone(&backend), index);
    engine.run_once(&[]).await.unwrap();

    std::fs::write(ws.dirs().marker_path("alpha"), b"{not json").unwrap();

    let report = engine.run_once(&[]).await.unwrap();
    assert_eq!(report.built, vec!["alpha"]);
    assert_eq!(backend.builds(), 2);
}

#[tokio::test]
async fn test_environment_synced_only_when_needed() {
    let (ws, backend, index) = setup();
    let engine = engine(&ws, ws.settings(vec![target("alpha")], 1), Arc::clone(&backend), index);

    engine.run_once(&[]).await.unwrap();
    engine.run_once(&[]).await.unwrap();
    assert_eq!(backend.syncs(), 1);

    backend.set_recipe("alpha", b"pkgname=alpha\npkgver=3\n");
    engine.run_once(&[]).await.unwrap();
    assert_eq!(backend.syncs(), 2);
}

#[tokio::test]
async fn test_retry_after_failed_change_syncs_environment() {
    let (ws, backend, index) = setup();
    let engine = engine(&ws, ws.settings(vec![target("alpha")], 1), Arc::clone(&backend), index);
    engine.run_once(&[]).await.unwrap();
    assert_eq!(backend.syncs(), 1);

    backend.set_recipe("alpha", b"pkgname=alpha\npkgver=2\n");
    backend.fail_build("alpha");
    assert_eq!(engine.run_once(&[]).await.unwrap().failed.len(), 1);
    assert_eq!(backend.syncs(), 2);

    // The recipe file is already current, but no success matches it yet
    backend.clear_failure("alpha");
    let retry = engine.run_once(&[]).await.unwrap();
    assert_eq!(retry.built, vec!["alpha"]);
    assert_eq!(backend.syncs(), 3);
    assert_eq!(backend.builds(), 3);
}
