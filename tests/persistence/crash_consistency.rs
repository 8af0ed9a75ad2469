//! Interrupted persists and damaged directories

use crate::common::*;
use ctse::durability::{paths, StorePaths};
use std::fs;

fn persisted_dir() -> (TempDir, u64) {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(disk_config(dir.path())).unwrap();
    scenario(&engine);
    let generation = engine.stats().unwrap().generation;
    engine.close().unwrap();
    (dir, generation)
}

#[test]
fn leftover_staging_directory_is_ignored_and_removed() {
    let (dir, generation) = persisted_dir();
    let staging = dir.path().join("staging-interrupted");
    fs::create_dir(&staging).unwrap();
    fs::write(staging.join("manifest.json"), b"{ half written").unwrap();

    let engine = Engine::open(disk_config(dir.path())).unwrap();
    assert_eq!(engine.stats().unwrap().generation, generation);
    assert_eq!(engine.stats().unwrap().documents, 3);
    assert!(!staging.exists());
}

#[test]
fn unreferenced_snapshot_directory_is_removed() {
    let (dir, generation) = persisted_dir();
    let orphan = StorePaths::from_root(dir.path()).snapshot_dir(generation + 5);
    fs::create_dir(&orphan).unwrap();

    let engine = Engine::open(disk_config(dir.path())).unwrap();
    assert_eq!(engine.stats().unwrap().generation, generation);
    assert!(!orphan.exists());
}

#[test]
fn only_current_snapshot_is_kept_after_persist() {
    let (dir, engine) = disk_engine();
    scenario(&engine);
    engine.ingest(&raw("D", "asthma inhaler trial")).unwrap();

    let snapshots: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| paths::parse_snapshot_dir_name(name).is_some())
        .collect();
    assert_eq!(
        snapshots,
        vec![paths::snapshot_dir_name(engine.stats().unwrap().generation)]
    );
}

#[test]
fn missing_manifest_fails_to_open() {
    let (dir, generation) = persisted_dir();
    let snapshot = StorePaths::from_root(dir.path()).snapshot_dir(generation);
    fs::remove_file(paths::manifest_file(&snapshot)).unwrap();
    assert!(Engine::open(disk_config(dir.path())).is_err());
}

#[test]
fn current_naming_missing_directory_is_corruption() {
    let (dir, _) = persisted_dir();
    let store_paths = StorePaths::from_root(dir.path());
    fs::write(store_paths.current(), format!("{}\n", paths::snapshot_dir_name(999))).unwrap();
    assert!(matches!(
        Engine::open(disk_config(dir.path())),
        Err(CtseError::Corruption(_))
    ));
}

#[test]
fn empty_directory_opens_empty() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(disk_config(dir.path())).unwrap();
    assert_eq!(engine.stats().unwrap().documents, 0);
    assert!(!StorePaths::from_root(dir.path()).current().exists());
}
