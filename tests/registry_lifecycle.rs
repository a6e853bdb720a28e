//! Registry-level behavior: creation produces a live, joinable room;
//! lookups of an unknown room fail; persisted snapshots survive a
//! restart (spec §4.4, §4.5).

use std::sync::Arc;
use std::time::Duration;

use collabpad::config::Settings;
use collabpad::crdt::{GlobalId, Operation};
use collabpad::registry::Registry;

fn tmp_dir(label: &str) -> std::path::PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("collabpad-registry-test-{label}-{}", std::process::id()));
    path
}

fn settings_in(dir: std::path::PathBuf) -> Arc<Settings> {
    Arc::new(Settings {
        persist_dir: dir,
        log_bytes_threshold: usize::MAX,
        ..Settings::default()
    })
}

#[tokio::test]
async fn created_room_is_immediately_joinable_and_empty() {
    let registry = Registry::new(settings_in(tmp_dir("create")));
    let room_id = registry.create().await;

    let handle = registry.get(&room_id).await.expect("just-created room must exist");
    assert!(handle.bootstrap().await.is_empty());
}

#[tokio::test]
async fn unknown_room_is_room_not_found() {
    let registry = Registry::new(settings_in(tmp_dir("missing")));
    assert!(registry.get("does-not-exist").await.is_err());
}

#[tokio::test]
async fn snapshot_and_restore_round_trips_a_rooms_operations() {
    let dir = tmp_dir("restore");
    let registry = Registry::new(settings_in(dir.clone()));
    let cleanup_dir = dir.clone();
    let room_id = registry.create().await;
    let handle = registry.get(&room_id).await.unwrap();

    let op = Operation::Insert {
        gid: GlobalId::new(1, 0),
        char: 'h',
        after_gid: None,
    };
    handle.submit_operations(0, vec![op.clone()]);
    // give the mailbox task a tick to process the fire-and-forget append
    tokio::time::sleep(Duration::from_millis(20)).await;

    registry.persist_all().await;

    let restored = Registry::new(settings_in(dir));
    restored.restore().await;
    let restored_handle = restored.get(&room_id).await.expect("restored room must exist under the same id");
    assert_eq!(restored_handle.bootstrap().await, vec![op]);

    let _ = std::fs::remove_dir_all(cleanup_dir);
}
