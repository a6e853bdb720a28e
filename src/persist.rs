//! Compressed snapshot persistence (spec §4.5).
//!
//! One file per room, `{roomId}.gz`, holding gzip-wrapped JSON
//! `{events, created}`. Writes go to a `.tmp` sibling and are renamed into
//! place, so a crash mid-write never leaves a half-written snapshot on
//! disk (spec §9, "prefer write-new-then-rename"). Persistence is
//! best-effort: load failures for one room are logged and skipped rather
//! than aborting startup.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::crdt::Operation;

#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedRoom {
    pub events: Vec<Operation>,
    pub created: u64,
}

fn room_path(dir: &Path, room_id: &str) -> std::path::PathBuf {
    dir.join(format!("{room_id}.gz"))
}

/// Serializes `events` to gzip-wrapped JSON and installs it atomically.
pub fn save_room(dir: &Path, room_id: &str, events: &[Operation], created: u64) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let snapshot = PersistedRoom {
        events: events.to_vec(),
        created,
    };
    let json = serde_json::to_vec(&snapshot)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let final_path = room_path(dir, room_id);
    let tmp_path = dir.join(format!("{room_id}.gz.tmp"));

    {
        let file = fs::File::create(&tmp_path)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(&json)?;
        encoder.finish()?;
    }

    fs::rename(&tmp_path, &final_path)
}

pub fn load_room(dir: &Path, room_id: &str) -> std::io::Result<PersistedRoom> {
    let file = fs::File::open(room_path(dir, room_id))?;
    let mut decoder = GzDecoder::new(file);
    let mut json = Vec::new();
    decoder.read_to_end(&mut json)?;
    serde_json::from_slice(&json).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

pub fn delete_room(dir: &Path, room_id: &str) -> std::io::Result<()> {
    match fs::remove_file(room_path(dir, room_id)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Restores every `{roomId}.gz` file under `dir` into `(room_id, snapshot)`
/// pairs. A room whose file fails to read or parse is logged and skipped
/// — one corrupt snapshot must not block the rest of the registry from
/// coming back up.
pub fn load_all(dir: &Path) -> Vec<(String, PersistedRoom)> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut rooms = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(room_id) = file_name.strip_suffix(".gz") else {
            continue;
        };
        match load_room(dir, room_id) {
            Ok(snapshot) => rooms.push((room_id.to_string(), snapshot)),
            Err(e) => warn!(room_id, error = %e, "failed to restore persisted room, skipping"),
        }
    }
    rooms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::GlobalId;

    #[test]
    fn round_trips_through_gzip_json() {
        let dir = tempdir();
        let events = vec![Operation::Insert {
            gid: GlobalId::new(1, 1),
            char: 'a',
            after_gid: None,
        }];
        save_room(dir.path(), "abc123", &events, 1000).unwrap();

        let restored = load_room(dir.path(), "abc123").unwrap();
        assert_eq!(restored.events, events);
        assert_eq!(restored.created, 1000);
    }

    #[test]
    fn load_all_skips_unreadable_files_without_failing() {
        let dir = tempdir();
        fs::write(dir.path().join("garbage.gz"), b"not gzip at all").unwrap();
        save_room(dir.path(), "good", &[], 1).unwrap();

        let rooms = load_all(dir.path());
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].0, "good");
    }

    #[test]
    fn delete_room_is_idempotent() {
        let dir = tempdir();
        save_room(dir.path(), "r", &[], 1).unwrap();
        delete_room(dir.path(), "r").unwrap();
        delete_room(dir.path(), "r").unwrap();
        assert!(load_room(dir.path(), "r").is_err());
    }

    /// Minimal scratch-directory helper so tests don't depend on an extra
    /// dev-dependency just for temp dirs.
    struct TempDir(std::path::PathBuf);
    impl TempDir {
        fn path(&self) -> &Path {
            &self.0
        }
    }
    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }
    fn tempdir() -> TempDir {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut path = std::env::temp_dir();
        path.push(format!("collabpad-persist-test-{}-{n}", std::process::id()));
        fs::create_dir_all(&path).unwrap();
        TempDir(path)
    }
}
