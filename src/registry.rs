//! Room Registry (spec §4.4): the process-wide name → Room directory.
//!
//! This is the only piece of global mutable state in the process — every
//! other component reaches a Room only through a `RoomHandle` obtained
//! here, never by holding the directory itself (mirrors the teacher's
//! single `Node` owning all `Peer` state, generalized to many rooms).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::Settings;
use crate::error::{RoomError, RoomNotFoundSnafu};
use crate::hub::RoomHandle;
use crate::persist;
use snafu::OptionExt;

const ROOM_ID_LEN: usize = 8;

pub struct Registry {
    settings: Arc<Settings>,
    rooms: RwLock<HashMap<String, RoomHandle>>,
}

impl Registry {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            settings,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Restores every persisted room from `persist_dir`, spawning a hub
    /// for each one ahead of accepting connections.
    pub async fn restore(&self) {
        let restored = persist::load_all(&self.settings.persist_dir);
        let mut rooms = self.rooms.write().await;
        for (room_id, snapshot) in restored {
            info!(room_id = %room_id, ops = snapshot.events.len(), "restoring persisted room");
            let handle = self.spawn_room(room_id.clone(), Some((snapshot.events, snapshot.created)));
            rooms.insert(room_id, handle);
        }
    }

    /// Creates a brand-new, empty room under a fresh random id.
    pub async fn create(&self) -> String {
        let mut rooms = self.rooms.write().await;
        loop {
            let room_id = random_room_id();
            if rooms.contains_key(&room_id) {
                continue;
            }
            let handle = self.spawn_room(room_id.clone(), None);
            rooms.insert(room_id.clone(), handle);
            return room_id;
        }
    }

    pub async fn get(&self, room_id: &str) -> Result<RoomHandle, RoomError> {
        let rooms = self.rooms.read().await;
        rooms
            .get(room_id)
            .cloned()
            .context(RoomNotFoundSnafu { name: room_id })
    }

    fn spawn_room(&self, room_id: String, restored: Option<(Vec<crate::crdt::Operation>, u64)>) -> RoomHandle {
        crate::hub::spawn(
            room_id,
            self.settings.persist_dir.clone(),
            Duration::from_secs(self.settings.heartbit_interval_secs),
            self.settings.log_bytes_threshold,
            self.settings.greeting.clone(),
            restored,
        )
    }

    /// Sweeps every room for idle/age eviction, dropping evicted rooms from
    /// the directory. Intended to run on a fixed interval for the lifetime
    /// of the process.
    pub async fn sweep(&self) {
        let idle_ttl = Duration::from_secs(self.settings.room_idle_ttl_secs);
        let max_age = Duration::from_secs(self.settings.room_max_age_secs);

        let candidates: Vec<(String, RoomHandle)> = {
            let rooms = self.rooms.read().await;
            rooms.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };

        let mut evicted = Vec::new();
        for (room_id, handle) in candidates {
            if !handle.is_alive() || handle.sweep(idle_ttl, max_age).await {
                evicted.push(room_id);
            }
        }

        if evicted.is_empty() {
            return;
        }
        let mut rooms = self.rooms.write().await;
        for room_id in &evicted {
            rooms.remove(room_id);
            let _ = persist::delete_room(&self.settings.persist_dir, room_id);
            info!(room_id = %room_id, "evicted room");
        }
    }

    /// Snapshots every live room to disk. Used on graceful shutdown.
    pub async fn persist_all(&self) {
        let rooms: Vec<RoomHandle> = self.rooms.read().await.values().cloned().collect();
        for handle in rooms {
            if let Some((events, created)) = handle.snapshot().await {
                if let Err(e) = persist::save_room(&self.settings.persist_dir, &handle.name, &events, created) {
                    tracing::warn!(room_id = %handle.name, error = %e, "failed to persist room on shutdown");
                }
            }
        }
    }
}

fn random_room_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ROOM_ID_LEN)
        .map(char::from)
        .collect()
}
