//! Snapshot persistence for the room map.
//!
//! The whole mapping is rewritten after every mutation; room counts are
//! small enough that an append log would be overkill. The write goes to a
//! sibling tmp file first and is renamed into place, so a crash mid-write
//! can never leave a truncated snapshot behind.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use tokio::fs;
use tracing::{info, warn};

use crate::room::Room;

pub type RoomSnapshot = HashMap<String, Room>;

#[derive(Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the snapshot once at startup. A missing or unreadable file is
    /// not fatal: the server starts with an empty map and logs why.
    pub async fn load(&self) -> RoomSnapshot {
        match fs::read_to_string(&self.path).await {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(rooms) => rooms,
                Err(e) => {
                    warn!(path = %self.path.display(), "snapshot unreadable, starting empty: {e}");
                    RoomSnapshot::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no snapshot yet, starting empty");
                RoomSnapshot::new()
            }
            Err(e) => {
                warn!(path = %self.path.display(), "snapshot unreadable, starting empty: {e}");
                RoomSnapshot::new()
            }
        }
    }

    /// Replace the on-disk snapshot: write tmp, then rename over the target.
    pub async fn save(&self, rooms: &RoomSnapshot) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(rooms).map_err(std::io::Error::from)?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &json).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("rooms.json"));

        let mut rooms = RoomSnapshot::new();
        let mut room = Room::default();
        room.request_join("alice");
        room.request_join("bob");
        rooms.insert("standup".into(), room);

        store.save(&rooms).await.unwrap();
        let loaded = store.load().await;
        let standup = &loaded["standup"];
        assert!(standup.is_host("alice"));
        assert_eq!(standup.waiting, vec!["bob"]);
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("rooms.json"));
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rooms.json");
        fs::write(&path, b"{not json").await.unwrap();
        let store = Store::new(path);
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn save_leaves_no_tmp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rooms.json");
        let store = Store::new(path.clone());
        store.save(&RoomSnapshot::new()).await.unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }
}
