use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tokio::sync::{Mutex, RwLock};

use crate::fanout::Fanout;
use crate::limiter::RateLimiter;
use crate::room::Room;
use crate::store::{RoomSnapshot, Store};
use crate::utils::token::CredentialIssuer;

/// One async mutex per room: mutations to the same room serialize, rooms
/// never contend with each other. The outer map lock is only held long
/// enough to fetch, insert or remove an entry.
pub type RoomHandle = Arc<Mutex<Room>>;
pub type RoomMap = Arc<RwLock<HashMap<String, RoomHandle>>>;

/// Process-scoped shared state; cheap to clone, handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub rooms: RoomMap,
    pub fanout: Fanout,
    pub limiter: RateLimiter,
    pub store: Store,
    pub issuer: Arc<dyn CredentialIssuer>,
    /// False after a failed snapshot write; reported by the health check.
    pub persist_ok: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(store: Store, issuer: Arc<dyn CredentialIssuer>, loaded: RoomSnapshot) -> Self {
        let rooms: HashMap<String, RoomHandle> = loaded
            .into_iter()
            .map(|(name, room)| (name, Arc::new(Mutex::new(room))))
            .collect();
        Self {
            rooms: Arc::new(RwLock::new(rooms)),
            fanout: Fanout::default(),
            limiter: RateLimiter::default(),
            store,
            issuer,
            persist_ok: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Get-or-create: referencing an unknown room name brings it into
    /// existence with empty state.
    pub async fn room(&self, name: &str) -> RoomHandle {
        if let Some(handle) = self.rooms.read().await.get(name) {
            return handle.clone();
        }
        let mut rooms = self.rooms.write().await;
        rooms.entry(name.to_owned()).or_default().clone()
    }

    pub async fn lookup(&self, name: &str) -> Option<RoomHandle> {
        self.rooms.read().await.get(name).cloned()
    }

    pub async fn remove_room(&self, name: &str) {
        self.rooms.write().await.remove(name);
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Clone the full room map for persistence. Each room lock is held
    /// only for the clone.
    pub async fn snapshot(&self) -> RoomSnapshot {
        let rooms = self.rooms.read().await;
        let mut out = RoomSnapshot::with_capacity(rooms.len());
        for (name, handle) in rooms.iter() {
            let room = handle.lock().await;
            if room.deleted {
                continue;
            }
            out.insert(name.clone(), room.clone());
        }
        out
    }

    /// Write the snapshot after a mutation. Best-effort durability: a
    /// failed write is logged and flagged, never surfaced to the caller.
    pub async fn persist(&self) {
        let snapshot = self.snapshot().await;
        match self.store.save(&snapshot).await {
            Ok(()) => self.persist_ok.store(true, Ordering::Relaxed),
            Err(e) => {
                tracing::warn!("room snapshot write failed: {e}");
                self.persist_ok.store(false, Ordering::Relaxed);
            }
        }
    }
}
