//! Per-room subscriber registry and push event routing.
//!
//! Each subscriber owns a bounded mpsc queue; publishing uses `try_send`
//! so a slow or dead consumer can never stall the mutation that produced
//! the event. A subscriber whose queue is full or closed is dropped from
//! the registry on the spot, not retried.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Outbound queue depth per subscriber. Overflow means the client stopped
/// reading long ago; we disconnect rather than buffer without bound.
pub const QUEUE_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RoomEvent {
    /// Always the first frame after subscribing.
    RoleSnapshot { host: Option<String>, co_hosts: Vec<String> },
    /// Host and co-hosts only; waiting participants never see the list.
    WaitingUpdate { waiting: Vec<String> },
    /// Direct to the admitted identity.
    Admitted { token: String, server_url: String },
    /// Direct to the rejected identity.
    Rejected,
    /// Everyone in the room.
    RoleUpdate { host: Option<String>, co_hosts: Vec<String> },
}

struct Subscriber {
    id: Uuid,
    identity: String,
    tx: mpsc::Sender<RoomEvent>,
}

#[derive(Clone, Default)]
pub struct Fanout {
    rooms: Arc<RwLock<HashMap<String, Vec<Subscriber>>>>,
}

impl Fanout {
    /// Register a live subscriber. A participant holds at most one channel
    /// per room: an earlier registration for the same identity is replaced
    /// (its queue closes, ending the old socket task).
    pub async fn subscribe(&self, room: &str, identity: &str) -> (Uuid, mpsc::Receiver<RoomEvent>) {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let id = Uuid::new_v4();
        let mut rooms = self.rooms.write().await;
        let subs = rooms.entry(room.to_owned()).or_default();
        subs.retain(|s| s.identity != identity);
        subs.push(Subscriber { id, identity: identity.to_owned(), tx });
        (id, rx)
    }

    pub async fn unsubscribe(&self, room: &str, id: Uuid) {
        let mut rooms = self.rooms.write().await;
        if let Some(subs) = rooms.get_mut(room) {
            subs.retain(|s| s.id != id);
            if subs.is_empty() {
                rooms.remove(room);
            }
        }
    }

    pub async fn publish_to_room(&self, room: &str, event: RoomEvent) {
        self.publish_where(room, event, |_| true).await;
    }

    pub async fn publish_to_identity(&self, room: &str, identity: &str, event: RoomEvent) {
        self.publish_where(room, event, |s| s == identity).await;
    }

    pub async fn publish_to_identities(&self, room: &str, targets: &[String], event: RoomEvent) {
        self.publish_where(room, event, |s| targets.iter().any(|t| t == s))
            .await;
    }

    /// Tear down every subscriber of a deleted room.
    pub async fn drop_room(&self, room: &str) {
        self.rooms.write().await.remove(room);
    }

    pub async fn subscriber_count(&self) -> usize {
        self.rooms.read().await.values().map(Vec::len).sum()
    }

    async fn publish_where(&self, room: &str, event: RoomEvent, audience: impl Fn(&str) -> bool) {
        let mut rooms = self.rooms.write().await;
        let Some(subs) = rooms.get_mut(room) else { return };
        subs.retain(|s| {
            if !audience(&s.identity) {
                return true;
            }
            match s.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(room, identity = %s.identity, "dropping subscriber: {e}");
                    false
                }
            }
        });
        if subs.is_empty() {
            rooms.remove(room);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waiting(list: &[&str]) -> RoomEvent {
        RoomEvent::WaitingUpdate { waiting: list.iter().map(|s| s.to_string()).collect() }
    }

    #[tokio::test]
    async fn direct_events_reach_only_their_target() {
        let fanout = Fanout::default();
        let (_, mut alice) = fanout.subscribe("standup", "alice").await;
        let (_, mut bob) = fanout.subscribe("standup", "bob").await;

        fanout.publish_to_identity("standup", "bob", RoomEvent::Rejected).await;

        assert_eq!(bob.try_recv().unwrap(), RoomEvent::Rejected);
        assert!(alice.try_recv().is_err());
    }

    #[tokio::test]
    async fn audience_list_filters_delivery() {
        let fanout = Fanout::default();
        let (_, mut alice) = fanout.subscribe("standup", "alice").await;
        let (_, mut carol) = fanout.subscribe("standup", "carol").await;

        fanout
            .publish_to_identities("standup", &["alice".to_string()], waiting(&["carol"]))
            .await;

        assert_eq!(alice.try_recv().unwrap(), waiting(&["carol"]));
        assert!(carol.try_recv().is_err());
    }

    #[tokio::test]
    async fn room_wide_events_reach_everyone() {
        let fanout = Fanout::default();
        let (_, mut alice) = fanout.subscribe("standup", "alice").await;
        let (_, mut bob) = fanout.subscribe("standup", "bob").await;

        let ev = RoomEvent::RoleUpdate { host: Some("alice".into()), co_hosts: vec![] };
        fanout.publish_to_room("standup", ev.clone()).await;

        assert_eq!(alice.try_recv().unwrap(), ev);
        assert_eq!(bob.try_recv().unwrap(), ev);
    }

    #[tokio::test]
    async fn resubscribe_replaces_previous_channel() {
        let fanout = Fanout::default();
        let (_, mut first) = fanout.subscribe("standup", "alice").await;
        let (_, mut second) = fanout.subscribe("standup", "alice").await;

        assert_eq!(fanout.subscriber_count().await, 1);
        // old channel is closed, new one still receives
        assert!(matches!(first.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));
        fanout.publish_to_room("standup", RoomEvent::Rejected).await;
        assert_eq!(second.try_recv().unwrap(), RoomEvent::Rejected);
    }

    #[tokio::test]
    async fn overflowing_subscriber_is_dropped() {
        let fanout = Fanout::default();
        let (_, _rx) = fanout.subscribe("standup", "alice").await;

        for _ in 0..=QUEUE_DEPTH {
            fanout.publish_to_room("standup", RoomEvent::Rejected).await;
        }
        assert_eq!(fanout.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn drop_room_clears_all_subscribers() {
        let fanout = Fanout::default();
        let (_, mut alice) = fanout.subscribe("standup", "alice").await;
        fanout.drop_room("standup").await;
        assert_eq!(fanout.subscriber_count().await, 0);
        assert!(matches!(alice.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));
    }

    #[test]
    fn events_serialize_camel_case_tagged() {
        let ev = RoomEvent::Admitted { token: "t".into(), server_url: "wss://m".into() };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "admitted");
        assert_eq!(json["serverUrl"], "wss://m");
    }
}
