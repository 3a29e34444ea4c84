//! The per-request unit of work: lock the room, apply the transition,
//! push events to the right audience, persist the snapshot.
//!
//! Events are published while the room lock is still held, so the order
//! any single subscriber sees matches the order mutations were applied.
//! Each loop below re-fetches the room handle when it finds the `deleted`
//! marker: the entry was torn down between the map lookup and the lock.

use crate::error::AppResult;
use crate::fanout::RoomEvent;
use crate::room::{JoinOutcome, Succession};
use crate::state::AppState;
use crate::utils::token::{Capabilities, Credential};

pub enum JoinReply {
    Joined { is_host: bool, credential: Credential },
    Waiting,
    Rejected,
}

pub async fn request_join(state: &AppState, room_name: &str, identity: &str) -> AppResult<JoinReply> {
    loop {
        let handle = state.room(room_name).await;
        let mut room = handle.lock().await;
        if room.deleted {
            continue;
        }
        let (reply, dirty) = match room.request_join(identity) {
            JoinOutcome::JoinedHost => {
                tracing::info!(room = room_name, host = identity, "room opened");
                let credential =
                    state.issuer.issue(room_name, identity, Capabilities::participant())?;
                (JoinReply::Joined { is_host: true, credential }, true)
            }
            JoinOutcome::Rejoined { is_host } => {
                let credential =
                    state.issuer.issue(room_name, identity, Capabilities::participant())?;
                (JoinReply::Joined { is_host, credential }, false)
            }
            JoinOutcome::Rejected => (JoinReply::Rejected, false),
            JoinOutcome::Waiting { newly_added } => {
                if newly_added {
                    state
                        .fanout
                        .publish_to_identities(
                            room_name,
                            &room.moderators(),
                            RoomEvent::WaitingUpdate { waiting: room.waiting.clone() },
                        )
                        .await;
                }
                (JoinReply::Waiting, newly_added)
            }
        };
        drop(room);
        if dirty {
            state.persist().await;
        }
        return Ok(reply);
    }
}

/// Read-only classification for clients polling over plain HTTP.
pub async fn waiting_status(state: &AppState, room_name: &str, identity: &str) -> AppResult<JoinReply> {
    loop {
        let handle = state.room(room_name).await;
        let room = handle.lock().await;
        if room.deleted {
            continue;
        }
        return if room.is_host(identity) || room.is_approved(identity) {
            let credential = state.issuer.issue(room_name, identity, Capabilities::participant())?;
            Ok(JoinReply::Joined { is_host: room.is_host(identity), credential })
        } else if room.is_rejected(identity) {
            Ok(JoinReply::Rejected)
        } else {
            Ok(JoinReply::Waiting)
        };
    }
}

pub async fn waiting_list(state: &AppState, room_name: &str) -> Vec<String> {
    let handle = state.room(room_name).await;
    let room = handle.lock().await;
    room.waiting.clone()
}

pub async fn admit(state: &AppState, room_name: &str, identity: &str) -> AppResult<()> {
    loop {
        let handle = state.room(room_name).await;
        let mut room = handle.lock().await;
        if room.deleted {
            continue;
        }
        if !room.is_waiting(identity) {
            return Ok(()); // duplicate or racing admit, nothing to do
        }
        let credential = state.issuer.issue(room_name, identity, Capabilities::participant())?;
        room.admit(identity);
        tracing::info!(room = room_name, participant = identity, "admitted");
        state
            .fanout
            .publish_to_identity(
                room_name,
                identity,
                RoomEvent::Admitted {
                    token: credential.token,
                    server_url: credential.server_url,
                },
            )
            .await;
        publish_waiting(state, room_name, &room).await;
        drop(room);
        state.persist().await;
        return Ok(());
    }
}

pub async fn reject(state: &AppState, room_name: &str, identity: &str) -> AppResult<()> {
    loop {
        let handle = state.room(room_name).await;
        let mut room = handle.lock().await;
        if room.deleted {
            continue;
        }
        if !room.reject(identity) {
            return Ok(());
        }
        tracing::info!(room = room_name, participant = identity, "rejected");
        state
            .fanout
            .publish_to_identity(room_name, identity, RoomEvent::Rejected)
            .await;
        publish_waiting(state, room_name, &room).await;
        drop(room);
        state.persist().await;
        return Ok(());
    }
}

pub async fn promote_co_host(state: &AppState, room_name: &str, identity: &str) -> AppResult<()> {
    loop {
        let handle = state.room(room_name).await;
        let mut room = handle.lock().await;
        if room.deleted {
            continue;
        }
        if !room.promote(identity) {
            return Ok(());
        }
        tracing::info!(room = room_name, participant = identity, "promoted to co-host");
        publish_roles(state, room_name, &room).await;
        drop(room);
        state.persist().await;
        return Ok(());
    }
}

pub async fn remove_co_host(state: &AppState, room_name: &str, identity: &str) -> AppResult<()> {
    loop {
        let handle = state.room(room_name).await;
        let mut room = handle.lock().await;
        if room.deleted {
            continue;
        }
        if !room.demote(identity) {
            return Ok(());
        }
        tracing::info!(room = room_name, participant = identity, "co-host removed");
        publish_roles(state, room_name, &room).await;
        drop(room);
        state.persist().await;
        return Ok(());
    }
}

/// Voluntary departure. Only the host's departure changes room state:
/// either the first co-host takes over, or the room is torn down.
pub async fn room_ended(state: &AppState, room_name: &str, identity: &str) -> AppResult<()> {
    let Some(handle) = state.lookup(room_name).await else {
        return Ok(());
    };
    let mut room = handle.lock().await;
    if room.deleted || !room.is_host(identity) {
        return Ok(());
    }
    match room.host_departed() {
        Succession::Promoted(next) => {
            tracing::info!(room = room_name, new_host = %next, "host departed, co-host takes over");
            publish_roles(state, room_name, &room).await;
            drop(room);
            state.persist().await;
        }
        Succession::Deleted => {
            tracing::info!(room = room_name, "host departed, room closed");
            room.deleted = true;
            state
                .fanout
                .publish_to_room(
                    room_name,
                    RoomEvent::RoleUpdate { host: None, co_hosts: Vec::new() },
                )
                .await;
            drop(room);
            state.remove_room(room_name).await;
            state.fanout.drop_room(room_name).await;
            state.persist().await;
        }
    }
    Ok(())
}

async fn publish_waiting(state: &AppState, room_name: &str, room: &crate::room::Room) {
    state
        .fanout
        .publish_to_identities(
            room_name,
            &room.moderators(),
            RoomEvent::WaitingUpdate { waiting: room.waiting.clone() },
        )
        .await;
}

async fn publish_roles(state: &AppState, room_name: &str, room: &crate::room::Room) {
    state
        .fanout
        .publish_to_room(
            room_name,
            RoomEvent::RoleUpdate {
                host: room.host_identity.clone(),
                co_hosts: room.co_hosts.clone(),
            },
        )
        .await;
}
