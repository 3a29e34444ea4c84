//! routes/admission.rs
//!
//! The HTTP request surface over the admission core: camelCase JSON
//! bodies, `status` strings `joined | waiting | rejected`.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;

use axum::{
    extract::{ConnectInfo, Extension, Query},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    admission::{self, JoinReply},
    error::{bad, AppErr, AppResult},
    limiter::{self, RouteClass},
    state::AppState,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoomIdentity {
    room_name: Option<String>,
    participant_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoomOnly {
    room_name: Option<String>,
}

pub fn router() -> Router {
    Router::new()
        .route("/request-join", post(request_join))
        .route("/waiting-status", get(waiting_status))
        .route("/waiting-list", get(waiting_list))
        .route("/admit", post(admit))
        .route("/reject", post(reject))
        .route("/promote-cohost", post(promote_co_host))
        .route("/remove-cohost", post(remove_co_host))
        .route("/room-ended", post(room_ended))
        .route("/health", get(health))
}

async fn throttle(state: &AppState, class: RouteClass, addr: SocketAddr) -> AppResult<()> {
    state
        .limiter
        .check(class, addr.ip())
        .await
        .map_err(|retry| AppErr::Throttled(retry.as_secs().max(1)))
}

fn required(value: Option<String>, field: &str) -> AppResult<String> {
    match value {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(bad(format!("{field} is required"))),
    }
}

fn join_reply_json(reply: JoinReply) -> Value {
    match reply {
        JoinReply::Joined { is_host, credential } => json!({
            "status": "joined",
            "isHost": is_host,
            "token": credential.token,
            "serverUrl": credential.server_url,
        }),
        JoinReply::Waiting => json!({ "status": "waiting" }),
        JoinReply::Rejected => json!({ "status": "rejected" }),
    }
}

/* ---------------- join / poll ---------------- */
async fn request_join(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(state): Extension<AppState>,
    Json(p): Json<RoomIdentity>,
) -> AppResult<Json<Value>> {
    throttle(&state, limiter::JOIN, addr).await?;
    let room = required(p.room_name, "roomName")?;
    let who = required(p.participant_name, "participantName")?;
    let reply = admission::request_join(&state, &room, &who).await?;
    Ok(Json(join_reply_json(reply)))
}

async fn waiting_status(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(state): Extension<AppState>,
    Query(p): Query<RoomIdentity>,
) -> AppResult<Json<Value>> {
    throttle(&state, limiter::STATUS, addr).await?;
    let room = required(p.room_name, "roomName")?;
    let who = required(p.participant_name, "participantName")?;
    let reply = admission::waiting_status(&state, &room, &who).await?;
    Ok(Json(join_reply_json(reply)))
}

async fn waiting_list(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(state): Extension<AppState>,
    Query(p): Query<RoomOnly>,
) -> AppResult<Json<Value>> {
    throttle(&state, limiter::STATUS, addr).await?;
    let room = required(p.room_name, "roomName")?;
    let waiting = admission::waiting_list(&state, &room).await;
    Ok(Json(json!({ "waiting": waiting })))
}

/* ---------------- host actions ---------------- */
macro_rules! host_action {
    ($name:ident, $op:path) => {
        async fn $name(
            ConnectInfo(addr): ConnectInfo<SocketAddr>,
            Extension(state): Extension<AppState>,
            Json(p): Json<RoomIdentity>,
        ) -> AppResult<Json<Value>> {
            throttle(&state, limiter::ADMIN, addr).await?;
            let room = required(p.room_name, "roomName")?;
            let who = required(p.participant_name, "participantName")?;
            $op(&state, &room, &who).await?;
            Ok(Json(json!({ "success": true })))
        }
    };
}

host_action!(admit, admission::admit);
host_action!(reject, admission::reject);
host_action!(promote_co_host, admission::promote_co_host);
host_action!(remove_co_host, admission::remove_co_host);
host_action!(room_ended, admission::room_ended);

/* ---------------- health ---------------- */
async fn health(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let status = if state.persist_ok.load(Ordering::Relaxed) { "ok" } else { "degraded" };
    Json(json!({
        "status": status,
        "activeRoomCount": state.room_count().await,
        "liveSubscriberCount": state.fanout.subscriber_count().await,
    }))
}
