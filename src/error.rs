use axum::{http::{header, StatusCode}, response::IntoResponse, Json};
use serde_json::json;
use std::fmt::Display;

pub type AppResult<T> = Result<T, AppErr>;

#[derive(thiserror::Error, Debug)]
pub enum AppErr {
    #[error("Bad request: {0}")]
    Bad(String),

    /// Caller exceeded its rate-limit budget; payload is the retry hint in seconds.
    #[error("rate limit exceeded, retry in {0}s")]
    Throttled(u64),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("env: {0}")]
    Env(#[from] std::env::VarError),

    #[error("credential: {0}")]
    Credential(#[from] jsonwebtoken::errors::Error),
}

impl IntoResponse for AppErr {
    fn into_response(self) -> axum::response::Response {
        match self {
            AppErr::Bad(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            AppErr::Throttled(secs) => (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, secs.to_string())],
                Json(json!({ "error": "rate limit exceeded", "retryAfterSecs": secs })),
            )
                .into_response(),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response(),
        }
    }
}

/* ── helper: fold any error into Bad ── */
pub fn bad<E: Display>(e: E) -> AppErr {
    AppErr::Bad(e.to_string())
}
