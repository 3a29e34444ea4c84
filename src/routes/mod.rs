use axum::Router;

pub mod admission;
pub mod ws;

pub fn router() -> Router {
    Router::new()
        .nest("/api", admission::router())
        .nest("/ws", ws::router())
}
