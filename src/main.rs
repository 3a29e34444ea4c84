use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Extension, Router};
use tower_http::services::ServeDir;

use gatekeeper_server::error::AppErr;
use gatekeeper_server::limiter;
use gatekeeper_server::routes;
use gatekeeper_server::state::AppState;
use gatekeeper_server::store::Store;
use gatekeeper_server::utils::token::AccessTokenIssuer;

#[tokio::main]
async fn main() -> Result<(), AppErr> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().init();

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(4000);
    let issuer = Arc::new(AccessTokenIssuer::new(
        std::env::var("MEDIA_API_KEY")?,
        std::env::var("MEDIA_API_SECRET")?,
        std::env::var("MEDIA_SERVER_URL")?,
    ));
    let store = Store::new(std::env::var("ROOMS_FILE").unwrap_or_else(|_| "rooms.json".into()));
    let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "static".into());

    let loaded = store.load().await;
    tracing::info!(rooms = loaded.len(), "room snapshot loaded");
    let state = AppState::new(store, issuer, loaded);

    tokio::spawn(limiter::sweep(state.limiter.clone()));

    let app = Router::new()
        .merge(routes::router())
        .fallback_service(ServeDir::new(static_dir))
        .layer(Extension(state));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "admission server listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
