//! HTTP surface of meli-sync.
//!
//! - `/auth/meli/*` and `/auth/logout` — OAuth login flow and cookie sessions
//! - `/questions`, `/orders`         — stored data and on-demand sync
//! - `/notifications`                — sync notifications
//! - `/status`                       — health check

pub mod routes;
pub mod session;

use crate::SharedState;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
