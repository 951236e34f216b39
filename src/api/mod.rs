//! API module
//!
//! Operator HTTP surface: health, dead letters and outbox backlog.

pub mod middleware;
pub mod routes;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::store::Store;

pub use routes::{create_router, AppState};

/// Build the full application router
pub fn build_router<S: Store>(state: AppState<S>) -> Router {
    let api_router = create_router::<S>().layer(axum::middleware::from_fn(
        middleware::logging_middleware,
    ));

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/api/v1", api_router)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
