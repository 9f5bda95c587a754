//! HTTP route handlers.

pub mod aggregate;
pub mod health;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Full application router with tracing.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(aggregate::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
