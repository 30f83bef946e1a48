//! HTTP application wiring (axum router + services).
//!
//! - `services.rs`: signing key, directories, ticket store, orchestrator
//! - `routes/`: handlers, one file per area
//! - `dto.rs`: request/response bodies
//! - `response.rs`: the `{message, code, data}` envelope
//! - `errors.rs`: error envelopes and HTTP status mapping

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub mod dto;
pub mod errors;
pub mod extract;
pub mod response;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(services: Arc<AppServices>) -> Router {
    let api = routes::router(&services);

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(Extension(services)),
        )
}
