use std::sync::Arc;

use axum::{
    routing::{post, put},
    Router,
};

use crate::app::services::AppServices;
use crate::{authz, middleware};

pub mod apps;
pub mod me;
pub mod sso;
pub mod system;
pub mod users;

/// Everything under `/api/v1`.
pub fn router(services: &Arc<AppServices>) -> Router {
    let public = Router::new()
        .route("/login", post(sso::login))
        .route("/verify", post(sso::verify));

    let session = Router::new()
        .route("/auth", post(sso::auth))
        .route("/me/username", put(me::update_username))
        .route("/me/password", put(me::update_password))
        .route_layer(axum::middleware::from_fn_with_state(
            services.clone(),
            middleware::require_session,
        ));

    // Layers wrap outward: the session check runs before the admin check.
    let admin = users::router()
        .merge(apps::router())
        .route_layer(axum::middleware::from_fn_with_state(services.clone(), authz::require_admin))
        .route_layer(axum::middleware::from_fn_with_state(
            services.clone(),
            middleware::require_session,
        ));

    public.merge(session).merge(admin)
}
