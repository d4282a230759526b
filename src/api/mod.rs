pub mod auth;
mod dashboard;
mod devices;
pub mod error;
mod extract;
pub mod response;
mod validation;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

use self::error::ApiError;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public)
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    // Admin-only routes
    let admin_routes = Router::new()
        .route("/auth/users", get(auth::list_users))
        .route("/auth/users/:id", put(auth::update_user))
        .route("/devices", post(devices::create_device))
        .route("/devices/:id", put(devices::update_device))
        .route("/devices/:id/authorize", post(devices::authorize_device))
        .route("/devices/:id/authorize/batch", post(devices::batch_authorize))
        .route_layer(middleware::from_fn(auth::require_admin));

    // Any authenticated user
    let protected_routes = Router::new()
        .route("/auth/profile", get(auth::profile))
        .route("/devices", get(devices::list_devices))
        .route("/dashboard/statistics", get(dashboard::statistics))
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", public_routes.merge(protected_routes))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn not_found() -> ApiError {
    ApiError::not_found("Resource not found")
}
