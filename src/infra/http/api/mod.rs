pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::infra::http::middleware::{log_responses, set_request_context};

pub fn build_api_router(state: ApiState) -> Router {
    let admin = Router::new()
        .route("/api/blog", post(handlers::create_blog))
        .route("/api/sudo", post(handlers::sudo))
        .route("/api/authenticate", post(handlers::authenticate))
        .route("/api/purge_cache", post(handlers::purge_cache))
        .route("/api/purge_all_cache", post(handlers::purge_all_cache))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_sudo,
        ));

    Router::new()
        .route("/api/blogs", get(handlers::list_blogs))
        .route("/api/blog", get(handlers::get_blog))
        .route(
            "/api/analytics",
            post(handlers::record_event).get(handlers::list_events),
        )
        .route("/api/verify_auth", get(handlers::verify_auth))
        .route("/api/logout", post(handlers::logout))
        .route("/api/healthz", get(handlers::healthz))
        .route("/api/version", get(handlers::version))
        .merge(admin)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
