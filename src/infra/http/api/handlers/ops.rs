use std::collections::BTreeMap;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::warn;

use super::super::error::ApiError;
use super::super::models::{
    ComponentHealth, HealthResponse, PurgeCacheRequest, PurgeCacheResponse, VersionResponse,
};
use super::super::state::ApiState;

pub async fn purge_cache(
    State(state): State<ApiState>,
    Json(payload): Json<PurgeCacheRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let purged = state.cdn.purge(payload.paths).await?;
    Ok(Json(PurgeCacheResponse { purged }))
}

pub async fn purge_all_cache(State(state): State<ApiState>) -> StatusCode {
    state.blogs.purge_listing_cache();
    StatusCode::NO_CONTENT
}

pub async fn healthz(State(state): State<ApiState>) -> impl IntoResponse {
    let database = match state.health.ping().await {
        Ok(()) => ComponentHealth::ok(),
        Err(err) => {
            warn!(
                target: "folio::http::api::health",
                error = %err,
                "database ping failed"
            );
            ComponentHealth::failed(err.to_string())
        }
    };

    let healthy = database.is_ok();
    let mut components = BTreeMap::new();
    components.insert("database", database);

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        components,
    };
    (status, Json(body))
}

pub async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
    })
}
