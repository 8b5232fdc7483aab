use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use super::error::ApiError;
use super::state::ApiState;

/// Gate admin routes on `Authorization: Bearer <sudo key>`.
pub async fn require_sudo(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let presented = bearer_token(request.headers());

    if let Err(err) = state.auth.verify_sudo(presented.as_deref()) {
        debug!(
            target: "folio::http::api::sudo",
            path = %request.uri().path(),
            "admin check failed"
        );
        return ApiError::from(err).into_response();
    }

    next.run(request).await
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let bearer = raw.strip_prefix("Bearer ")?;
    Some(bearer.to_string())
}
