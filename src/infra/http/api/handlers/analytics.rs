use std::convert::Infallible;
use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, FromRequestParts, Query, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum_extra::extract::cookie::CookieJar;

use crate::application::analytics::ClientOrigin;
use crate::domain::analytics::AnalyticsEvent;

use super::super::error::ApiError;
use super::super::models::AnalyticsQuery;
use super::super::state::ApiState;
use super::session::AUTH_COOKIE;

/// Client address hints gathered from proxy headers and the socket.
pub struct Origin(pub ClientOrigin);

impl<S: Send + Sync> FromRequestParts<S> for Origin {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };

        Ok(Self(ClientOrigin {
            forwarded_for: header("x-forwarded-for"),
            real_ip: header("x-real-ip"),
            peer: parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr),
        }))
    }
}

pub async fn record_event(
    State(state): State<ApiState>,
    Origin(origin): Origin,
    Json(event): Json<AnalyticsEvent>,
) -> Result<StatusCode, ApiError> {
    state.analytics.record(event, &origin).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/analytics`: dashboard feed, readable with a live session cookie.
pub async fn list_events(
    State(state): State<ApiState>,
    jar: CookieJar,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<Vec<AnalyticsEvent>>, ApiError> {
    state
        .auth
        .authorize_session(jar.get(AUTH_COOKIE).map(|cookie| cookie.value()))?;
    let events = state
        .analytics
        .query(query.time_range.as_deref(), query.event_type.as_deref())
        .await?;
    Ok(Json(events))
}
