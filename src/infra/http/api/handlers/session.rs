use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::application::auth::{AuthError, IssuedToken};
use crate::application::error::HttpError;

use super::super::error::ApiError;
use super::super::middleware::bearer_token;
use super::super::models::{TokenResponse, VerifyQuery};
use super::super::state::ApiState;

pub const AUTH_COOKIE: &str = "auth_token";

const SOURCE: &str = "infra::http::api::session";

fn session_cookie(issued: &IssuedToken) -> Cookie<'static> {
    let max_age = i64::try_from(issued.max_age.as_secs()).unwrap_or(i64::MAX);
    Cookie::build((AUTH_COOKIE, issued.token.clone()))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(time::Duration::seconds(max_age))
        .build()
}

/// `POST /api/sudo`: succeeds only for the configured admin key.
pub async fn sudo(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    state.auth.verify_sudo(bearer_token(&headers).as_deref())?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn authenticate(
    State(state): State<ApiState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let issued = state.auth.authenticate(bearer_token(&headers).as_deref())?;
    let jar = jar.add(session_cookie(&issued));
    Ok((
        jar,
        Json(TokenResponse {
            token: issued.token,
        }),
    ))
}

/// `GET /api/verify_auth`: the cookie and the `token` query must name the same
/// live token. Success renews both the store entry and the cookie.
pub async fn verify_auth(
    State(state): State<ApiState>,
    jar: CookieJar,
    Query(query): Query<VerifyQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let cookie_token = jar.get(AUTH_COOKIE).map(|cookie| cookie.value().to_string());

    match state
        .auth
        .verify(cookie_token.as_deref(), query.token.as_deref())
    {
        Ok(issued) => Ok((jar.add(session_cookie(&issued)), "Authorized")),
        Err(err) => {
            let public_message = match err {
                AuthError::MissingToken => "Missing auth token",
                AuthError::TokenMismatch => "Token mismatch",
                AuthError::TokenRejected => "Invalid or expired token",
                _ => "Unauthorized",
            };
            Err(HttpError::from_error(
                SOURCE,
                StatusCode::FORBIDDEN,
                public_message,
                &err,
            ))
        }
    }
}

pub async fn logout(State(state): State<ApiState>, jar: CookieJar) -> impl IntoResponse {
    let token = jar.get(AUTH_COOKIE).map(|cookie| cookie.value().to_string());
    state.auth.logout(token.as_deref());
    let jar = jar.remove(Cookie::build(AUTH_COOKIE).path("/"));
    (jar, StatusCode::NO_CONTENT)
}
