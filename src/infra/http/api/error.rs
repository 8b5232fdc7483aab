use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::analytics::AnalyticsError;
use crate::application::auth::AuthError;
use crate::application::blogs::BlogError;
use crate::application::cdn::CdnError;
use crate::application::error::ErrorReport;
use crate::application::repos::RepoError;
use crate::cache::CacheError;
use crate::domain::error::DomainError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const FORBIDDEN: &str = "forbidden";
    pub const NOT_FOUND: &str = "not_found";
    pub const DUPLICATE: &str = "duplicate";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const INTEGRITY: &str = "integrity_error";
    pub const DB_TIMEOUT: &str = "db_timeout";
    pub const REPO: &str = "repo_error";
    pub const CACHE: &str = "cache_error";
    pub const CDN: &str = "cdn_error";
    pub const INTERNAL: &str = "internal_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    detail: Option<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
            detail: None,
        }
    }

    /// Diagnostic kept out of the response body and only logged.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            codes::UNAUTHORIZED,
            "Admin key required",
            None,
        )
    }

    pub fn forbidden(hint: Option<String>) -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            codes::FORBIDDEN,
            "Admin key rejected",
            hint,
        )
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, None)
    }

    pub fn internal(message: &'static str) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL,
            message,
            None,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let diagnostic = self
            .detail
            .clone()
            .or_else(|| self.hint.clone())
            .unwrap_or_else(|| self.message.to_string());
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message(
            "infra::http::api",
            self.status,
            format!("{}: {diagnostic}", self.code),
        )
        .attach(&mut response);
        response
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Duplicate { constraint } => ApiError::new(
                StatusCode::CONFLICT,
                codes::DUPLICATE,
                "Duplicate record",
                Some(constraint),
            ),
            RepoError::NotFound => ApiError::not_found("Resource not found"),
            RepoError::InvalidInput { message } => ApiError::new(
                StatusCode::BAD_REQUEST,
                codes::INVALID_INPUT,
                "Invalid input",
                Some(message),
            ),
            RepoError::Integrity { message } => ApiError::new(
                StatusCode::CONFLICT,
                codes::INTEGRITY,
                "Integrity constraint violated",
                Some(message),
            ),
            RepoError::Timeout => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::DB_TIMEOUT,
                "Database timeout",
                None,
            ),
            RepoError::Persistence(message) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::REPO,
                "Persistence error",
                None,
            )
            .with_detail(message),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound { entity, id } => {
                ApiError::not_found("Resource not found").with_detail(format!("{entity} `{id}`"))
            }
            DomainError::Validation { message } => ApiError::new(
                StatusCode::BAD_REQUEST,
                codes::INVALID_INPUT,
                "Invalid input",
                Some(message),
            ),
            DomainError::Invariant { message } => {
                ApiError::internal("Internal error").with_detail(message)
            }
        }
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::FetchFailed(source) => {
                // Compute errors arrive boxed.
                match source.downcast::<RepoError>() {
                    Ok(repo) => ApiError::from(*repo),
                    Err(other) => ApiError::new(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        codes::CACHE,
                        "Failed to load listing",
                        None,
                    )
                    .with_detail(other.to_string()),
                }
            }
            CacheError::ProducerUnavailable { key, attempts } => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::CACHE,
                "Listing temporarily unavailable",
                None,
            )
            .with_detail(format!("{key} after {attempts} attempt(s)")),
            CacheError::RandomSourceUnavailable(reason) => {
                ApiError::internal("Secure random source unavailable").with_detail(reason)
            }
        }
    }
}

impl From<BlogError> for ApiError {
    fn from(err: BlogError) -> Self {
        match err {
            BlogError::Domain(err) => err.into(),
            BlogError::Repo(err) => err.into(),
            BlogError::Cache(err) => err.into(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials => ApiError::unauthorized(),
            AuthError::SudoDisabled => {
                ApiError::forbidden(Some("admin access is not configured".to_string()))
            }
            AuthError::InvalidCredentials => ApiError::forbidden(None),
            AuthError::MissingToken | AuthError::TokenMismatch | AuthError::TokenRejected => {
                ApiError::new(
                    StatusCode::FORBIDDEN,
                    codes::FORBIDDEN,
                    "Session rejected",
                    Some(err.to_string()),
                )
            }
            AuthError::Token(err) => err.into(),
        }
    }
}

impl From<AnalyticsError> for ApiError {
    fn from(err: AnalyticsError) -> Self {
        match err {
            AnalyticsError::Domain(err) => err.into(),
            AnalyticsError::Repo(err) => err.into(),
        }
    }
}

impl From<CdnError> for ApiError {
    fn from(err: CdnError) -> Self {
        match err {
            CdnError::EmptyRequest => {
                ApiError::bad_request("No paths to purge", Some(err.to_string()))
            }
            CdnError::NotConfigured => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::CDN,
                "CDN purging is not configured",
                None,
            ),
            CdnError::Rejected(detail) | CdnError::Transport(detail) => ApiError::new(
                StatusCode::BAD_GATEWAY,
                codes::CDN,
                "CDN purge failed",
                None,
            )
            .with_detail(detail),
        }
    }
}
