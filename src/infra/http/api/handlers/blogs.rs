use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::domain::blogs::{ListingParams, ListingQuery, NewBlog};

use super::super::error::ApiError;
use super::super::models::BlogIdQuery;
use super::super::state::ApiState;

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// `GET /api/blogs`: one listing page, tagged with how the cache served it.
pub async fn list_blogs(
    State(state): State<ApiState>,
    Query(params): Query<ListingParams>,
) -> Result<Response, ApiError> {
    let query = ListingQuery::normalize(params);
    let (page, status) = state.blogs.list(query).await?;

    let mut response = Json(page.as_ref()).into_response();
    response
        .headers_mut()
        .insert(X_CACHE, HeaderValue::from_static(status.as_str()));
    Ok(response)
}

pub async fn get_blog(
    State(state): State<ApiState>,
    Query(query): Query<BlogIdQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let id = query
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing blog id", None))?;

    let blog = state.blogs.get(id.trim()).await?;
    Ok(Json(blog))
}

pub async fn create_blog(
    State(state): State<ApiState>,
    Json(payload): Json<NewBlog>,
) -> Result<impl IntoResponse, ApiError> {
    let blog = state.blogs.create(payload).await?;
    Ok((StatusCode::CREATED, Json(blog)))
}
