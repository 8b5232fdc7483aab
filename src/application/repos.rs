//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::analytics::{AnalyticsEvent, EventFilter};
use crate::domain::blogs::{Blog, ListingQuery};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Row as stored; `views` is filled in separately.
#[derive(Debug, Clone, PartialEq)]
pub struct BlogRecord {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub prequel_id: Option<String>,
    pub sequel_id: Option<String>,
    pub parts: Vec<String>,
}

impl BlogRecord {
    pub fn into_blog(self, views: u64) -> Blog {
        Blog {
            id: self.id,
            title: self.title,
            summary: self.summary,
            created_at: self.created_at,
            updated_at: self.updated_at,
            prequel_id: self.prequel_id,
            sequel_id: self.sequel_id,
            parts: self.parts,
            views,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateBlogParams {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub prequel_id: Option<String>,
    pub sequel_id: Option<String>,
    pub parts: Vec<String>,
    pub created_at: OffsetDateTime,
}

#[async_trait]
pub trait BlogsRepo: Send + Sync {
    async fn list_blogs(&self, query: &ListingQuery) -> Result<Vec<BlogRecord>, RepoError>;

    async fn count_blogs(&self) -> Result<u64, RepoError>;

    async fn find_blog(&self, id: &str) -> Result<Option<BlogRecord>, RepoError>;

    async fn create_blog(&self, params: CreateBlogParams) -> Result<BlogRecord, RepoError>;
}

#[async_trait]
pub trait AnalyticsRepo: Send + Sync {
    async fn record_event(&self, event: &AnalyticsEvent) -> Result<(), RepoError>;

    /// Page views recorded for URLs that reference the blog.
    async fn page_views(&self, blog_id: &str) -> Result<u64, RepoError>;

    /// Events at or after `filter.since`, oldest first.
    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<AnalyticsEvent>, RepoError>;
}

#[async_trait]
pub trait HealthRepo: Send + Sync {
    async fn ping(&self) -> Result<(), RepoError>;
}
