//! Blog reads and writes, with the listing served through the coalescing cache.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use metrics::counter;
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::application::repos::{AnalyticsRepo, BlogsRepo, CreateBlogParams, RepoError};
use crate::cache::{CacheError, CacheStatus, CoalescingCache, ListingKey};
use crate::domain::blogs::{Blog, BlogsPage, ListingQuery, NewBlog, is_valid_blog_id};
use crate::domain::error::DomainError;

pub const LISTING_CACHE_NAME: &str = "blog_listing";

const METRIC_LISTING_HIT: &str = "folio_listing_cache_hit_total";
const METRIC_LISTING_MISS: &str = "folio_listing_cache_miss_total";
const METRIC_LISTING_WAIT_HIT: &str = "folio_listing_cache_wait_hit_total";

const BLOG_ID_LEN: usize = 7;
const MAX_ID_ATTEMPTS: usize = 3;

pub type ListingCache = CoalescingCache<ListingKey, Arc<BlogsPage>>;

#[derive(Debug, Error)]
pub enum BlogError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Clone)]
pub struct BlogService {
    blogs: Arc<dyn BlogsRepo>,
    analytics: Arc<dyn AnalyticsRepo>,
    listing: Arc<ListingCache>,
    listing_ttl: Duration,
}

impl BlogService {
    pub fn new(
        blogs: Arc<dyn BlogsRepo>,
        analytics: Arc<dyn AnalyticsRepo>,
        listing: Arc<ListingCache>,
        listing_ttl: Duration,
    ) -> Self {
        Self {
            blogs,
            analytics,
            listing,
            listing_ttl,
        }
    }

    pub fn listing_cache(&self) -> &Arc<ListingCache> {
        &self.listing
    }

    /// One listing page, computed at most once per key while it is fresh.
    #[instrument(skip(self), fields(page = query.page, limit = query.limit))]
    pub async fn list(
        &self,
        query: ListingQuery,
    ) -> Result<(Arc<BlogsPage>, CacheStatus), BlogError> {
        let key = ListingKey::from_query(&query);
        let (page, status) = self
            .listing
            .get_or_compute(key, self.listing_ttl, || self.fetch_page(query))
            .await?;

        let metric = match status {
            CacheStatus::Hit => METRIC_LISTING_HIT,
            CacheStatus::Miss => METRIC_LISTING_MISS,
            CacheStatus::HitAfterWait => METRIC_LISTING_WAIT_HIT,
        };
        counter!(metric).increment(1);

        Ok((page, status))
    }

    async fn fetch_page(&self, query: ListingQuery) -> Result<Arc<BlogsPage>, RepoError> {
        let (records, total) =
            tokio::try_join!(self.blogs.list_blogs(&query), self.blogs.count_blogs())?;

        let blogs = join_all(records.into_iter().map(|record| async move {
            let views = self.views_for(&record.id).await;
            record.into_blog(views)
        }))
        .await;

        Ok(Arc::new(BlogsPage::new(blogs, total, &query)))
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Result<Blog, BlogError> {
        if !is_valid_blog_id(id) {
            return Err(DomainError::validation("invalid blog id format").into());
        }

        let record = self
            .blogs
            .find_blog(id)
            .await?
            .ok_or_else(|| DomainError::not_found("blog", id))?;
        let views = self.views_for(&record.id).await;
        Ok(record.into_blog(views))
    }

    /// Persist a new blog and drop every cached listing page.
    #[instrument(skip(self, input), fields(title = %input.title))]
    pub async fn create(&self, input: NewBlog) -> Result<Blog, BlogError> {
        let input = input.validate()?;
        let created_at = OffsetDateTime::now_utc();

        let mut attempt = 0;
        let record = loop {
            attempt += 1;
            let params = CreateBlogParams {
                id: generate_blog_id(created_at),
                title: input.title.clone(),
                summary: input.summary.clone(),
                prequel_id: input.prequel_id.clone(),
                sequel_id: input.sequel_id.clone(),
                parts: input.parts.clone(),
                created_at,
            };
            match self.blogs.create_blog(params).await {
                Ok(record) => break record,
                Err(RepoError::Duplicate { constraint }) if attempt < MAX_ID_ATTEMPTS => {
                    warn!(
                        constraint = %constraint,
                        attempt,
                        "Generated blog id collided, retrying"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        };

        let dropped = self.listing.invalidate_all();
        info!(blog_id = %record.id, dropped, "Blog created, listing cache cleared");

        Ok(record.into_blog(0))
    }

    pub fn purge_listing_cache(&self) -> usize {
        let dropped = self.listing.invalidate_all();
        info!(dropped, "Listing cache purged");
        dropped
    }

    async fn views_for(&self, blog_id: &str) -> u64 {
        match self.analytics.page_views(blog_id).await {
            Ok(views) => views,
            Err(err) => {
                warn!(blog_id, error = %err, "Failed to load page views");
                0
            }
        }
    }
}

/// Short hex id from the creation instant plus a random salt.
fn generate_blog_id(created_at: OffsetDateTime) -> String {
    let seed = format!("{}-{}", created_at.unix_timestamp_nanos(), Uuid::new_v4());
    let digest = hex::encode(Sha256::digest(seed.as_bytes()));
    digest[..BLOG_ID_LEN].to_string()
}
