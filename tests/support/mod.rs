//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use folio::application::analytics::AnalyticsService;
use folio::application::auth::AuthService;
use folio::application::blogs::{BlogService, LISTING_CACHE_NAME, ListingCache};
use folio::application::cdn::{CdnError, CdnPurger, CdnService};
use folio::application::repos::{
    AnalyticsRepo, BlogRecord, BlogsRepo, CreateBlogParams, HealthRepo, RepoError,
};
use folio::cache::{Clock, ManualClock, SequenceRandom, TokenPolicy, TokenStore};
use folio::domain::analytics::{AnalyticsEvent, EventFilter};
use folio::domain::blogs::{ListingQuery, SortField, SortOrder};
use folio::infra::http::ApiState;

pub const SUDO_KEY: &str = "correct horse battery staple";
pub const LISTING_TTL: Duration = Duration::from_secs(600);

pub fn record(id: &str, title: &str, minutes_ago: i64) -> BlogRecord {
    let at = OffsetDateTime::UNIX_EPOCH + time::Duration::days(20_000)
        - time::Duration::minutes(minutes_ago);
    BlogRecord {
        id: id.to_string(),
        title: title.to_string(),
        summary: format!("{title} summary"),
        created_at: at,
        updated_at: at,
        prequel_id: None,
        sequel_id: None,
        parts: vec!["intro".to_string()],
    }
}

/// Blog store that counts listing calls and can be slowed down or broken.
#[derive(Default)]
pub struct MemoryBlogs {
    pub records: Mutex<Vec<BlogRecord>>,
    pub list_calls: AtomicUsize,
    pub list_delay: Mutex<Option<Duration>>,
    pub fail_listing: AtomicBool,
}

impl MemoryBlogs {
    pub fn with_records(records: Vec<BlogRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Default::default()
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub async fn slow_down(&self, delay: Duration) {
        *self.list_delay.lock().await = Some(delay);
    }
}

#[async_trait]
impl BlogsRepo for MemoryBlogs {
    async fn list_blogs(&self, query: &ListingQuery) -> Result<Vec<BlogRecord>, RepoError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.list_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }

        let mut records = self.records.lock().await.clone();
        records.sort_by(|a, b| {
            let ordering = match query.sort {
                SortField::Id => a.id.cmp(&b.id),
                SortField::Title => a.title.cmp(&b.title),
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            }
            .then_with(|| a.id.cmp(&b.id));
            match query.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        Ok(records
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .collect())
    }

    async fn count_blogs(&self) -> Result<u64, RepoError> {
        Ok(self.records.lock().await.len() as u64)
    }

    async fn find_blog(&self, id: &str) -> Result<Option<BlogRecord>, RepoError> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .find(|record| record.id == id)
            .cloned())
    }

    async fn create_blog(&self, params: CreateBlogParams) -> Result<BlogRecord, RepoError> {
        let mut records = self.records.lock().await;
        if records.iter().any(|record| record.id == params.id) {
            return Err(RepoError::Duplicate {
                constraint: "blogs_pkey".to_string(),
            });
        }
        let record = BlogRecord {
            id: params.id,
            title: params.title,
            summary: params.summary,
            created_at: params.created_at,
            updated_at: params.created_at,
            prequel_id: params.prequel_id,
            sequel_id: params.sequel_id,
            parts: params.parts,
        };
        records.push(record.clone());
        Ok(record)
    }
}

/// Analytics store keeping events in memory; views are looked up per blog id.
#[derive(Default)]
pub struct MemoryAnalytics {
    pub events: Mutex<Vec<AnalyticsEvent>>,
    pub views: Mutex<HashMap<String, u64>>,
    pub last_filter: Mutex<Option<EventFilter>>,
}

#[async_trait]
impl AnalyticsRepo for MemoryAnalytics {
    async fn record_event(&self, event: &AnalyticsEvent) -> Result<(), RepoError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }

    async fn page_views(&self, blog_id: &str) -> Result<u64, RepoError> {
        Ok(self
            .views
            .lock()
            .await
            .get(blog_id)
            .copied()
            .unwrap_or_default())
    }

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<AnalyticsEvent>, RepoError> {
        *self.last_filter.lock().await = Some(filter.clone());
        let events = self.events.lock().await;
        Ok(events
            .iter()
            .filter(|event| event.event_timestamp.is_some_and(|at| at >= filter.since))
            .filter(|event| {
                filter
                    .event_type
                    .as_deref()
                    .is_none_or(|wanted| event.event_type == wanted)
            })
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct SwitchableHealth {
    pub down: AtomicBool,
}

#[async_trait]
impl HealthRepo for SwitchableHealth {
    async fn ping(&self) -> Result<(), RepoError> {
        if self.down.load(Ordering::SeqCst) {
            Err(RepoError::Persistence("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
pub struct RecordingPurger {
    pub purged: Mutex<Vec<String>>,
    pub reject: AtomicBool,
}

#[async_trait]
impl CdnPurger for RecordingPurger {
    async fn purge(&self, paths: &[String]) -> Result<(), CdnError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(CdnError::Rejected("status 400: 1012: bad zone".to_string()));
        }
        self.purged.lock().await.extend_from_slice(paths);
        Ok(())
    }
}

/// Everything a test needs to drive the router and inspect side effects.
pub struct Harness {
    pub state: ApiState,
    pub clock: Arc<ManualClock>,
    pub blogs: Arc<MemoryBlogs>,
    pub analytics: Arc<MemoryAnalytics>,
    pub health: Arc<SwitchableHealth>,
    pub purger: Arc<RecordingPurger>,
    pub listing: Arc<ListingCache>,
    pub tokens: Arc<TokenStore>,
}

pub struct HarnessOptions {
    pub sudo_key: Option<&'static str>,
    pub cdn: bool,
    pub records: Vec<BlogRecord>,
    pub token_max_lifetime: Option<Duration>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            sudo_key: Some(SUDO_KEY),
            cdn: true,
            records: vec![
                record("aaaaaaa", "First", 30),
                record("bbbbbbb", "Second", 20),
                record("ccccccc", "Third", 10),
            ],
            token_max_lifetime: None,
        }
    }
}

pub fn harness(options: HarnessOptions) -> Harness {
    let clock = Arc::new(ManualClock::new());
    let blogs = Arc::new(MemoryBlogs::with_records(options.records));
    let analytics = Arc::new(MemoryAnalytics::default());
    let health = Arc::new(SwitchableHealth::default());
    let purger = Arc::new(RecordingPurger::default());

    let listing = Arc::new(ListingCache::new(
        LISTING_CACHE_NAME,
        clock.clone() as Arc<dyn Clock>,
        3,
    ));
    let policy = TokenPolicy {
        max_lifetime: options.token_max_lifetime,
        ..TokenPolicy::default()
    };
    let tokens = Arc::new(TokenStore::new(
        policy,
        clock.clone() as Arc<dyn Clock>,
        Arc::new(SequenceRandom::default()),
    ));

    let cdn = if options.cdn {
        CdnService::new(Some(purger.clone() as Arc<dyn CdnPurger>))
    } else {
        CdnService::new(None)
    };

    let state = ApiState {
        blogs: Arc::new(BlogService::new(
            blogs.clone(),
            analytics.clone(),
            listing.clone(),
            LISTING_TTL,
        )),
        auth: Arc::new(AuthService::new(options.sudo_key, tokens.clone())),
        analytics: Arc::new(AnalyticsService::new(analytics.clone())),
        cdn: Arc::new(cdn),
        health: health.clone(),
    };

    Harness {
        state,
        clock,
        blogs,
        analytics,
        health,
        purger,
        listing,
        tokens,
    }
}
