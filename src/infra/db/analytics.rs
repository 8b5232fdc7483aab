use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::application::repos::{AnalyticsRepo, RepoError};
use crate::domain::analytics::{AnalyticsEvent, EventFilter};

use super::PostgresRepositories;
use super::util::{convert_count, map_sqlx_error};

const INSERT_EVENT: &str = r#"
INSERT INTO analytics (
    session_id, event_type, event_timestamp,
    page_url, referrer_url,
    ip_address, country, region, city,
    user_agent, device_type, browser_name, browser_version,
    os_name, os_version, screen_width, screen_height,
    viewport_width, viewport_height, language,
    utm_source, utm_medium, utm_campaign, utm_term, utm_content,
    page_load_time_ms, time_on_page_sec, scroll_depth_pct,
    element_id, error_message, metadata
) VALUES (
    $1, $2, COALESCE($3, now()),
    $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
    $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31
)
"#;

const EVENT_COLUMNS: &str = "session_id, event_type, event_timestamp, page_url, referrer_url, \
     ip_address, country, region, city, user_agent, device_type, \
     browser_name, browser_version, os_name, os_version, \
     screen_width, screen_height, viewport_width, viewport_height, language, \
     utm_source, utm_medium, utm_campaign, utm_term, utm_content, \
     page_load_time_ms, time_on_page_sec, scroll_depth_pct, \
     element_id, error_message, metadata";

#[derive(sqlx::FromRow)]
struct EventRow {
    session_id: String,
    event_type: String,
    event_timestamp: OffsetDateTime,
    page_url: String,
    referrer_url: Option<String>,
    ip_address: Option<String>,
    country: Option<String>,
    region: Option<String>,
    city: Option<String>,
    user_agent: Option<String>,
    device_type: Option<String>,
    browser_name: Option<String>,
    browser_version: Option<String>,
    os_name: Option<String>,
    os_version: Option<String>,
    screen_width: Option<i32>,
    screen_height: Option<i32>,
    viewport_width: Option<i32>,
    viewport_height: Option<i32>,
    language: Option<String>,
    utm_source: Option<String>,
    utm_medium: Option<String>,
    utm_campaign: Option<String>,
    utm_term: Option<String>,
    utm_content: Option<String>,
    page_load_time_ms: Option<i32>,
    time_on_page_sec: Option<f64>,
    scroll_depth_pct: Option<f64>,
    element_id: Option<String>,
    error_message: Option<String>,
    metadata: Option<Json<Map<String, Value>>>,
}

impl From<EventRow> for AnalyticsEvent {
    fn from(row: EventRow) -> Self {
        Self {
            session_id: row.session_id,
            event_type: row.event_type,
            event_timestamp: Some(row.event_timestamp),
            page_url: row.page_url,
            referrer_url: row.referrer_url,
            ip_address: row.ip_address,
            country: row.country,
            region: row.region,
            city: row.city,
            user_agent: row.user_agent,
            device_type: row.device_type,
            browser_name: row.browser_name,
            browser_version: row.browser_version,
            os_name: row.os_name,
            os_version: row.os_version,
            screen_width: row.screen_width,
            screen_height: row.screen_height,
            viewport_width: row.viewport_width,
            viewport_height: row.viewport_height,
            language: row.language,
            utm_source: row.utm_source,
            utm_medium: row.utm_medium,
            utm_campaign: row.utm_campaign,
            utm_term: row.utm_term,
            utm_content: row.utm_content,
            page_load_time_ms: row.page_load_time_ms,
            time_on_page_sec: row.time_on_page_sec,
            scroll_depth_pct: row.scroll_depth_pct,
            element_id: row.element_id,
            error_message: row.error_message,
            metadata: row.metadata.map(|Json(metadata)| metadata),
        }
    }
}

fn events_query(filter: &EventFilter) -> QueryBuilder<'_, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {EVENT_COLUMNS} FROM analytics WHERE event_timestamp >= "
    ));
    qb.push_bind(filter.since);
    if let Some(event_type) = &filter.event_type {
        qb.push(" AND event_type = ");
        qb.push_bind(event_type.as_str());
    }
    qb.push(" ORDER BY event_timestamp ASC, id ASC");
    qb
}

/// `_` and `%` are wildcards in LIKE; ids never contain `%` but may contain `_`.
fn views_pattern(blog_id: &str) -> String {
    format!("%/blog/{}%", blog_id.replace('_', "\\_"))
}

#[async_trait]
impl AnalyticsRepo for PostgresRepositories {
    async fn record_event(&self, event: &AnalyticsEvent) -> Result<(), RepoError> {
        sqlx::query(INSERT_EVENT)
            .bind(&event.session_id)
            .bind(&event.event_type)
            .bind(event.event_timestamp)
            .bind(&event.page_url)
            .bind(&event.referrer_url)
            .bind(&event.ip_address)
            .bind(&event.country)
            .bind(&event.region)
            .bind(&event.city)
            .bind(&event.user_agent)
            .bind(&event.device_type)
            .bind(&event.browser_name)
            .bind(&event.browser_version)
            .bind(&event.os_name)
            .bind(&event.os_version)
            .bind(event.screen_width)
            .bind(event.screen_height)
            .bind(event.viewport_width)
            .bind(event.viewport_height)
            .bind(&event.language)
            .bind(&event.utm_source)
            .bind(&event.utm_medium)
            .bind(&event.utm_campaign)
            .bind(&event.utm_term)
            .bind(&event.utm_content)
            .bind(event.page_load_time_ms)
            .bind(event.time_on_page_sec)
            .bind(event.scroll_depth_pct)
            .bind(&event.element_id)
            .bind(&event.error_message)
            .bind(event.metadata.as_ref().map(Json))
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn page_views(&self, blog_id: &str) -> Result<u64, RepoError> {
        let views: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM analytics WHERE page_url LIKE $1")
                .bind(views_pattern(blog_id))
                .fetch_one(self.pool())
                .await
                .map_err(map_sqlx_error)?;
        convert_count(views)
    }

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<AnalyticsEvent>, RepoError> {
        let rows: Vec<EventRow> = events_query(filter)
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(AnalyticsEvent::from).collect())
    }
}
