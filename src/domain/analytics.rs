//! Client-reported analytics events.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::{Duration, OffsetDateTime};

use super::error::DomainError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub session_id: String,
    pub event_type: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub event_timestamp: Option<OffsetDateTime>,
    pub page_url: String,
    #[serde(default)]
    pub referrer_url: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub browser_name: Option<String>,
    #[serde(default)]
    pub browser_version: Option<String>,
    #[serde(default)]
    pub os_name: Option<String>,
    #[serde(default)]
    pub os_version: Option<String>,
    #[serde(default)]
    pub screen_width: Option<i32>,
    #[serde(default)]
    pub screen_height: Option<i32>,
    #[serde(default)]
    pub viewport_width: Option<i32>,
    #[serde(default)]
    pub viewport_height: Option<i32>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub utm_source: Option<String>,
    #[serde(default)]
    pub utm_medium: Option<String>,
    #[serde(default)]
    pub utm_campaign: Option<String>,
    #[serde(default)]
    pub utm_term: Option<String>,
    #[serde(default)]
    pub utm_content: Option<String>,
    #[serde(default)]
    pub page_load_time_ms: Option<i32>,
    #[serde(default)]
    pub time_on_page_sec: Option<f64>,
    #[serde(default)]
    pub scroll_depth_pct: Option<f64>,
    #[serde(default)]
    pub element_id: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

impl AnalyticsEvent {
    /// Check required fields and turn blank optional strings into `None`.
    pub fn validate(mut self) -> Result<Self, DomainError> {
        for (field, value) in [
            ("session_id", &self.session_id),
            ("event_type", &self.event_type),
            ("page_url", &self.page_url),
        ] {
            if value.trim().is_empty() {
                return Err(DomainError::validation(format!("{field} is required")));
            }
        }

        for slot in [
            &mut self.referrer_url,
            &mut self.ip_address,
            &mut self.country,
            &mut self.region,
            &mut self.city,
            &mut self.user_agent,
            &mut self.device_type,
            &mut self.browser_name,
            &mut self.browser_version,
            &mut self.os_name,
            &mut self.os_version,
            &mut self.language,
            &mut self.utm_source,
            &mut self.utm_medium,
            &mut self.utm_campaign,
            &mut self.utm_term,
            &mut self.utm_content,
            &mut self.element_id,
            &mut self.error_message,
        ] {
            if slot.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *slot = None;
            }
        }

        if self.metadata.as_ref().is_some_and(Map::is_empty) {
            self.metadata = None;
        }

        Ok(self)
    }
}

/// Look-back window offered by the analytics dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeRange {
    Day,
    #[default]
    Week,
    Month,
    Quarter,
}

impl TimeRange {
    /// `24h`, `7d`, `30d` or `90d`; absent or empty means `7d`.
    pub fn parse(raw: Option<&str>) -> Result<Self, DomainError> {
        match raw.unwrap_or_default() {
            "24h" => Ok(Self::Day),
            "7d" | "" => Ok(Self::Week),
            "30d" => Ok(Self::Month),
            "90d" => Ok(Self::Quarter),
            other => Err(DomainError::validation(format!(
                "invalid time_range `{other}`; expected 24h, 7d, 30d or 90d"
            ))),
        }
    }

    pub const fn span(self) -> Duration {
        match self {
            Self::Day => Duration::hours(24),
            Self::Week => Duration::days(7),
            Self::Month => Duration::days(30),
            Self::Quarter => Duration::days(90),
        }
    }
}

/// Which stored events the dashboard asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    pub since: OffsetDateTime,
    /// `None` selects every event type.
    pub event_type: Option<String>,
}

impl EventFilter {
    pub fn new(range: TimeRange, event_type: Option<&str>, now: OffsetDateTime) -> Self {
        let event_type = event_type
            .map(str::trim)
            .filter(|value| !value.is_empty() && *value != "all")
            .map(str::to_string);
        Self {
            since: now - range.span(),
            event_type,
        }
    }
}
