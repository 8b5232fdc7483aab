use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::application::repos::{AnalyticsRepo, RepoError};
use crate::domain::analytics::{AnalyticsEvent, EventFilter, TimeRange};
use crate::domain::error::DomainError;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Where the request came from, as far as headers and the socket tell.
#[derive(Debug, Clone, Default)]
pub struct ClientOrigin {
    pub forwarded_for: Option<String>,
    pub real_ip: Option<String>,
    pub peer: Option<SocketAddr>,
}

impl ClientOrigin {
    /// First `X-Forwarded-For` hop, then `X-Real-IP`, then the peer address.
    pub fn client_ip(&self) -> Option<String> {
        let forwarded = self
            .forwarded_for
            .as_deref()
            .and_then(|header| header.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());
        if let Some(hop) = forwarded {
            return Some(hop.to_string());
        }

        let real_ip = self
            .real_ip
            .as_deref()
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = real_ip {
            return Some(ip.to_string());
        }

        self.peer.map(|addr| addr.ip().to_string())
    }
}

#[derive(Clone)]
pub struct AnalyticsService {
    repo: Arc<dyn AnalyticsRepo>,
}

impl AnalyticsService {
    pub fn new(repo: Arc<dyn AnalyticsRepo>) -> Self {
        Self { repo }
    }

    #[instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub async fn record(
        &self,
        event: AnalyticsEvent,
        origin: &ClientOrigin,
    ) -> Result<(), AnalyticsError> {
        let mut event = event.validate()?;
        if event.ip_address.is_none() {
            event.ip_address = origin.client_ip();
        }
        if event.event_timestamp.is_none() {
            event.event_timestamp = Some(OffsetDateTime::now_utc());
        }

        self.repo.record_event(&event).await?;
        Ok(())
    }

    /// Events for the dashboard: `time_range` is one of `24h`, `7d` (default),
    /// `30d`, `90d`; `event_type` of `all` or absent means no type filter.
    #[instrument(skip(self))]
    pub async fn query(
        &self,
        time_range: Option<&str>,
        event_type: Option<&str>,
    ) -> Result<Vec<AnalyticsEvent>, AnalyticsError> {
        let range = TimeRange::parse(time_range)?;
        let filter = EventFilter::new(range, event_type, OffsetDateTime::now_utc());
        let events = self.repo.list_events(&filter).await?;
        debug!(count = events.len(), "Loaded analytics events");
        Ok(events)
    }
}
