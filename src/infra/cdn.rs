//! Cloudflare cache purge client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::application::cdn::{CdnError, CdnPurger};
use crate::config::CdnSettings;

use super::error::InfraError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct PurgeRequest<'a> {
    files: &'a [String],
}

#[derive(Debug, Deserialize)]
struct PurgeResponse {
    success: bool,
    #[serde(default)]
    errors: Vec<PurgeResponseError>,
}

#[derive(Debug, Deserialize)]
struct PurgeResponseError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

pub struct CloudflarePurger {
    client: Client,
    endpoint: String,
    api_token: String,
    public_host: String,
}

impl CloudflarePurger {
    pub fn new(settings: &CdnSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(concat!("folio/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| InfraError::HttpClient(err.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/zones/{}/purge_cache",
                settings.api_base.trim_end_matches('/'),
                settings.zone_id
            ),
            api_token: settings.api_token.clone(),
            public_host: settings.public_host.trim_end_matches('/').to_string(),
        })
    }

    /// Absolute URLs for site-relative paths.
    fn absolute_urls(&self, paths: &[String]) -> Vec<String> {
        paths
            .iter()
            .map(|path| {
                if path.starts_with('/') {
                    format!("{}{path}", self.public_host)
                } else {
                    format!("{}/{path}", self.public_host)
                }
            })
            .collect()
    }
}

#[async_trait]
impl CdnPurger for CloudflarePurger {
    #[instrument(skip(self, paths), fields(count = paths.len()))]
    async fn purge(&self, paths: &[String]) -> Result<(), CdnError> {
        let files = self.absolute_urls(paths);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .json(&PurgeRequest { files: &files })
            .send()
            .await
            .map_err(|err| CdnError::Transport(err.to_string()))?;

        let status = response.status();
        let body: Option<PurgeResponse> = response.json().await.ok();
        match body {
            Some(body) if status.is_success() && body.success => Ok(()),
            Some(body) => {
                let detail = body
                    .errors
                    .iter()
                    .map(|e| format!("{}: {}", e.code, e.message))
                    .collect::<Vec<_>>()
                    .join("; ");
                warn!(status = status.as_u16(), detail = %detail, "Cloudflare refused purge");
                Err(CdnError::Rejected(format!("status {status}: {detail}")))
            }
            None => Err(CdnError::Rejected(format!("status {status}: unreadable response body"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CdnSettings {
        CdnSettings {
            zone_id: "zone-1".into(),
            api_token: "token".into(),
            public_host: "https://example.com/".into(),
            api_base: "https://api.cloudflare.com/client/v4/".into(),
        }
    }

    #[test]
    fn paths_are_prefixed_with_public_host() {
        let purger = CloudflarePurger::new(&settings()).expect("client");
        let urls = purger.absolute_urls(&["/blog/1".into(), "sitemap.xml".into()]);
        assert_eq!(
            urls,
            vec![
                "https://example.com/blog/1".to_string(),
                "https://example.com/sitemap.xml".to_string(),
            ]
        );
        assert_eq!(
            purger.endpoint,
            "https://api.cloudflare.com/client/v4/zones/zone-1/purge_cache"
        );
    }
}
