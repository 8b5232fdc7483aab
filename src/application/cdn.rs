//! Edge cache purging.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CdnError {
    #[error("no paths to purge")]
    EmptyRequest,
    #[error("CDN purging is not configured")]
    NotConfigured,
    #[error("CDN rejected purge request: {0}")]
    Rejected(String),
    #[error("CDN request failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait CdnPurger: Send + Sync {
    /// Purge the given site-relative paths from the edge cache.
    async fn purge(&self, paths: &[String]) -> Result<(), CdnError>;
}

#[derive(Clone)]
pub struct CdnService {
    purger: Option<Arc<dyn CdnPurger>>,
}

impl CdnService {
    pub fn new(purger: Option<Arc<dyn CdnPurger>>) -> Self {
        Self { purger }
    }

    pub async fn purge(&self, paths: Vec<String>) -> Result<usize, CdnError> {
        let paths: Vec<String> = paths
            .into_iter()
            .map(|path| path.trim().to_string())
            .filter(|path| !path.is_empty())
            .collect();
        if paths.is_empty() {
            return Err(CdnError::EmptyRequest);
        }

        let purger = self.purger.as_ref().ok_or(CdnError::NotConfigured)?;
        purger.purge(&paths).await?;
        info!(count = paths.len(), "Purged CDN paths");
        Ok(paths.len())
    }
}
