//! Ambient sound retrieval
//!
//! Pages carry pre-resolved ambient sound URLs; the engine only downloads
//! and plays them. Ambience is fire-and-forget: it is never on the narration
//! critical path, and failures are logged rather than surfaced.

use crate::error::{Error, Result};
use async_trait::async_trait;

/// Downloads a page's ambient sound payload
#[async_trait]
pub trait AmbienceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// HTTP fetcher for pre-resolved ambient sound URLs
pub struct HttpAmbienceFetcher {
    client: reqwest::Client,
}

impl HttpAmbienceFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpAmbienceFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AmbienceFetcher for HttpAmbienceFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::NarrationFetch(format!("ambient fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::NarrationFetch(format!(
                "ambient sound host returned {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::NarrationFetch(format!("ambient payload read failed: {}", e)))?;
        Ok(bytes.to_vec())
    }
}
