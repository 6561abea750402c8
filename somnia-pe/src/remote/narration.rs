//! Narration synthesis client
//!
//! Requests synthesized speech for a page's text from the external TTS
//! collaborator. Each request is tagged with a monotonically increasing
//! sequence number; a request is "current" only while its number equals the
//! latest issued. Staleness is enforced at the consumption point, not by
//! aborting the transport, so collaborators without cancellable requests
//! are tolerated: a superseded transfer may still complete, and its result
//! is then discarded unplayed.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Response header carrying the playback rate to apply to the payload
const PLAYBACK_RATE_HEADER: &str = "x-playback-rate";

/// Synthesis request for one page
#[derive(Debug, Clone, Serialize)]
pub struct NarrationRequest {
    /// Page text to narrate
    pub text: String,
    /// Language code
    pub language: String,
    /// Speech speed multiplier
    pub speed: f32,
}

/// Synthesized narration audio as returned by the collaborator
#[derive(Debug, Clone)]
pub struct NarrationAudio {
    /// Complete encoded audio payload
    pub bytes: Vec<u8>,
    /// Playback rate the payload should be played at
    pub playback_rate: f32,
}

/// Narration synthesis collaborator
#[async_trait]
pub trait NarrationBackend: Send + Sync {
    /// Synthesize speech for one request. Non-2xx and transport failures
    /// surface as `Error::NarrationFetch`; the engine never retries.
    async fn synthesize(&self, request: &NarrationRequest) -> Result<NarrationAudio>;
}

/// HTTP backend posting to the TTS collaborator
pub struct HttpNarrationBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNarrationBackend {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl NarrationBackend for HttpNarrationBackend {
    async fn synthesize(&self, request: &NarrationRequest) -> Result<NarrationAudio> {
        let url = format!("{}/v1/synthesize", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::NarrationFetch(format!("request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::NarrationFetch(format!(
                "collaborator returned {}",
                response.status()
            )));
        }

        let playback_rate = response
            .headers()
            .get(PLAYBACK_RATE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f32>().ok())
            .unwrap_or(1.0);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::NarrationFetch(format!("payload read failed: {}", e)))?
            .to_vec();

        if bytes.is_empty() {
            return Err(Error::NarrationFetch("empty audio payload".to_string()));
        }

        Ok(NarrationAudio {
            bytes,
            playback_rate,
        })
    }
}

/// Issues narration requests and tracks which one is current
///
/// Only one narration request is outstanding per session; issuing a new one
/// implicitly supersedes the previous one. `invalidate` marks everything
/// outstanding stale without issuing a new request (used by stop).
pub struct NarrationRequester {
    backend: Arc<dyn NarrationBackend>,
    seq: AtomicU64,
}

impl NarrationRequester {
    pub fn new(backend: Arc<dyn NarrationBackend>) -> Self {
        Self {
            backend,
            seq: AtomicU64::new(0),
        }
    }

    /// Issue a new sequence number, superseding any outstanding request
    pub fn begin(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether `seq` is still the latest issued request
    pub fn is_current(&self, seq: u64) -> bool {
        self.seq.load(Ordering::SeqCst) == seq
    }

    /// Mark all outstanding requests stale
    pub fn invalidate(&self) {
        self.seq.fetch_add(1, Ordering::SeqCst);
    }

    /// Perform the fetch for a previously issued sequence number.
    /// The caller re-checks `is_current` when the result arrives.
    pub async fn fetch(&self, request: NarrationRequest) -> Result<NarrationAudio> {
        self.backend.synthesize(&request).await
    }
}
