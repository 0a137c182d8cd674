//! External collaborators the pipeline consumes: the social platform, text and
//! image generation, and object storage. Live implementations sit in the
//! submodules; the pipeline only sees these traits.

pub mod heurist;
pub mod storage;
pub mod twitter;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;

use crate::core::queue::RequestQueue;
use crate::error::{GenerationError, PlatformError, StorageError};
use crate::models::{Item, MediaRef, SearchMode, SentPost};

#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn search_recent(
        &self,
        query: &str,
        limit: usize,
        mode: SearchMode,
    ) -> Result<Vec<Item>, PlatformError>;

    async fn send_reply(
        &self,
        text: &str,
        reply_to_id: Option<&str>,
        media: Option<&MediaRef>,
    ) -> Result<SentPost, PlatformError>;
}

#[derive(Debug, Clone, Copy)]
pub struct TextConstraints {
    pub max_chars: usize,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        context: &str,
        constraints: &TextConstraints,
    ) -> Result<String, GenerationError>;
}

/// Fully resolved image request. Optional tuning is left to the provider's defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub seed: Option<u64>,
    pub guidance_scale: Option<f64>,
    pub num_iterations: Option<u32>,
    pub negative_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedImage {
    Url(String),
    Data(Bytes),
}

impl GeneratedImage {
    /// Accepts a remote URL, a `data:` URI, or bare base64.
    pub fn parse(raw: &str) -> Result<Self, GenerationError> {
        let raw = raw.trim().trim_matches('"');
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Ok(GeneratedImage::Url(raw.to_string()));
        }

        let payload = match raw.strip_prefix("data:") {
            Some(rest) => match rest.split_once(";base64,") {
                Some((_mime, data)) => data,
                None => {
                    return Err(GenerationError::InvalidImageData(
                        "data URI is not base64 encoded".to_string(),
                    ))
                }
            },
            None => raw,
        };

        if payload.is_empty() {
            return Err(GenerationError::InvalidImageData("empty payload".to_string()));
        }

        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map(|bytes| GeneratedImage::Data(Bytes::from(bytes)))
            .map_err(|e| GenerationError::InvalidImageData(e.to_string()))
    }
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, request: &ImageRequest) -> Result<Vec<GeneratedImage>, GenerationError>;

    /// Fetch a generated image that came back as a URL.
    async fn download(&self, url: &str) -> Result<Bytes, GenerationError>;
}

/// GET `url` into memory with the caller's client, so its timeout applies.
pub(crate) async fn download_with(
    client: &reqwest::Client,
    url: &str,
) -> Result<Bytes, GenerationError> {
    let failed = |reason: String| GenerationError::RequestFailed {
        provider: "image-download".to_string(),
        reason,
    };
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| failed(e.to_string()))?;
    if !response.status().is_success() {
        return Err(failed(format!("status {}", response.status())));
    }
    response.bytes().await.map_err(|e| failed(e.to_string()))
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store the bytes and return a durable public URL.
    async fn upload(&self, bytes: Bytes, filename: &str) -> Result<String, StorageError>;
}

/// One platform account: its client and the queue all of its calls go through.
pub struct AccountHandle {
    pub account: String,
    pub client: Arc<dyn PlatformClient>,
    pub queue: RequestQueue,
}

/// Account id to client lookup, owned by the composition root.
#[derive(Default)]
pub struct ClientRegistry {
    accounts: HashMap<String, Arc<AccountHandle>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing handle when the account is already registered.
    pub fn register(
        &mut self,
        account: &str,
        client: Arc<dyn PlatformClient>,
    ) -> Arc<AccountHandle> {
        self.accounts
            .entry(account.to_string())
            .or_insert_with(|| {
                Arc::new(AccountHandle {
                    account: account.to_string(),
                    client,
                    queue: RequestQueue::new(),
                })
            })
            .clone()
    }

    #[cfg(test)]
    pub fn get(&self, account: &str) -> Option<Arc<AccountHandle>> {
        self.accounts.get(account).cloned()
    }
}
