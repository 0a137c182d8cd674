use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::error::StorageError;
use crate::providers::ObjectStorage;

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Bucket reachable over plain HTTP PUT, served back from a public base URL.
pub struct HttpObjectStorage {
    client: reqwest::Client,
    upload_url: String,
    public_url: String,
    token: Option<String>,
}

impl HttpObjectStorage {
    pub fn new(
        upload_url: &str,
        public_url: &str,
        token: Option<String>,
    ) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StorageError::Client(e.to_string()))?;
        Ok(HttpObjectStorage {
            client,
            upload_url: upload_url.to_string(),
            public_url: public_url.to_string(),
            token,
        })
    }
}

pub(crate) fn object_url(base: &str, filename: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), filename.trim_start_matches('/'))
}

pub(crate) fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn upload(&self, bytes: Bytes, filename: &str) -> Result<String, StorageError> {
        let failed = |reason: String| StorageError::UploadFailed {
            filename: filename.to_string(),
            reason,
        };

        let mut request = self
            .client
            .put(object_url(&self.upload_url, filename))
            .header(CONTENT_TYPE, content_type_for(filename))
            .body(bytes);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| failed(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failed(format!("status {}: {}", status, body)));
        }

        let url = object_url(&self.public_url, filename);
        debug!(url = %url, "Uploaded object");
        Ok(url)
    }
}
