use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use tracing::debug;

use crate::error::GenerationError;
use crate::providers::{download_with, GeneratedImage, ImageGenerator, ImageRequest};

const SUBMIT_JOB_URL: &str = "http://sequencer.heurist.xyz/submit_job";
const DEFAULT_NEGATIVE_PROMPT: &str =
    "worst quality, bad quality, umbrella, blurry face, anime, illustration";
const DEFAULT_ITERATIONS: u32 = 22;
const DEFAULT_GUIDANCE_SCALE: f64 = 7.5;
const JOB_DEADLINE_SECS: u64 = 300;
// Generation blocks until the image is ready, so this is generous
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize, PartialEq)]
pub(crate) struct SdInput {
    pub width: u32,
    pub height: u32,
    pub prompt: String,
    pub neg_prompt: String,
    pub num_iterations: u32,
    pub guidance_scale: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ModelInput {
    #[serde(rename = "SD")]
    pub sd: SdInput,
}

#[derive(Debug, Serialize)]
pub(crate) struct JobRequest {
    pub model_input: ModelInput,
    pub model_id: String,
    pub deadline: u64,
    pub priority: u8,
    pub job_id: String,
}

/// Heurist sequencer job submission. The response body is the image URL.
pub struct HeuristImageGenerator {
    client: reqwest::Client,
    api_key: String,
    model_id: String,
}

impl HeuristImageGenerator {
    pub fn new(api_key: &str, model_id: &str) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(Self::failed)?;
        Ok(HeuristImageGenerator {
            client,
            api_key: api_key.to_string(),
            model_id: model_id.to_string(),
        })
    }

    pub(crate) fn job_request(&self, request: &ImageRequest, now_millis: u128) -> JobRequest {
        JobRequest {
            model_input: ModelInput {
                sd: SdInput {
                    width: request.width,
                    height: request.height,
                    prompt: request.prompt.clone(),
                    neg_prompt: request
                        .negative_prompt
                        .clone()
                        .unwrap_or_else(|| DEFAULT_NEGATIVE_PROMPT.to_string()),
                    num_iterations: request.num_iterations.unwrap_or(DEFAULT_ITERATIONS),
                    guidance_scale: request.guidance_scale.unwrap_or(DEFAULT_GUIDANCE_SCALE),
                    seed: request.seed,
                },
            },
            model_id: self.model_id.clone(),
            deadline: (now_millis / 1000) as u64 + JOB_DEADLINE_SECS,
            priority: 1,
            job_id: format!("job_{}", now_millis),
        }
    }

    fn failed(reason: impl ToString) -> GenerationError {
        GenerationError::RequestFailed {
            provider: "heurist".to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl ImageGenerator for HeuristImageGenerator {
    async fn generate(&self, request: &ImageRequest) -> Result<Vec<GeneratedImage>, GenerationError> {
        if request.prompt.trim().is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }

        let now_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(Self::failed)?
            .as_millis();
        let body = self.job_request(request, now_millis);

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(Self::failed)?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        debug!(job_id = %body.job_id, "Submitting image job");
        let response = self
            .client
            .post(SUBMIT_JOB_URL)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(Self::failed)?;

        let status = response.status();
        let text = response.text().await.map_err(Self::failed)?;
        if !status.is_success() {
            return Err(Self::failed(format!("status {}: {}", status, text)));
        }

        let payload = text.trim().trim_matches('"');
        if payload.is_empty() {
            return Err(GenerationError::EmptyResult("heurist".to_string()));
        }
        Ok(vec![GeneratedImage::parse(payload)?])
    }

    async fn download(&self, url: &str) -> Result<Bytes, GenerationError> {
        download_with(&self.client, url).await
    }
}
