//! Veo (Google) video generation service.
//!
//! Generation is a long-running operation: submit, poll until done, then
//! download the finished video through the returned handle.

use crate::error::{
    parse_retry_after, sanitize_error_message, Result, RetouchError, STALE_KEY_SIGNATURE,
};
use crate::media::{ImageArtifact, VideoArtifact};
use crate::services::{VideoHandle, VideoService};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Veo model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VeoModel {
    /// Veo 3.1 Preview - Google's video generation model.
    #[default]
    Veo31Preview,
}

impl VeoModel {
    /// Returns the API model identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Veo31Preview => "veo-3.1-generate-preview",
        }
    }
}

/// Builder for [`VeoVideoService`].
#[derive(Debug, Clone)]
pub struct VeoVideoServiceBuilder {
    api_key: Option<String>,
    model: VeoModel,
    poll_interval: Duration,
    timeout: Duration,
}

impl Default for VeoVideoServiceBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            model: VeoModel::default(),
            poll_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(600), // 10 minutes for video
        }
    }
}

impl VeoVideoServiceBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `GOOGLE_API_KEY` env var.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the Veo model variant.
    pub fn model(mut self, model: VeoModel) -> Self {
        self.model = model;
        self
    }

    /// Sets the polling interval for the long-running operation.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the maximum time to wait for generation.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the service, resolving the API key.
    pub fn build(self) -> Result<VeoVideoService> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .ok_or_else(|| {
                RetouchError::Auth("GOOGLE_API_KEY not set and no API key provided".into())
            })?;

        Ok(VeoVideoService {
            client: reqwest::Client::new(),
            api_key,
            model: self.model,
            poll_interval: self.poll_interval,
            timeout: self.timeout,
        })
    }
}

/// Video service backed by the Veo `predictLongRunning` endpoint.
pub struct VeoVideoService {
    client: reqwest::Client,
    api_key: String,
    model: VeoModel,
    poll_interval: Duration,
    timeout: Duration,
}

impl VeoVideoService {
    /// Creates a new [`VeoVideoServiceBuilder`].
    pub fn builder() -> VeoVideoServiceBuilder {
        VeoVideoServiceBuilder::new()
    }

    /// Submits a generation request and returns the operation name.
    async fn submit(&self, prompt: &str, seed: Option<&ImageArtifact>) -> Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:predictLongRunning",
            self.model.as_str(),
        );

        let body = VeoRequest::new(prompt, seed);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status.as_u16(), &text, &headers));
        }

        let operation: VeoOperationResponse = response.json().await?;
        Ok(operation.name)
    }

    /// Polls the operation until done and returns the video URI.
    async fn poll(&self, operation_name: &str) -> Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/{}",
            operation_name,
        );
        let start = Instant::now();

        loop {
            if start.elapsed() > self.timeout {
                return Err(RetouchError::Timeout(self.timeout));
            }

            let response = self
                .client
                .get(&url)
                .header("x-goog-api-key", &self.api_key)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let headers = response.headers().clone();
                let text = response.text().await.unwrap_or_default();
                return Err(self.parse_error(status.as_u16(), &text, &headers));
            }

            let operation: VeoOperationResponse = response.json().await?;

            if operation.done.unwrap_or(false) {
                return extract_video_uri(operation);
            }

            if let Some(err) = operation.error {
                return Err(RetouchError::VideoGeneration(
                    err.message.unwrap_or_else(|| "Unknown error".into()),
                ));
            }

            tracing::debug!(
                operation = %operation_name,
                elapsed_secs = start.elapsed().as_secs(),
                "polling Veo video generation"
            );
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    pub(crate) fn parse_error(
        &self,
        status: u16,
        text: &str,
        headers: &reqwest::header::HeaderMap,
    ) -> RetouchError {
        let text = sanitize_error_message(text);
        if status == 402 {
            return RetouchError::Billing(
                "Veo billing issue: enable billing at https://aistudio.google.com".into(),
            );
        }
        if status == 404 {
            // A stale or revoked key also comes back as 404; its body must
            // survive so the session can invalidate cached authorization
            if text.contains(STALE_KEY_SIGNATURE) {
                return RetouchError::Auth(text);
            }
            return RetouchError::InvalidRequest(
                "Veo API not available. Veo requires a paid-tier API key with billing enabled. \
                 Enable it at https://aistudio.google.com by selecting a Google Cloud project with billing."
                    .to_string(),
            );
        }
        if status == 429 {
            let retry_after = parse_retry_after(headers).map(Duration::from_secs);
            return RetouchError::RateLimited { retry_after };
        }
        if status == 401 || status == 403 {
            return RetouchError::Auth(text);
        }
        let lower = text.to_lowercase();
        if lower.contains("safety")
            || lower.contains("blocked")
            || lower.contains("content_policy")
            || lower.contains("prohibited")
        {
            return RetouchError::ContentBlocked(text);
        }
        RetouchError::Api {
            status,
            message: text,
        }
    }

    /// The download URL authenticates with the API key as a query parameter.
    fn download_url(&self, uri: &str) -> String {
        if uri.contains('?') {
            format!("{}&key={}", uri, self.api_key)
        } else {
            format!("{}?key={}", uri, self.api_key)
        }
    }
}

#[async_trait]
impl VideoService for VeoVideoService {
    async fn generate(
        &self,
        prompt: &str,
        seed: Option<&ImageArtifact>,
    ) -> Result<VideoHandle> {
        let operation_name = self.submit(prompt, seed).await?;
        tracing::debug!(operation = %operation_name, "submitted video generation request");

        let uri = self.poll(&operation_name).await?;
        tracing::debug!(url = %uri, "video generation complete");

        Ok(VideoHandle {
            uri,
            mime_type: "video/mp4".to_string(),
        })
    }

    async fn fetch(&self, handle: &VideoHandle) -> Result<VideoArtifact> {
        if handle.uri.starts_with("gs://") {
            return Err(RetouchError::VideoGeneration(format!(
                "Veo returned a Google Cloud Storage URI ({}) which cannot be downloaded directly.",
                handle.uri
            )));
        }

        let response = self.client.get(self.download_url(&handle.uri)).send().await?;

        if !response.status().is_success() {
            return Err(RetouchError::Api {
                status: response.status().as_u16(),
                message: "Failed to download video".into(),
            });
        }

        let data = response.bytes().await?.to_vec();
        Ok(VideoArtifact::new(data, handle.mime_type.clone()))
    }
}

/// Extract the video URI from a completed operation response.
fn extract_video_uri(operation: VeoOperationResponse) -> Result<String> {
    // Check for error FIRST before checking response
    if let Some(err) = operation.error {
        return Err(RetouchError::VideoGeneration(
            err.message.unwrap_or_else(|| "Unknown error".into()),
        ));
    }

    if let Some(resp) = operation.response {
        if let Some(gen_resp) = resp.generate_video_response {
            // Check if content was filtered
            if gen_resp.rai_media_filtered_count.unwrap_or(0) > 0
                && gen_resp
                    .generated_samples
                    .as_ref()
                    .is_none_or(|s| s.is_empty())
            {
                return Err(RetouchError::ContentBlocked(
                    "Video was filtered by Veo safety filters".into(),
                ));
            }

            if let Some(samples) = gen_resp.generated_samples {
                if let Some(first) = samples.into_iter().next() {
                    if let Some(uri) = first.video.and_then(|v| v.uri) {
                        return Ok(uri);
                    }
                }
            }
        }
    }
    Err(RetouchError::UnexpectedResponse(
        "Video generation completed but no video URL returned".into(),
    ))
}

// ── Wire format ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VeoRequest {
    instances: Vec<VeoInstance>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VeoInstance {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<VeoMediaData>,
}

/// Media payload wrapping `inlineData`, used for the conditioning seed image.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct VeoMediaData {
    inline_data: VeoInlineData,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct VeoInlineData {
    mime_type: String,
    data: String,
}

impl VeoRequest {
    fn new(prompt: &str, seed: Option<&ImageArtifact>) -> Self {
        let image = seed.map(|img| VeoMediaData {
            inline_data: VeoInlineData {
                mime_type: img.mime_type().to_string(),
                data: img.to_base64(),
            },
        });

        Self {
            instances: vec![VeoInstance {
                prompt: prompt.to_string(),
                image,
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
struct VeoOperationResponse {
    name: String,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    response: Option<VeoVideoResponse>,
    #[serde(default)]
    error: Option<VeoError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VeoVideoResponse {
    #[serde(default)]
    generate_video_response: Option<VeoGenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VeoGenerateVideoResponse {
    #[serde(default)]
    generated_samples: Option<Vec<VeoGeneratedSample>>,
    #[serde(default)]
    rai_media_filtered_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct VeoGeneratedSample {
    #[serde(default)]
    video: Option<VeoVideo>,
}

#[derive(Debug, Deserialize)]
struct VeoVideo {
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VeoError {
    #[serde(default)]
    message: Option<String>,
}
