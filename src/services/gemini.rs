//! Gemini (Google) image editing and generation service.

use crate::error::{parse_retry_after, sanitize_error_message, Result, RetouchError};
use crate::media::{ImageArtifact, ImageFormat};
use crate::services::ImageService;
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gemini image model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeminiImageModel {
    /// Gemini 2.5 Flash Image (fast, economical).
    #[default]
    Flash,
    /// Gemini 3 Pro Image (highest quality).
    Pro,
}

impl GeminiImageModel {
    /// Returns the API model identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flash => "gemini-2.5-flash-image",
            Self::Pro => "nano-banana-pro-preview",
        }
    }
}

/// Builder for [`GeminiImageService`].
#[derive(Debug, Clone, Default)]
pub struct GeminiImageServiceBuilder {
    api_key: Option<String>,
    model: GeminiImageModel,
}

impl GeminiImageServiceBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `GOOGLE_API_KEY` env var.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the Gemini model variant.
    pub fn model(mut self, model: GeminiImageModel) -> Self {
        self.model = model;
        self
    }

    /// Builds the service, resolving the API key.
    pub fn build(self) -> Result<GeminiImageService> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .ok_or_else(|| {
                RetouchError::Auth("GOOGLE_API_KEY not set and no API key provided".into())
            })?;

        Ok(GeminiImageService {
            client: reqwest::Client::new(),
            api_key,
            model: self.model,
        })
    }
}

/// Image service backed by the Gemini `generateContent` endpoint.
pub struct GeminiImageService {
    client: reqwest::Client,
    api_key: String,
    model: GeminiImageModel,
}

impl GeminiImageService {
    /// Creates a new [`GeminiImageServiceBuilder`].
    pub fn builder() -> GeminiImageServiceBuilder {
        GeminiImageServiceBuilder::new()
    }

    /// Sends a generateContent request and extracts the first image part.
    async fn generate_content(&self, parts: Vec<GeminiRequestPart>) -> Result<ImageArtifact> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model.as_str(),
        );

        let body = GeminiRequest {
            contents: vec![GeminiContent { parts }],
            generation_config: GeminiConfig {
                response_modalities: vec!["IMAGE".to_string()],
            },
        };

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

        let gemini_response: GeminiResponse = response.json().await?;

        // Blocked prompts come back as HTTP 200 with prompt_feedback set
        if let Some(ref feedback) = gemini_response.prompt_feedback {
            if let Some(ref reason) = feedback.block_reason {
                let msg = feedback
                    .block_reason_message
                    .clone()
                    .unwrap_or_else(|| format!("Prompt blocked: {}", reason));
                return Err(RetouchError::ContentBlocked(msg));
            }
        }

        let candidate = gemini_response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| {
                RetouchError::UnexpectedResponse("No candidates in Gemini response".into())
            })?;

        if let Some(ref finish_reason) = candidate.finish_reason {
            match finish_reason.as_str() {
                "SAFETY"
                | "IMAGE_SAFETY"
                | "IMAGE_PROHIBITED_CONTENT"
                | "IMAGE_RECITATION"
                | "RECITATION"
                | "PROHIBITED_CONTENT"
                | "BLOCKLIST" => {
                    return Err(RetouchError::ContentBlocked(format!(
                        "Content blocked by Gemini safety filter: {}",
                        finish_reason
                    )));
                }
                "IMAGE_OTHER" | "NO_IMAGE" => {
                    return Err(RetouchError::UnexpectedResponse(format!(
                        "Generation failed: {}. Try a different prompt.",
                        finish_reason
                    )));
                }
                _ => {} // STOP, MAX_TOKENS, etc. are normal
            }
        }

        let content = candidate.content.ok_or_else(|| {
            RetouchError::UnexpectedResponse("No content in Gemini candidate".into())
        })?;

        let inline_data = content
            .parts
            .into_iter()
            .find_map(|p| p.inline_data)
            .ok_or_else(|| {
                RetouchError::UnexpectedResponse("No image data in Gemini response".into())
            })?;

        let data = base64::engine::general_purpose::STANDARD
            .decode(&inline_data.data)
            .map_err(|e| RetouchError::Decode(e.to_string()))?;

        let format = ImageFormat::from_mime_type(&inline_data.mime_type)
            .or_else(|| ImageFormat::from_magic_bytes(&data))
            .unwrap_or_default();

        Ok(ImageArtifact::new(data, format))
    }

    fn parse_error(
        &self,
        status: u16,
        text: &str,
        headers: &reqwest::header::HeaderMap,
    ) -> RetouchError {
        let text = sanitize_error_message(text);
        if status == 402 {
            return RetouchError::Billing(
                "Gemini billing issue: enable billing at https://aistudio.google.com".into(),
            );
        }
        if status == 404 {
            return RetouchError::InvalidRequest(
                "Model not found. Verify the model name is correct.".into(),
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
}

#[async_trait]
impl ImageService for GeminiImageService {
    async fn edit(&self, image: &ImageArtifact, instruction: &str) -> Result<ImageArtifact> {
        tracing::debug!(model = self.model.as_str(), "submitting image edit");
        let parts = vec![
            GeminiRequestPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type: image.mime_type().to_string(),
                    data: image.to_base64(),
                },
            },
            GeminiRequestPart::Text {
                text: instruction.to_string(),
            },
        ];
        self.generate_content(parts).await
    }

    async fn generate(&self, prompt: &str) -> Result<ImageArtifact> {
        tracing::debug!(model = self.model.as_str(), "submitting image generation");
        let parts = vec![GeminiRequestPart::Text {
            text: prompt.to_string(),
        }];
        self.generate_content(parts).await
    }
}

// Request/Response types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiRequestPart>,
}

/// A part in a Gemini request - can be text or inline image data.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiRequestPart {
    Text { text: String },
    InlineData { inline_data: GeminiInlineData },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiConfig {
    response_modalities: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_as_str() {
        assert_eq!(GeminiImageModel::Flash.as_str(), "gemini-2.5-flash-image");
        assert_eq!(GeminiImageModel::Pro.as_str(), "nano-banana-pro-preview");
    }

    #[test]
    fn test_builder_with_explicit_key() {
        let service = GeminiImageServiceBuilder::new()
            .api_key("test-key")
            .model(GeminiImageModel::Flash)
            .build();
        assert!(service.is_ok());
    }

    #[test]
    fn test_request_serialization_uses_camel_case() {
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiRequestPart::Text {
                    text: "a puppy".into(),
                }],
            }],
            generation_config: GeminiConfig {
                response_modalities: vec!["IMAGE".into()],
            },
        };
        let json = serde_json::to_value(&body).unwrap();

        assert!(json.get("generationConfig").is_some());
        assert!(json.get("generation_config").is_none());
        assert_eq!(json["contents"][0]["parts"][0]["text"], "a puppy");
    }

    #[test]
    fn test_edit_request_part_serialization() {
        let part = GeminiRequestPart::InlineData {
            inline_data: GeminiInlineData {
                mime_type: "image/png".into(),
                data: "iVBORw0KGgo=".into(),
            },
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["inline_data"]["mimeType"], "image/png");
        assert_eq!(json["inline_data"]["data"], "iVBORw0KGgo=");
    }

    #[test]
    fn test_response_deserialization() {
        let json = r#"{
            "candidates": [{
                "content": {
                    "parts": [{
                        "inlineData": {
                            "mimeType": "image/png",
                            "data": "iVBORw0KGgo="
                        }
                    }]
                },
                "finishReason": "STOP"
            }]
        }"#;
        let resp: GeminiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.candidates.len(), 1);
        assert_eq!(resp.candidates[0].finish_reason.as_deref(), Some("STOP"));

        let content = resp.candidates[0].content.as_ref().unwrap();
        let inline = content.parts[0].inline_data.as_ref().unwrap();
        assert_eq!(inline.mime_type, "image/png");
    }

    #[test]
    fn test_response_with_prompt_feedback_block() {
        let json = r#"{
            "candidates": [],
            "promptFeedback": {
                "blockReason": "SAFETY",
                "blockReasonMessage": "Prompt was blocked due to safety"
            }
        }"#;
        let resp: GeminiResponse = serde_json::from_str(json).unwrap();
        assert!(resp.candidates.is_empty());
        let feedback = resp.prompt_feedback.unwrap();
        assert_eq!(feedback.block_reason.as_deref(), Some("SAFETY"));
    }

    #[test]
    fn test_parse_error_classification() {
        let service = GeminiImageServiceBuilder::new()
            .api_key("test-key")
            .build()
            .unwrap();
        let headers = reqwest::header::HeaderMap::new();

        assert!(matches!(
            service.parse_error(401, "bad key", &headers),
            RetouchError::Auth(_)
        ));
        assert!(matches!(
            service.parse_error(429, "slow down", &headers),
            RetouchError::RateLimited { .. }
        ));
        assert!(matches!(
            service.parse_error(400, "request blocked by safety system", &headers),
            RetouchError::ContentBlocked(_)
        ));
        assert!(matches!(
            service.parse_error(500, "boom", &headers),
            RetouchError::Api { status: 500, .. }
        ));
    }

    #[test]
    fn test_parse_error_reads_retry_after_header() {
        let service = GeminiImageServiceBuilder::new()
            .api_key("test-key")
            .build()
            .unwrap();
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "30".parse().unwrap());

        match service.parse_error(429, "quota", &headers) {
            RetouchError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(30)));
            }
            other => panic!("expected RateLimited, got: {other:?}"),
        }
    }
}
