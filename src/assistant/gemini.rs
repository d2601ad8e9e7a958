use async_trait::async_trait;
use metrics::counter;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::TextGenerator;
use crate::config::AppConfig;
use crate::errors::ServiceError;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Connection settings for the Gemini `generateContent` endpoint
#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub api_version: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl From<&AppConfig> for GeminiConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            api_key: cfg.gemini_api_key.clone(),
            model: cfg.gemini_model.clone(),
            api_version: cfg.gemini_api_version.clone(),
            base_url: cfg.gemini_base_url.clone(),
            timeout: cfg.gemini_timeout(),
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    /// All text parts of all candidates, concatenated.
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .filter_map(|part| part.text)
            .collect()
    }
}

/// Single-attempt client for Google's Gemini text generation API
#[derive(Clone, Debug)]
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, ServiceError> {
        if config.api_key.trim().is_empty() {
            return Err(ServiceError::ConfigurationError(
                "gemini_api_key is not set".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                ServiceError::ConfigurationError(format!("Failed to build HTTP client: {}", e))
            })?;
        Ok(Self { client, config })
    }

    pub fn from_app_config(cfg: &AppConfig) -> Result<Self, ServiceError> {
        Self::new(GeminiConfig::from(cfg))
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.api_version,
            self.config.model
        )
    }

    async fn call(&self, prompt: &str) -> Result<String, ServiceError> {
        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, self.config.api_key.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::UpstreamError("Gemini request timed out".to_string())
                } else {
                    ServiceError::UpstreamError(format!("Gemini request failed: {}", e))
                }
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!(status = status.as_u16(), "Gemini rejected the configured credential");
            return Err(ServiceError::ConfigurationError(
                "Gemini rejected the configured API key".to_string(),
            ));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), body = %detail, "Gemini error body");
            return Err(ServiceError::UpstreamError(format!(
                "Gemini returned HTTP {}",
                status.as_u16()
            )));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            ServiceError::UpstreamError(format!("Failed to parse Gemini response: {}", e))
        })?;
        let text = parsed.text();
        if text.trim().is_empty() {
            return Err(ServiceError::UpstreamError(
                "Gemini returned an empty response".to_string(),
            ));
        }
        Ok(text)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    #[instrument(skip(self, prompt), fields(model = %self.config.model, prompt_len = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        counter!("service_desk.assistant.requests", 1);
        let result = self.call(prompt).await;
        if result.is_err() {
            counter!("service_desk.assistant.failures", 1);
        }
        result
    }
}
