//! Gemini `generateContent` backend.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use tracing::debug;

use super::ConsensusModel;
use crate::CoreError;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Low temperature keeps the merge deterministic; JSON MIME type suppresses
/// prose wrappers (though truncation still happens at the token cap).
const TEMPERATURE: f64 = 0.1;
const MAX_OUTPUT_TOKENS: u32 = 16384;

pub struct GeminiModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

impl GeminiModel {
    pub fn new(client: reqwest::Client, api_key: String, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
        }
    }
}

impl ConsensusModel for GeminiModel {
    fn name(&self) -> &str {
        &self.model
    }

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, CoreError>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{}/{}:generateContent", API_BASE, self.model);
            let body = GenerateRequest {
                contents: vec![Content {
                    parts: vec![Part { text: prompt }],
                }],
                generation_config: GenerationConfig {
                    temperature: TEMPERATURE,
                    max_output_tokens: MAX_OUTPUT_TOKENS,
                    response_mime_type: "application/json",
                },
            };

            let resp = self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                let detail = resp.text().await.unwrap_or_default();
                return Err(CoreError::Model(format!(
                    "{}: HTTP {} {}",
                    self.model,
                    status,
                    detail.chars().take(200).collect::<String>()
                )));
            }

            let data: serde_json::Value = resp.json().await?;
            let text: String = data["candidates"][0]["content"]["parts"]
                .as_array()
                .map(|parts| {
                    parts
                        .iter()
                        .filter_map(|p| p["text"].as_str())
                        .collect::<Vec<_>>()
                        .join("")
                })
                .unwrap_or_default();

            if text.is_empty() {
                return Err(CoreError::Model(format!(
                    "{}: response carried no text parts",
                    self.model
                )));
            }
            debug!(model = %self.model, bytes = text.len(), "consensus response received");
            Ok(text)
        })
    }
}
