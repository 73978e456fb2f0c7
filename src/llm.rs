//! Generation provider implementations.
//!
//! Each provider turns a [`GenerationRequest`] into one HTTP call and
//! returns the model's text. Transient failures are retried through
//! [`crate::retry::post_json`]; everything else is reported to the
//! pipeline as a generation failure.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use workflow_rag_core::generation::{GenerationProvider, GenerationRequest};

use crate::config::GenerationConfig;
use crate::embedding::{api_key, gemini_model_path, GEMINI_BASE_URL, OLLAMA_BASE_URL};
use crate::retry;

const OPENAI_BASE_URL: &str = "https://api.openai.com";

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Rejects every request. Pipelines without an llmEngine step still run.
pub struct DisabledGenerator;

#[async_trait]
impl GenerationProvider for DisabledGenerator {
    fn name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _request: &GenerationRequest<'_>) -> Result<String> {
        bail!("Generation provider is disabled")
    }
}

/// Gemini `generateContent`. Requires `GEMINI_API_KEY`.
pub struct GeminiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    max_retries: u32,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            api_key: api_key("GEMINI_API_KEY")?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl GenerationProvider for GeminiGenerator {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
            "generationConfig": { "temperature": request.temperature },
        });
        let url = format!(
            "{}/v1beta/{}:generateContent",
            self.base_url,
            gemini_model_path(request.model)
        );

        let json = retry::post_json("Gemini", self.max_retries, &body, || {
            self.client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
        })
        .await?;
        parse_gemini_text(&json)
    }
}

/// Concatenated text parts of the first candidate. A response without
/// candidates (for example a safety block) yields an empty answer.
fn parse_gemini_text(json: &Value) -> Result<String> {
    if let Some(reason) = json
        .pointer("/promptFeedback/blockReason")
        .and_then(|r| r.as_str())
    {
        bail!("Gemini blocked the prompt: {}", reason);
    }

    let parts = match json.pointer("/candidates/0/content/parts") {
        Some(parts) => parts
            .as_array()
            .ok_or_else(|| anyhow!("Invalid Gemini response: parts is not an array"))?,
        None => return Ok(String::new()),
    };

    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<String>())
}

/// OpenAI chat completions. Requires `OPENAI_API_KEY`.
pub struct OpenAIGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    max_retries: u32,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            api_key: api_key("OPENAI_API_KEY")?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl GenerationProvider for OpenAIGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let body = json!({
            "model": request.model,
            "messages": [{ "role": "user", "content": request.prompt }],
            "temperature": request.temperature,
        });
        let url = format!("{}/v1/chat/completions", self.base_url);

        let json = retry::post_json("OpenAI", self.max_retries, &body, || {
            self.client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
        })
        .await?;
        parse_openai_text(&json)
    }
}

fn parse_openai_text(json: &Value) -> Result<String> {
    let message = json
        .pointer("/choices/0/message")
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices"))?;
    Ok(message
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or_default()
        .to_string())
}

/// Ollama `/api/generate` without streaming.
pub struct OllamaGenerator {
    client: reqwest::Client,
    url: String,
    max_retries: u32,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let body = json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": false,
            "options": { "temperature": request.temperature },
        });
        let url = format!("{}/api/generate", self.url);

        let json = retry::post_json("Ollama", self.max_retries, &body, || self.client.post(&url))
            .await?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing response"))
    }
}

/// Create the [`GenerationProvider`] named by `config.provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn GenerationProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "gemini" => Ok(Arc::new(GeminiGenerator::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gemini_text_joins_parts() {
        let json = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Hello, " }, { "text": "world" }] }
            }]
        });
        assert_eq!(parse_gemini_text(&json).unwrap(), "Hello, world");
    }

    #[test]
    fn test_parse_gemini_text_without_candidates_is_empty() {
        assert_eq!(parse_gemini_text(&json!({ "candidates": [] })).unwrap(), "");
    }

    #[test]
    fn test_parse_gemini_text_reports_block() {
        let json = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = parse_gemini_text(&json).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_parse_openai_text() {
        let json = json!({ "choices": [{ "message": { "role": "assistant", "content": "4" } }] });
        assert_eq!(parse_openai_text(&json).unwrap(), "4");

        let null_content = json!({ "choices": [{ "message": { "content": null } }] });
        assert_eq!(parse_openai_text(&null_content).unwrap(), "");

        assert!(parse_openai_text(&json!({})).is_err());
    }

    #[tokio::test]
    async fn test_disabled_generator_errors() {
        let request = GenerationRequest {
            model: "m",
            prompt: "p",
            temperature: 0.7,
        };
        assert!(DisabledGenerator.generate(&request).await.is_err());
    }

    #[test]
    fn test_create_generator_rejects_unknown() {
        let config = GenerationConfig {
            provider: "mystery".to_string(),
            ..GenerationConfig::default()
        };
        assert!(create_generator(&config).is_err());
    }
}
