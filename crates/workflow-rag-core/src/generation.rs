//! Generative-model provider trait.
//!
//! Concrete providers (Gemini, OpenAI, Ollama) live in the app crate.

use anyhow::Result;
use async_trait::async_trait;

/// Model identifier used when an llmEngine node does not name one.
pub const DEFAULT_MODEL: &str = "models/gemini-2.0-flash";

/// A single prompt submitted to a [`GenerationProvider`].
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub temperature: f32,
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Short provider name used in logs (e.g. `"gemini"`).
    fn name(&self) -> &str;

    /// Run the prompt and return the model's text. An empty string is a
    /// valid answer; callers decide how to present it.
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String>;
}
