//! TOML configuration.
//!
//! Every section has defaults, so an empty file is a valid configuration
//! (embeddings and generation then default to Gemini, which needs
//! `GEMINI_API_KEY` in the environment). Validation happens once in
//! [`load_config`]; the rest of the crate trusts the parsed values.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use workflow_rag_core::chunk::DEFAULT_CHUNK_SIZE;
use workflow_rag_core::generation::DEFAULT_MODEL;

/// Gemini embedding model used when none is configured.
pub const GEMINI_EMBEDDING_MODEL: &str = "models/text-embedding-004";
const GEMINI_EMBEDDING_DIMS: usize = 768;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub reset: ResetConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/wfr.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root under which uploads are kept as `<collection>/<filename>`.
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
        }
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("./data/uploaded_files")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Chunk width in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// Required for openai and ollama; gemini and local have defaults.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    /// Base URL override (Ollama host, OpenAI-compatible proxy, or Gemini endpoint).
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_embedding_retries(),
            timeout_secs: default_embedding_timeout(),
            url: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "gemini".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_retries() -> u32 {
    5
}
fn default_embedding_timeout() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Configured model, or the provider's default when it has one.
    pub fn resolved_model(&self) -> Option<String> {
        match (&self.model, self.provider.as_str()) {
            (Some(model), _) => Some(model.clone()),
            (None, "gemini") => Some(GEMINI_EMBEDDING_MODEL.to_string()),
            (None, _) => None,
        }
    }

    pub fn resolved_dims(&self) -> Option<usize> {
        match (self.dims, self.provider.as_str()) {
            (Some(dims), _) => Some(dims),
            (None, "gemini") if self.model.is_none() => Some(GEMINI_EMBEDDING_DIMS),
            (None, _) => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    /// Model for llmEngine nodes that do not name one.
    #[serde(default = "default_generation_model")]
    pub default_model: String,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            default_model: default_generation_model(),
            max_retries: default_generation_retries(),
            timeout_secs: default_generation_timeout(),
            url: None,
        }
    }
}

fn default_generation_provider() -> String {
    "gemini".to_string()
}
fn default_generation_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_generation_retries() -> u32 {
    3
}
fn default_generation_timeout() -> u64 {
    60
}

/// Bounded retry for the destructive steps of a full reset.
#[derive(Debug, Deserialize, Clone)]
pub struct ResetConfig {
    #[serde(default = "default_reset_attempts")]
    pub attempts: u32,
    #[serde(default = "default_reset_pause_ms")]
    pub pause_ms: u64,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            attempts: default_reset_attempts(),
            pause_ms: default_reset_pause_ms(),
        }
    }
}

impl ResetConfig {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

fn default_reset_attempts() -> u32 {
    3
}
fn default_reset_pause_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Upper bound on a multipart upload request body.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

/// Parse and validate a configuration string.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }

    if config.reset.attempts == 0 {
        anyhow::bail!("reset.attempts must be >= 1");
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    let embedding = &config.embedding;
    if embedding.is_enabled() {
        let dims_required = embedding.provider != "local";
        if embedding.dims == Some(0) || (dims_required && embedding.resolved_dims().is_none()) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if embedding.provider != "local" && embedding.resolved_model().is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "gemini" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, gemini, or local.",
            other
        ),
    }

    match config.generation.provider.as_str() {
        "disabled" | "openai" | "ollama" | "gemini" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled, openai, ollama, or gemini.",
            other
        ),
    }

    if config.generation.default_model.trim().is_empty() {
        anyhow::bail!("generation.default_model must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_parses() {
        let config = parse_config(include_str!("../config/wfr.example.toml")).unwrap();
        assert_eq!(config.server.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(config.reset.pause(), Duration::from_millis(1000));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.embedding.provider, "gemini");
        assert_eq!(config.embedding.resolved_dims(), Some(768));
        assert_eq!(
            config.embedding.resolved_model().as_deref(),
            Some(GEMINI_EMBEDDING_MODEL)
        );
        assert_eq!(config.generation.default_model, "models/gemini-2.0-flash");
        assert_eq!(config.reset.attempts, 3);
        assert_eq!(config.reset.pause(), Duration::from_secs(1));
        assert_eq!(config.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = parse_config(
            r#"
            [db]
            path = "/tmp/x.sqlite"

            [storage]
            uploads_dir = "/tmp/uploads"

            [embedding]
            provider = "ollama"
            model = "nomic-embed-text"
            dims = 768
            url = "http://gpu-box:11434"

            [generation]
            provider = "disabled"
            "#,
        )
        .unwrap();
        assert_eq!(config.db.path, PathBuf::from("/tmp/x.sqlite"));
        assert_eq!(config.storage.uploads_dir, PathBuf::from("/tmp/uploads"));
        assert_eq!(config.embedding.url.as_deref(), Some("http://gpu-box:11434"));
        assert_eq!(config.generation.provider, "disabled");
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(parse_config("[chunking]\nchunk_size = 0").is_err());
        assert!(parse_config("[reset]\nattempts = 0").is_err());
        assert!(parse_config("[embedding]\nprovider = \"cohere\"").is_err());
        assert!(parse_config("[generation]\nprovider = \"claude\"").is_err());
        assert!(parse_config("[embedding]\nprovider = \"openai\"\ndims = 0").is_err());
        assert!(parse_config("[embedding]\nprovider = \"openai\"\ndims = 1536").is_err());
        assert!(parse_config("[embedding]\nprovider = \"gemini\"\nmodel = \"models/other\"").is_err());
    }

    #[test]
    fn test_disabled_embedding_needs_no_model() {
        let config = parse_config("[embedding]\nprovider = \"disabled\"\ndims = 0").unwrap();
        assert!(!config.embedding.is_enabled());
    }
}
