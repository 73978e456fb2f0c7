//! Typed pipeline steps.
//!
//! Steps arrive on the wire as `{"type": "...", "config": {...}}`. Each
//! known `type` maps to a variant with a typed configuration; anything else
//! becomes [`PipelineStep::Unknown`] so newer front-ends can send node kinds
//! this engine does not implement yet.
//!
//! Configuration objects are parsed leniently in two ways:
//!
//! - Unknown keys are ignored. Visual editors ship UI state (labels,
//!   positions, status flags) inside `config`.
//! - Numeric fields accept JSON numbers or numeric strings (`"5"`). A value
//!   that is neither fails the whole request at parse time.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;

pub const DEFAULT_SOURCE_NAME: &str = "default_kb";
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_PROMPT: &str = "Answer the question clearly and concisely.";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_DISPLAY_NAME: &str = "Output";
pub const DEFAULT_RESPONSE_FORMAT: &str = "text";

/// One node of a linear pipeline.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawStep")]
pub enum PipelineStep {
    UserQuery(UserQueryConfig),
    KnowledgeBase(KnowledgeBaseConfig),
    LlmEngine(LlmEngineConfig),
    Output(OutputConfig),
    /// A node type this engine does not know. Executed as a no-op.
    Unknown(String),
}

impl PipelineStep {
    /// The wire `type` string, echoed back in `steps_executed`.
    pub fn kind(&self) -> &str {
        match self {
            PipelineStep::UserQuery(_) => "userQuery",
            PipelineStep::KnowledgeBase(_) => "knowledgeBase",
            PipelineStep::LlmEngine(_) => "llmEngine",
            PipelineStep::Output(_) => "output",
            PipelineStep::Unknown(kind) => kind,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserQueryConfig {
    /// Framing text prepended to the query.
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KnowledgeBaseConfig {
    pub source_name: String,
    #[serde(deserialize_with = "lenient_count")]
    pub top_k: usize,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            source_name: DEFAULT_SOURCE_NAME.to_string(),
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LlmEngineConfig {
    /// `None` or blank means the executor's default model.
    pub model: Option<String>,
    pub custom_prompt: String,
    #[serde(deserialize_with = "lenient_float")]
    pub temperature: f32,
}

impl Default for LlmEngineConfig {
    fn default() -> Self {
        Self {
            model: None,
            custom_prompt: DEFAULT_PROMPT.to_string(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl LlmEngineConfig {
    /// Model to call, falling back to `default` when none is configured.
    pub fn model_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(default)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OutputConfig {
    pub display_name: String,
    /// Presentation hint for clients. The engine always returns text.
    pub response_format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            response_format: DEFAULT_RESPONSE_FORMAT.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct RawStep {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    config: Value,
}

impl TryFrom<RawStep> for PipelineStep {
    type Error = String;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        let config = match raw.config {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        let step = match raw.kind.as_str() {
            "userQuery" => PipelineStep::UserQuery(parse_config(&raw.kind, config)?),
            "knowledgeBase" => PipelineStep::KnowledgeBase(parse_config(&raw.kind, config)?),
            "llmEngine" => PipelineStep::LlmEngine(parse_config(&raw.kind, config)?),
            "output" => PipelineStep::Output(parse_config(&raw.kind, config)?),
            _ => PipelineStep::Unknown(raw.kind),
        };
        Ok(step)
    }
}

fn parse_config<T: DeserializeOwned>(kind: &str, config: Value) -> Result<T, String> {
    serde_json::from_value(config).map_err(|e| format!("invalid config for {} step: {}", kind, e))
}

/// Parse a pipeline definition (a JSON array of steps).
pub fn parse_steps(value: Value) -> Result<Vec<PipelineStep>, serde_json::Error> {
    serde_json::from_value(value)
}

fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let parsed = match &value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| de::Error::custom(format!("expected a non-negative integer, got {}", value)))
}

fn lenient_float<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let parsed = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|f| f.is_finite())
        .map(|f| f as f32)
        .ok_or_else(|| de::Error::custom(format!("expected a number, got {}", value)))
}
