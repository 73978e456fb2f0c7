//! Pipeline executor.
//!
//! A pipeline is an ordered list of [`PipelineStep`]s. The executor seeds an
//! [`ExecutionContext`] with the trimmed query and folds the steps over it
//! strictly in the order given:
//!
//! ```text
//! ctx0 = ExecutionContext::new(query)
//! ctx1 = step0(ctx0) … ctxN = stepN-1(ctxN-1)
//! response = ctxN.final_output or ctxN.working_text
//! ```
//!
//! # Failure semantics
//!
//! - Retrieval is best effort. Any knowledge-base failure leaves an empty
//!   context and the run continues.
//! - Generation is fail-fast. A provider error aborts the run with
//!   [`PipelineError::Generation`] and no partial result.
//! - Unknown step types are skipped but still reported in
//!   [`PipelineOutcome::steps_executed`].

mod context;
mod step;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::collections::CollectionStore;
use crate::error::PipelineError;
use crate::generation::{GenerationProvider, GenerationRequest, DEFAULT_MODEL};

pub use context::{ExecutionContext, EMPTY_MODEL_OUTPUT};
pub use step::{
    parse_steps, KnowledgeBaseConfig, LlmEngineConfig, OutputConfig, PipelineStep,
    UserQueryConfig, DEFAULT_DISPLAY_NAME, DEFAULT_PROMPT, DEFAULT_SOURCE_NAME,
    DEFAULT_TEMPERATURE, DEFAULT_TOP_K,
};

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutcome {
    pub response_text: String,
    /// Type strings of every step in input order, unknown ones included.
    pub steps_executed: Vec<String>,
    /// True when the last retrieval produced any text.
    pub context_used: bool,
    /// Character count of the last retrieved context.
    pub context_length: usize,
    pub rebuilt_collections: Vec<String>,
}

/// Runs pipelines against a collection store and a generation provider.
#[derive(Clone)]
pub struct PipelineExecutor {
    collections: Arc<CollectionStore>,
    generator: Arc<dyn GenerationProvider>,
    default_model: String,
}

impl PipelineExecutor {
    pub fn new(collections: Arc<CollectionStore>, generator: Arc<dyn GenerationProvider>) -> Self {
        Self {
            collections,
            generator,
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Model used by llmEngine steps that do not name one.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub async fn execute(
        &self,
        query: &str,
        steps: &[PipelineStep],
    ) -> Result<PipelineOutcome, PipelineError> {
        if query.trim().is_empty() {
            return Err(PipelineError::MalformedRequest(
                "query must not be empty".to_string(),
            ));
        }
        if steps.is_empty() {
            return Err(PipelineError::MalformedRequest(
                "pipeline must contain at least one step".to_string(),
            ));
        }

        let mut ctx = ExecutionContext::new(query);
        for (index, step) in steps.iter().enumerate() {
            debug!(index, node = step.kind(), "Running pipeline step");
            ctx = self.apply(ctx, step).await?;
        }

        let outcome = PipelineOutcome {
            response_text: ctx.response_text().to_string(),
            steps_executed: steps.iter().map(|s| s.kind().to_string()).collect(),
            context_used: !ctx.retrieved_context.is_empty(),
            context_length: ctx.retrieved_context.chars().count(),
            rebuilt_collections: ctx.rebuilt_collections,
        };
        info!(
            steps = outcome.steps_executed.len(),
            context_length = outcome.context_length,
            "Pipeline completed"
        );
        Ok(outcome)
    }

    async fn apply(
        &self,
        ctx: ExecutionContext,
        step: &PipelineStep,
    ) -> Result<ExecutionContext, PipelineError> {
        match step {
            PipelineStep::UserQuery(cfg) => Ok(ctx.apply_user_query(cfg)),
            PipelineStep::KnowledgeBase(cfg) => Ok(self.retrieve(ctx, cfg).await),
            PipelineStep::LlmEngine(cfg) => self.generate(ctx, cfg).await,
            PipelineStep::Output(cfg) => Ok(ctx.apply_output(cfg)),
            PipelineStep::Unknown(kind) => {
                debug!(node = %kind, "Skipping unknown step type");
                Ok(ctx)
            }
        }
    }

    async fn retrieve(&self, ctx: ExecutionContext, cfg: &KnowledgeBaseConfig) -> ExecutionContext {
        let collection = cfg.source_name.as_str();
        let handle = match self.collections.open_knowledge_base(collection).await {
            Ok(handle) => handle,
            Err(err) => {
                warn!(collection, error = %err, "Retrieval failed; continuing without context");
                return ctx.with_retrieved(String::new());
            }
        };
        let ctx = handle
            .rebuilt
            .iter()
            .fold(ctx, |ctx, name| ctx.record_rebuild(name));

        match self
            .collections
            .query(collection, &ctx.working_text, cfg.top_k)
            .await
        {
            Ok(texts) => {
                debug!(collection, hits = texts.len(), "Retrieved context");
                ctx.with_retrieved(texts.join("\n"))
            }
            Err(err) => {
                warn!(collection, error = %err, "Retrieval failed; continuing without context");
                ctx.with_retrieved(String::new())
            }
        }
    }

    async fn generate(
        &self,
        ctx: ExecutionContext,
        cfg: &LlmEngineConfig,
    ) -> Result<ExecutionContext, PipelineError> {
        let model = cfg.model_or(&self.default_model);
        let prompt = ctx.prompt(&cfg.custom_prompt);
        let request = GenerationRequest {
            model,
            prompt: &prompt,
            temperature: cfg.temperature,
        };

        match self.generator.generate(&request).await {
            Ok(text) => {
                debug!(model, provider = self.generator.name(), "Generation finished");
                Ok(ctx.with_answer(text))
            }
            Err(err) => Err(PipelineError::Generation {
                model: model.to_string(),
                message: format!("{:#}", err),
            }),
        }
    }
}
