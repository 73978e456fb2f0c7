//! Chat requests: validate, run the pipeline, label with the workflow name.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use workflow_rag_core::pipeline::parse_steps;
use workflow_rag_core::workflow::{display_name, WorkflowDirectory, UNNAMED_WORKFLOW};
use workflow_rag_core::{PipelineError, PipelineExecutor};

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub workflow_id: String,
    pub query: String,
    pub pipeline: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    pub workflow: String,
    pub steps_executed: Vec<String>,
    pub response: String,
    pub context_used: bool,
    pub context_length: usize,
    pub rebuilt_collections: Vec<String>,
}

pub struct ChatService {
    executor: PipelineExecutor,
    workflows: Arc<dyn WorkflowDirectory>,
}

impl ChatService {
    pub fn new(executor: PipelineExecutor, workflows: Arc<dyn WorkflowDirectory>) -> Self {
        Self { executor, workflows }
    }

    /// Handle a raw JSON chat body.
    pub async fn handle(&self, body: Value) -> Result<ChatResponse, PipelineError> {
        let request: ChatRequest = serde_json::from_value(body)
            .map_err(|e| PipelineError::MalformedRequest(format!("invalid chat request: {}", e)))?;
        self.chat(request).await
    }

    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, PipelineError> {
        let workflow_id = Uuid::parse_str(request.workflow_id.trim()).map_err(|_| {
            PipelineError::MalformedRequest(format!(
                "workflow_id '{}' is not a valid UUID",
                request.workflow_id
            ))
        })?;
        let steps = parse_steps(request.pipeline)
            .map_err(|e| PipelineError::MalformedRequest(format!("invalid pipeline: {}", e)))?;

        let outcome = self.executor.execute(&request.query, &steps).await?;

        let id = workflow_id.to_string();
        let workflow = match display_name(self.workflows.as_ref(), &id).await {
            Ok(name) => name,
            Err(err) => {
                warn!(workflow_id = %id, error = %err, "Workflow lookup failed");
                UNNAMED_WORKFLOW.to_string()
            }
        };
        info!(workflow_id = %id, workflow = %workflow, "Chat request served");

        Ok(ChatResponse {
            workflow,
            steps_executed: outcome.steps_executed,
            response: outcome.response_text,
            context_used: outcome.context_used,
            context_length: outcome.context_length,
            rebuilt_collections: outcome.rebuilt_collections,
        })
    }
}
