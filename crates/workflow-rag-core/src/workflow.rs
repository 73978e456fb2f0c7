//! Workflow directory: resolves a workflow id to its display name.
//!
//! Workflow definitions are owned by an external service; the chat
//! endpoint only needs a name to label its response with.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Serialize;

/// Name reported for workflow ids the directory does not know.
pub const UNNAMED_WORKFLOW: &str = "Unnamed Workflow";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
}

#[async_trait]
pub trait WorkflowDirectory: Send + Sync {
    async fn lookup(&self, id: &str) -> Result<Option<WorkflowSummary>>;
}

/// Display name for `id`, or [`UNNAMED_WORKFLOW`] when unknown.
pub async fn display_name(directory: &dyn WorkflowDirectory, id: &str) -> Result<String> {
    Ok(directory
        .lookup(id)
        .await?
        .map(|w| w.name)
        .unwrap_or_else(|| UNNAMED_WORKFLOW.to_string()))
}

/// Map-backed directory for tests and hosts without a database.
#[derive(Default)]
pub struct InMemoryWorkflows {
    names: RwLock<HashMap<String, String>>,
}

impl InMemoryWorkflows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: &str, name: &str) -> Result<()> {
        self.names
            .write()
            .map_err(|_| anyhow!("workflow map lock poisoned"))?
            .insert(id.to_string(), name.to_string());
        Ok(())
    }
}

#[async_trait]
impl WorkflowDirectory for InMemoryWorkflows {
    async fn lookup(&self, id: &str) -> Result<Option<WorkflowSummary>> {
        let names = self
            .names
            .read()
            .map_err(|_| anyhow!("workflow map lock poisoned"))?;
        Ok(names.get(id).map(|name| WorkflowSummary {
            id: id.to_string(),
            name: name.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_display_name_falls_back() {
        let dir = InMemoryWorkflows::new();
        dir.insert("w1", "Support bot").unwrap();
        assert_eq!(display_name(&dir, "w1").await.unwrap(), "Support bot");
        assert_eq!(display_name(&dir, "w2").await.unwrap(), UNNAMED_WORKFLOW);
    }
}
