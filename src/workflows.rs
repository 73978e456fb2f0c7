//! SQLite-backed [`WorkflowDirectory`].
//!
//! The `workflows` table is owned by the workflow editor service; this
//! module only reads names from it, plus a small insert helper used by the
//! CLI and tests to seed entries.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use workflow_rag_core::workflow::{WorkflowDirectory, WorkflowSummary};

#[derive(Clone)]
pub struct SqliteWorkflowDirectory {
    pool: SqlitePool,
}

impl SqliteWorkflowDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, id: &str, name: &str, graph: &serde_json::Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workflows (id, name, graph_json, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name, graph_json = excluded.graph_json
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(graph.to_string())
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl WorkflowDirectory for SqliteWorkflowDirectory {
    async fn lookup(&self, id: &str) -> Result<Option<WorkflowSummary>> {
        let row = sqlx::query("SELECT id, name FROM workflows WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| WorkflowSummary {
            id: r.get("id"),
            name: r.get("name"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::{db, migrate};
    use tempfile::TempDir;
    use workflow_rag_core::workflow::{display_name, UNNAMED_WORKFLOW};

    #[tokio::test]
    async fn test_lookup_by_id() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.db.path = tmp.path().join("wfr.sqlite");
        let pool = db::connect(&config).await.unwrap();
        migrate::migrate(&pool).await.unwrap();

        let dir = SqliteWorkflowDirectory::new(pool);
        dir.insert("w-1", "Support bot", &serde_json::json!({"nodes": []}))
            .await
            .unwrap();

        assert_eq!(display_name(&dir, "w-1").await.unwrap(), "Support bot");
        assert_eq!(display_name(&dir, "w-2").await.unwrap(), UNNAMED_WORKFLOW);
    }
}
