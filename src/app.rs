//! Wires configuration, storage, and providers into the services used by
//! the CLI and the HTTP server.

use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

use workflow_rag_core::embedding::EmbeddingProvider;
use workflow_rag_core::generation::GenerationProvider;
use workflow_rag_core::{CollectionStore, PipelineExecutor};

use crate::chat::ChatService;
use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::knowledge::KnowledgeBase;
use crate::llm::create_generator;
use crate::migrate::migrate;
use crate::retry::RetryPolicy;
use crate::sqlite_store::SqliteBackend;
use crate::storage::FileStorage;
use crate::workflows::SqliteWorkflowDirectory;

pub struct App {
    pub pool: SqlitePool,
    pub knowledge: Arc<KnowledgeBase>,
    pub chat: Arc<ChatService>,
    pub workflows: Arc<SqliteWorkflowDirectory>,
}

impl App {
    /// Open the database (migrating it if needed) and build the providers
    /// named in `config`.
    pub async fn open(config: &Config) -> Result<Self> {
        let embedder = create_provider(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        Self::open_with(config, embedder, generator).await
    }

    /// Like [`App::open`] with caller-supplied providers.
    pub async fn open_with(
        config: &Config,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate(&pool).await?;

        info!(
            embedder = embedder.model_name(),
            dims = embedder.dims(),
            generator = generator.name(),
            "Opening knowledge store"
        );

        let backend = Arc::new(SqliteBackend::new(pool.clone()));
        let store = Arc::new(
            CollectionStore::new(backend, embedder).with_batch_size(config.embedding.batch_size),
        );

        let knowledge = Arc::new(KnowledgeBase::new(
            store.clone(),
            FileStorage::new(config.storage.uploads_dir.clone()),
            config.chunking.chunk_size,
            RetryPolicy::new(config.reset.attempts, config.reset.pause()),
        ));

        let workflows = Arc::new(SqliteWorkflowDirectory::new(pool.clone()));
        let executor = PipelineExecutor::new(store, generator)
            .with_default_model(config.generation.default_model.clone());
        let chat = Arc::new(ChatService::new(executor, workflows.clone()));

        Ok(Self {
            pool,
            knowledge,
            chat,
            workflows,
        })
    }
}
