//! # workflow-rag core
//!
//! Runtime-agnostic logic for workflow-rag: data models, fixed-size
//! chunking, the vector backend abstraction, the collection store with
//! schema-drift recovery, provider traits, and the pipeline executor.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or HTTP client
//! dependencies. Concrete backends and providers live in the
//! `workflow-rag` app crate.

pub mod chunk;
pub mod collections;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod workflow;

pub use collections::{CollectionHandle, CollectionStore, KnowledgeBaseHandle};
pub use error::{PipelineError, StoreError};
pub use pipeline::{ExecutionContext, PipelineExecutor, PipelineOutcome, PipelineStep};
