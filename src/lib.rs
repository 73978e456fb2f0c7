//! # Workflow RAG
//!
//! Executes linear retrieval-augmented generation pipelines defined by a
//! visual workflow editor, backed by knowledge bases of uploaded documents.
//!
//! A pipeline is a list of typed nodes (`userQuery`, `knowledgeBase`,
//! `llmEngine`, `output`) folded over an execution context. Knowledge bases
//! are vector collections filled by extracting, chunking and embedding
//! uploaded files; retrieval embeds the query and returns the nearest
//! chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌───────────────┐
//! │  Uploads   │──▶│   Extract     │──▶│    SQLite     │
//! │ PDF/DOCX/… │   │ Chunk+Embed  │   │ vectors+files │
//! └────────────┘   └──────────────┘   └───────┬───────┘
//!                                             │ retrieve
//!                  ┌──────────────┐   ┌───────▼───────┐
//!                  │ LLM provider │◀──│   Pipeline    │
//!                  └──────────────┘   │   executor    │
//!                                     └───────┬───────┘
//!                          ┌──────────────────┤
//!                          ▼                  ▼
//!                     ┌─────────┐        ┌─────────┐
//!                     │   CLI   │        │  HTTP   │
//!                     │  (wfr)  │        │ (axum)  │
//!                     └─────────┘        └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! wfr init                                  # create database
//! wfr ingest docs ./handbook.pdf            # build a knowledge base
//! wfr run --pipeline flow.json "What is our leave policy?"
//! wfr serve                                 # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`app`] | Service wiring from configuration |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite vector backend |
//! | [`workflows`] | Workflow name lookup |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Generation providers |
//! | [`retry`] | HTTP retry and bounded retry policy |
//! | [`extract`] | Text extraction from uploaded documents |
//! | [`storage`] | Upload directory layout |
//! | [`knowledge`] | Knowledge-base lifecycle |
//! | [`ingest`] | Document ingestion |
//! | [`chat`] | Chat requests |
//! | [`server`] | HTTP API |
//!
//! Pipeline execution, chunking and the collection store live in the
//! `workflow-rag-core` crate.

pub mod app;
pub mod chat;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod knowledge;
pub mod llm;
pub mod migrate;
pub mod retry;
pub mod server;
pub mod sqlite_store;
pub mod storage;
pub mod workflows;
