//! End-to-end knowledge-base and chat flows over the SQLite backend with
//! deterministic in-process providers.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use workflow_rag::app::App;
use workflow_rag::chat::ChatRequest;
use workflow_rag::config::{parse_config, Config};
use workflow_rag::error::KnowledgeError;
use workflow_rag::ingest::{FileStatus, Upload};
use workflow_rag_core::embedding::EmbeddingProvider;
use workflow_rag_core::generation::{GenerationProvider, GenerationRequest};

const WORKFLOW_ID: &str = "0b7e4f52-91d3-4c1a-8f6e-2d5a3c7b9e10";

/// Letter-frequency vectors folded into `dims` buckets.
struct LetterEmbedder {
    dims: usize,
}

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    fn model_name(&self) -> &str {
        "letters"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0; self.dims];
                for c in text.chars().filter(char::is_ascii_lowercase) {
                    v[(c as usize - 'a' as usize) % self.dims] += 1.0;
                }
                v[0] += 0.01;
                v
            })
            .collect())
    }
}

/// Answers with a fixed string and remembers every prompt.
struct RecordingGenerator {
    answer: String,
    prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    fn new(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl GenerationProvider for RecordingGenerator {
    fn name(&self) -> &str {
        "recording"
    }
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        self.prompts.lock().unwrap().push(request.prompt.to_string());
        Ok(self.answer.clone())
    }
}

fn test_config(tmp: &TempDir) -> Config {
    let root = tmp.path().display();
    parse_config(&format!(
        r#"
[db]
path = "{root}/data/wfr.sqlite"

[storage]
uploads_dir = "{root}/data/uploaded_files"

[embedding]
provider = "disabled"

[generation]
provider = "disabled"

[reset]
attempts = 2
pause_ms = 1
"#
    ))
    .unwrap()
}

async fn open(tmp: &TempDir, dims: usize, generator: Arc<RecordingGenerator>) -> App {
    App::open_with(&test_config(tmp), Arc::new(LetterEmbedder { dims }), generator)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_long_document_splits_into_three_chunks() {
    let tmp = TempDir::new().unwrap();
    let app = open(&tmp, 26, RecordingGenerator::new("ok")).await;

    let text = "abcdefghij".repeat(250);
    let report = app
        .knowledge
        .ingest("kb", vec![Upload::new("long.txt", text)])
        .await
        .unwrap();

    assert_eq!(report.files[0].status, FileStatus::Indexed);
    assert_eq!(report.files[0].chunks, 3);

    let records = app.knowledge.collections().list_records("kb").await.unwrap();
    let mut lens: Vec<usize> = records.iter().map(|r| r.document.chars().count()).collect();
    lens.sort_unstable();
    assert_eq!(lens, vec![500, 1000, 1000]);
    let ids: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids.len(), 3);
}

#[tokio::test]
async fn test_repeated_uploads_never_collide() {
    let tmp = TempDir::new().unwrap();
    let app = open(&tmp, 26, RecordingGenerator::new("ok")).await;

    for _ in 0..2 {
        app.knowledge
            .ingest("kb", vec![Upload::new("same.txt", "repeat me")])
            .await
            .unwrap();
    }

    let records = app.knowledge.collections().list_records("kb").await.unwrap();
    assert_eq!(records.len(), 2);
    assert_ne!(records[0].id, records[1].id);

    let files = app.knowledge.list_files("kb").await.unwrap();
    assert_eq!(files.len(), 1);
}

#[tokio::test]
async fn test_file_delete_is_prefix_safe_and_collections_are_isolated() {
    let tmp = TempDir::new().unwrap();
    let app = open(&tmp, 26, RecordingGenerator::new("ok")).await;
    let kb = &app.knowledge;

    kb.ingest(
        "x",
        vec![
            Upload::new("report.txt", "quarterly numbers"),
            Upload::new("report.txt_old", "older numbers"),
        ],
    )
    .await
    .unwrap();
    kb.ingest("y", vec![Upload::new("report.txt", "other team")])
        .await
        .unwrap();

    let deleted = kb.delete_file("x", "report.txt").await.unwrap();
    assert_eq!(deleted.removed_chunks, 1);

    let remaining = kb.collections().list_records("x").await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].document, "older numbers");
    assert_eq!(kb.list_files("y").await.unwrap().len(), 1);

    kb.delete_collection("x").await.unwrap();
    let names: Vec<String> = kb
        .list_collections()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["y".to_string()]);
    assert_eq!(kb.download("y", "report.txt").await.unwrap(), b"other team");
    assert!(matches!(
        kb.download("x", "report.txt").await,
        Err(KnowledgeError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_changed_embedding_width_rebuilds_collections() {
    let tmp = TempDir::new().unwrap();
    {
        let app = open(&tmp, 26, RecordingGenerator::new("ok")).await;
        app.knowledge
            .ingest("kb", vec![Upload::new("a.txt", "first model")])
            .await
            .unwrap();
        app.pool.close().await;
    }

    let app = open(&tmp, 8, RecordingGenerator::new("ok")).await;
    let report = app
        .knowledge
        .ingest("kb", vec![Upload::new("b.txt", "second model")])
        .await
        .unwrap();

    assert_eq!(
        report.rebuilt_collections,
        vec!["kb".to_string(), "kb__files".to_string()]
    );
    let files = app.knowledge.list_files("kb").await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].id, "b.txt");
}

#[tokio::test]
async fn test_retrieval_rebuild_also_clears_file_listing() {
    let tmp = TempDir::new().unwrap();
    {
        let app = open(&tmp, 2, RecordingGenerator::new("ok")).await;
        app.knowledge
            .ingest("kb", vec![Upload::new("a.txt", "first model")])
            .await
            .unwrap();
        app.pool.close().await;
    }

    let app = open(&tmp, 3, RecordingGenerator::new("ok")).await;
    let response = app
        .chat
        .chat(ChatRequest {
            workflow_id: WORKFLOW_ID.to_string(),
            query: "first".to_string(),
            pipeline: json!([
                { "type": "knowledgeBase", "config": { "sourceName": "kb" } },
                { "type": "output", "config": {} }
            ]),
        })
        .await
        .unwrap();

    assert_eq!(
        response.rebuilt_collections,
        vec!["kb".to_string(), "kb__files".to_string()]
    );
    assert!(!response.context_used);
    assert!(app.knowledge.list_files("kb").await.unwrap().is_empty());
    let collections = app.knowledge.list_collections().await.unwrap();
    assert_eq!(collections.len(), 1);
    assert_eq!(collections[0].count, 0);
    assert_eq!(collections[0].dims, 3);
}

#[tokio::test]
async fn test_chat_uses_retrieved_context() {
    let tmp = TempDir::new().unwrap();
    let generator = RecordingGenerator::new("25 days");
    let app = open(&tmp, 26, generator.clone()).await;
    app.workflows
        .insert(WORKFLOW_ID, "HR assistant", &json!({}))
        .await
        .unwrap();

    app.knowledge
        .ingest(
            "hr",
            vec![Upload::new("policy.md", "Vacation policy: employees get 25 days.")],
        )
        .await
        .unwrap();

    let response = app
        .chat
        .chat(ChatRequest {
            workflow_id: WORKFLOW_ID.to_string(),
            query: "How many vacation days?".to_string(),
            pipeline: json!([
                { "type": "userQuery", "config": {} },
                { "type": "knowledgeBase", "config": { "sourceName": "hr", "topK": "2" } },
                { "type": "llmEngine", "config": { "customPrompt": "Use the context." } },
                { "type": "output", "config": { "displayName": "Answer" } }
            ]),
        })
        .await
        .unwrap();

    assert_eq!(response.workflow, "HR assistant");
    assert_eq!(response.response, "Answer:\n25 days");
    assert!(response.context_used);
    assert_eq!(
        response.context_length,
        "Vacation policy: employees get 25 days.".len()
    );
    let prompt = generator.last_prompt();
    assert!(prompt.starts_with("Use the context.\n\nContext:\nVacation policy"));
    assert!(prompt.ends_with("User Query:\nHow many vacation days?"));
}

#[tokio::test]
async fn test_missing_knowledge_base_degrades_to_empty_context() {
    let tmp = TempDir::new().unwrap();
    let generator = RecordingGenerator::new("");
    let app = open(&tmp, 26, generator.clone()).await;

    let response = app
        .chat
        .chat(ChatRequest {
            workflow_id: WORKFLOW_ID.to_string(),
            query: "anything".to_string(),
            pipeline: json!([
                { "type": "knowledgeBase", "config": { "sourceName": "nope" } },
                { "type": "llmEngine", "config": null },
                { "type": "chart", "config": {} }
            ]),
        })
        .await
        .unwrap();

    assert_eq!(response.workflow, "Unnamed Workflow");
    assert!(!response.context_used);
    assert_eq!(response.response, "(No output returned by model.)");
    assert_eq!(
        response.steps_executed,
        vec!["knowledgeBase", "llmEngine", "chart"]
    );
}

#[tokio::test]
async fn test_reset_all_empties_store_and_uploads() {
    let tmp = TempDir::new().unwrap();
    let app = open(&tmp, 26, RecordingGenerator::new("ok")).await;

    app.knowledge
        .ingest("a", vec![Upload::new("one.txt", "one")])
        .await
        .unwrap();
    app.knowledge
        .ingest("b", vec![Upload::new("two.txt", "two")])
        .await
        .unwrap();

    app.knowledge.reset_all().await.unwrap();

    assert!(app.knowledge.list_collections().await.unwrap().is_empty());
    let uploads = app.knowledge.storage().root();
    assert!(uploads.exists());
    assert_eq!(std::fs::read_dir(uploads).unwrap().count(), 0);

    // The store stays usable after a reset.
    app.knowledge
        .ingest("a", vec![Upload::new("one.txt", "again")])
        .await
        .unwrap();
    assert_eq!(app.knowledge.list_files("a").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_pdf_upload_is_extracted() {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![100.into(), 600.into()]),
            Operation::new("Tj", vec![Object::string_literal("quarterly revenue grew")]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();

    let tmp = TempDir::new().unwrap();
    let app = open(&tmp, 26, RecordingGenerator::new("ok")).await;
    let report = app
        .knowledge
        .ingest("finance", vec![Upload::new("q3.pdf", bytes)])
        .await
        .unwrap();

    assert_eq!(report.files[0].status, FileStatus::Indexed, "{:?}", report.files[0]);
    let records = app.knowledge.collections().list_records("finance").await.unwrap();
    assert!(records[0].document.contains("quarterly revenue grew"));
}
