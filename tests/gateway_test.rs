// Integration tests for the tool gateway

mod common;

use anyhow::Result;
use serde_json::{json, Value};
use std::sync::Arc;

use common::{harness, test_config, ScriptedEvaluator, ScriptedGenerator};
use quill::gateway::{ToolGateway, CRITIQUE_CHAPTER, REVISE_CHAPTER, WRITE_CHAPTER};
use quill::llm::ToolUse;
use quill::store::{ChapterStatus, Store};

#[tokio::test]
async fn test_write_then_critique_through_gateway() -> Result<()> {
    let h = harness(test_config(), ScriptedGenerator::new(), ScriptedEvaluator::default());
    let store = h.store.clone();
    let gateway = ToolGateway::new(Arc::new(h.pipeline));

    let write = ToolUse::new(
        WRITE_CHAPTER,
        json!({
            "project_id": "book",
            "chapter_number": 1,
            "outline": "Mara reaches the keep",
            "target_word_count": 1200,
            "materials": { "style_guide": "Short sentences." }
        }),
    );
    let result = gateway.dispatch(&write).await;
    assert!(!result.is_error, "{}", result.content);
    assert_eq!(result.tool_use_id, write.id);
    let body: Value = serde_json::from_str(&result.content)?;
    assert_eq!(body["iterations"], 0);
    assert_eq!(body["chapter"]["status"], "completed");
    assert_eq!(body["chapter"]["target_word_count"], 1200);

    let critique = ToolUse::new(CRITIQUE_CHAPTER, json!({ "project_id": "book", "chapter_number": 1 }));
    let result = gateway.dispatch(&critique).await;
    assert!(!result.is_error, "{}", result.content);

    let chapter = store.require_chapter("book", 1).await?;
    assert_eq!(chapter.status, ChapterStatus::Completed);
    assert_eq!(store.list_scores(chapter.id).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_pipeline_errors_become_error_results() {
    let h = harness(test_config(), ScriptedGenerator::new(), ScriptedEvaluator::default());
    let gateway = ToolGateway::new(Arc::new(h.pipeline));

    let revise = ToolUse::new(REVISE_CHAPTER, json!({ "project_id": "book", "chapter_number": 9 }));
    let result = gateway.dispatch(&revise).await;
    assert!(result.is_error);
    let body: Value = serde_json::from_str(&result.content).unwrap();
    assert_eq!(body["error"]["kind"], "store");
}

#[tokio::test]
async fn test_bad_input_and_unknown_tools() {
    let h = harness(test_config(), ScriptedGenerator::new(), ScriptedEvaluator::default());
    let gateway = ToolGateway::new(Arc::new(h.pipeline));

    let missing = gateway
        .dispatch(&ToolUse::new(WRITE_CHAPTER, json!({ "project_id": "book" })))
        .await;
    assert!(missing.is_error);
    assert!(missing.content.starts_with("Invalid input"));

    let unknown = gateway.dispatch(&ToolUse::new("delete_everything", json!({}))).await;
    assert!(unknown.is_error);
    assert!(unknown.content.contains("unknown tool"));
}
