// Tool gateway
//
// Exposes the pipeline's on-demand operations as tool calls so an external
// controller can drive chapters remotely. Dispatch goes through the same
// ChapterPipeline methods as in-process callers; failures come back as error
// results, never as a dispatch error.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::errors::PipelineError;
use crate::llm::{ToolDefinition, ToolInputSchema, ToolResult, ToolUse};
use crate::pipeline::{Assignment, ChapterPipeline, PipelineOutcome, ProjectMaterials};

pub const ASSIGN_CHAPTER: &str = "assign_chapter";
pub const WRITE_CHAPTER: &str = "write_chapter";
pub const CRITIQUE_CHAPTER: &str = "critique_chapter";
pub const REVISE_CHAPTER: &str = "revise_chapter";
pub const EXTRACT_CONTINUITY: &str = "extract_continuity";

#[derive(Debug, Deserialize)]
struct ChapterInput {
    project_id: String,
    chapter_number: u32,
    #[serde(default)]
    materials: ProjectMaterials,
}

#[derive(Debug, Deserialize)]
struct WriteInput {
    #[serde(flatten)]
    assignment: Assignment,
    #[serde(default)]
    materials: ProjectMaterials,
}

#[derive(Debug, Deserialize)]
struct ReviseInput {
    project_id: String,
    chapter_number: u32,
    #[serde(default)]
    notes: String,
    #[serde(default)]
    materials: ProjectMaterials,
}

#[derive(Debug, Deserialize)]
struct ContinuityInput {
    text: String,
}

#[derive(Debug)]
enum GatewayError {
    BadInput(String),
    Pipeline(PipelineError),
}

impl From<PipelineError> for GatewayError {
    fn from(e: PipelineError) -> Self {
        GatewayError::Pipeline(e)
    }
}

pub struct ToolGateway {
    pipeline: Arc<ChapterPipeline>,
}

impl ToolGateway {
    pub fn new(pipeline: Arc<ChapterPipeline>) -> Self {
        Self { pipeline }
    }

    /// Tool definitions advertised to external controllers
    pub fn definitions() -> Vec<ToolDefinition> {
        let chapter_props = json!({
            "project_id": { "type": "string", "description": "Project identifier" },
            "chapter_number": { "type": "integer", "minimum": 1 },
        });
        let materials = json!({
            "type": "object",
            "description": "Optional project_outline, style_guide, reference_excerpt, story_bible",
        });
        let with = |extra: Value| {
            let mut props = chapter_props.clone();
            if let (Some(target), Some(extra)) = (props.as_object_mut(), extra.as_object()) {
                target.extend(extra.clone());
            }
            props
        };

        vec![
            ToolDefinition {
                name: ASSIGN_CHAPTER.to_string(),
                description: "Create a chapter assignment (or reset a failed one) without running the pipeline.".to_string(),
                input_schema: ToolInputSchema::object(
                    with(json!({
                        "outline": { "type": "string" },
                        "title": { "type": "string" },
                        "target_word_count": { "type": "integer" },
                    })),
                    &["project_id", "chapter_number", "outline"],
                ),
            },
            ToolDefinition {
                name: WRITE_CHAPTER.to_string(),
                description: "Assign a chapter and run draft, evaluation and bounded revision to completion.".to_string(),
                input_schema: ToolInputSchema::object(
                    with(json!({
                        "outline": { "type": "string" },
                        "title": { "type": "string" },
                        "target_word_count": { "type": "integer" },
                        "materials": materials,
                    })),
                    &["project_id", "chapter_number", "outline"],
                ),
            },
            ToolDefinition {
                name: CRITIQUE_CHAPTER.to_string(),
                description: "Score the accepted version of a chapter and record the result.".to_string(),
                input_schema: ToolInputSchema::object(
                    with(json!({ "materials": materials })),
                    &["project_id", "chapter_number"],
                ),
            },
            ToolDefinition {
                name: REVISE_CHAPTER.to_string(),
                description: "Run one revise, edit and evaluate cycle on a finished chapter.".to_string(),
                input_schema: ToolInputSchema::object(
                    with(json!({
                        "notes": { "type": "string", "description": "Extra revision notes" },
                        "materials": materials,
                    })),
                    &["project_id", "chapter_number"],
                ),
            },
            ToolDefinition {
                name: EXTRACT_CONTINUITY.to_string(),
                description: "Extract characters, locations, rules and open threads from a passage.".to_string(),
                input_schema: ToolInputSchema::object(
                    json!({ "text": { "type": "string" } }),
                    &["text"],
                ),
            },
        ]
    }

    /// Execute one tool call
    #[instrument(skip(self, tool_use), fields(tool = %tool_use.name, id = %tool_use.id))]
    pub async fn dispatch(&self, tool_use: &ToolUse) -> ToolResult {
        info!("Dispatching tool call");
        match self.execute(tool_use).await {
            Ok(output) => ToolResult::success(tool_use.id.clone(), output.to_string()),
            Err(GatewayError::BadInput(reason)) => {
                error!("Invalid tool input: {}", reason);
                ToolResult::error(tool_use.id.clone(), format!("Invalid input: {reason}"))
            }
            Err(GatewayError::Pipeline(e)) => {
                error!("Tool call failed: {}", e);
                let body = json!({ "error": { "kind": e.kind(), "message": e.to_string() } });
                ToolResult::error(tool_use.id.clone(), body.to_string())
            }
        }
    }

    async fn execute(&self, tool_use: &ToolUse) -> Result<Value, GatewayError> {
        match tool_use.name.as_str() {
            ASSIGN_CHAPTER => {
                let assignment: Assignment = parse_input(&tool_use.input)?;
                let chapter = self.pipeline.assign(&assignment).await?;
                to_json(&chapter)
            }
            WRITE_CHAPTER => {
                let input: WriteInput = parse_input(&tool_use.input)?;
                let outcome = self.pipeline.write(&input.assignment, &input.materials).await?;
                Ok(outcome_json(&outcome))
            }
            CRITIQUE_CHAPTER => {
                let input: ChapterInput = parse_input(&tool_use.input)?;
                let score = self
                    .pipeline
                    .critique(&input.project_id, input.chapter_number, &input.materials)
                    .await?;
                to_json(&score)
            }
            REVISE_CHAPTER => {
                let input: ReviseInput = parse_input(&tool_use.input)?;
                let outcome = self
                    .pipeline
                    .revise(&input.project_id, input.chapter_number, &input.notes, &input.materials)
                    .await?;
                Ok(outcome_json(&outcome))
            }
            EXTRACT_CONTINUITY => {
                let input: ContinuityInput = parse_input(&tool_use.input)?;
                let parsed = self
                    .pipeline
                    .compression()
                    .extract_continuity(&input.text)
                    .await
                    .map_err(PipelineError::from)?;
                match parsed.ok() {
                    Some(points) => to_json(&points),
                    None => Ok(json!({ "parsed": false })),
                }
            }
            other => Err(GatewayError::BadInput(format!("unknown tool '{other}'"))),
        }
    }
}

fn parse_input<T: DeserializeOwned>(input: &Value) -> Result<T, GatewayError> {
    serde_json::from_value(input.clone()).map_err(|e| GatewayError::BadInput(e.to_string()))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, GatewayError> {
    serde_json::to_value(value).map_err(|e| GatewayError::BadInput(e.to_string()))
}

fn outcome_json(outcome: &PipelineOutcome) -> Value {
    json!({
        "chapter": outcome.chapter,
        "iterations": outcome.iterations,
        "needs_review": outcome.needs_review(),
        "final_score": outcome.final_score,
        "word_count": outcome.chapter.word_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definitions_cover_operations() {
        let defs = ToolGateway::definitions();
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec![ASSIGN_CHAPTER, WRITE_CHAPTER, CRITIQUE_CHAPTER, REVISE_CHAPTER, EXTRACT_CONTINUITY]
        );
        let write = &defs[1];
        assert!(write.input_schema.required.contains(&"outline".to_string()));
        assert!(write.input_schema.properties.get("materials").is_some());
        assert!(write.input_schema.properties.get("chapter_number").is_some());
    }

    #[test]
    fn test_write_input_flattens_assignment() {
        let input: WriteInput = parse_input(&json!({
            "project_id": "p1",
            "chapter_number": 3,
            "outline": "The siege begins",
            "materials": { "style_guide": "Spare prose" }
        }))
        .unwrap();
        assert_eq!(input.assignment.chapter_number, 3);
        assert_eq!(input.materials.style_guide.as_deref(), Some("Spare prose"));
    }

    #[test]
    fn test_missing_fields_are_bad_input() {
        let result: Result<ChapterInput, _> = parse_input(&json!({ "project_id": "p1" }));
        assert!(matches!(result, Err(GatewayError::BadInput(_))));
    }
}
