// Generator-backed editor for each pass kind

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::{EditOutcome, EditReference, Editor, EditorKind};
use crate::config::Config;
use crate::errors::TransportError;
use crate::generators::{GenerationRequest, Generator};
use crate::llm::SamplingParams;
use crate::parsing::{parse_json, Parsed};

#[derive(Debug, Deserialize)]
struct RawEdit {
    #[serde(default)]
    edited_content: Option<String>,
    #[serde(default)]
    changes: Vec<Value>,
    /// Continuity editor reports its changes here
    #[serde(default)]
    fixes_applied: Vec<Value>,
}

fn change_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::String(_) | Value::Null => None,
        other => Some(other.to_string()),
    }
}

pub struct LlmEditor {
    kind: EditorKind,
    generator: Arc<dyn Generator>,
    sampling: SamplingParams,
}

impl LlmEditor {
    pub fn new(kind: EditorKind, generator: Arc<dyn Generator>, config: &Config) -> Self {
        Self {
            kind,
            generator,
            sampling: config.roles.for_role(kind.role()).sampling(),
        }
    }

    fn system(&self) -> &'static str {
        match self.kind {
            EditorKind::Grammar => {
                "You are a meticulous copy editor. Fix grammar, spelling and punctuation only. \
                 Never change meaning, voice or plot."
            }
            EditorKind::Style => {
                "You are a line editor. Improve rhythm, word choice and clarity while keeping \
                 the author's voice. Never change plot events."
            }
            EditorKind::Continuity => {
                "You are a continuity editor. Fix contradictions with established story facts \
                 (names, timelines, locations, objects). Change as little text as possible."
            }
        }
    }

    fn build_prompt(&self, content: &str, reference: &EditReference) -> String {
        let mut prompt = String::new();
        let sections: Vec<(&str, &Option<String>)> = match self.kind {
            EditorKind::Grammar => Vec::new(),
            EditorKind::Style => vec![
                ("Style guide", &reference.style_guide),
                ("Reference excerpt", &reference.reference_excerpt),
            ],
            EditorKind::Continuity => vec![
                ("Story bible", &reference.story_bible),
                ("Previously", &reference.previous_summary),
            ],
        };
        for (title, body) in sections {
            if let Some(body) = body.as_deref().filter(|b| !b.trim().is_empty()) {
                prompt.push_str(&format!("## {title}\n{body}\n\n"));
            }
        }

        prompt.push_str("## Text\n");
        prompt.push_str(content);
        let changes_key = match self.kind {
            EditorKind::Continuity => "fixes_applied",
            _ => "changes",
        };
        prompt.push_str(&format!(
            "\n\nReturn JSON: {{\"edited_content\": \"<full edited text>\", \"{changes_key}\": [\"<one line per change>\"]}}"
        ));
        prompt
    }
}

#[async_trait]
impl Editor for LlmEditor {
    fn kind(&self) -> EditorKind {
        self.kind
    }

    async fn edit(&self, content: &str, reference: &EditReference) -> Result<EditOutcome, TransportError> {
        let request = GenerationRequest::prompt(self.kind.role(), self.build_prompt(content, reference))
            .with_system(self.system())
            .with_sampling(self.sampling);
        let response = self.generator.generate(request).await?;

        let outcome = match parse_json::<RawEdit>(&response.text) {
            Parsed::Parsed(raw) => match raw.edited_content {
                Some(edited) if !edited.trim().is_empty() => {
                    let changes = raw
                        .changes
                        .into_iter()
                        .chain(raw.fixes_applied)
                        .filter_map(change_text)
                        .collect();
                    EditOutcome::edited(edited, changes)
                }
                _ => EditOutcome::unchanged(content, "response carried no edited_content"),
            },
            Parsed::Unparsed { reason, .. } => EditOutcome::unchanged(content, reason),
        };
        Ok(outcome)
    }
}
