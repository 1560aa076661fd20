// Editor chain: grammar → style → continuity passes over revised content

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::errors::TransportError;
use crate::generators::AgentRole;

pub mod llm;

pub use llm::LlmEditor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorKind {
    Grammar,
    Style,
    Continuity,
}

impl EditorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditorKind::Grammar => "grammar",
            EditorKind::Style => "style",
            EditorKind::Continuity => "continuity",
        }
    }

    pub fn role(&self) -> AgentRole {
        match self {
            EditorKind::Grammar => AgentRole::GrammarEditor,
            EditorKind::Style => AgentRole::StyleEditor,
            EditorKind::Continuity => AgentRole::ContinuityEditor,
        }
    }
}

impl fmt::Display for EditorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Auxiliary material for the style and continuity passes. Every field is optional.
#[derive(Debug, Clone, Default)]
pub struct EditReference {
    pub style_guide: Option<String>,
    pub reference_excerpt: Option<String>,
    pub story_bible: Option<String>,
    /// Summary of what came before, for continuity checks
    pub previous_summary: Option<String>,
}

/// Result of one editor pass
#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    pub content: String,
    pub changes: Vec<String>,
    /// Set when the editor passed its input through unmodified
    pub error: Option<String>,
}

impl EditOutcome {
    pub fn edited(content: String, changes: Vec<String>) -> Self {
        Self {
            content,
            changes,
            error: None,
        }
    }

    /// Pass-through: original content, no changes, error marker
    pub fn unchanged(content: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            changes: Vec::new(),
            error: Some(reason.into()),
        }
    }
}

/// A single-purpose content transform.
///
/// Editors are conservative: an unusable generator response yields the input
/// unchanged with an error marker. Only transport failures are returned as errors.
#[async_trait]
pub trait Editor: Send + Sync {
    fn kind(&self) -> EditorKind;

    async fn edit(&self, content: &str, reference: &EditReference) -> Result<EditOutcome, TransportError>;
}

/// What one stage of the chain did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub kind: EditorKind,
    pub changes: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChainOutcome {
    pub content: String,
    pub stages: Vec<StageReport>,
}

impl ChainOutcome {
    pub fn total_changes(&self) -> usize {
        self.stages.iter().map(|s| s.changes.len()).sum()
    }
}

/// The three editors in their fixed order
pub struct EditorChain {
    stages: [Arc<dyn Editor>; 3],
}

impl EditorChain {
    pub fn new(grammar: Arc<dyn Editor>, style: Arc<dyn Editor>, continuity: Arc<dyn Editor>) -> Self {
        Self {
            stages: [grammar, style, continuity],
        }
    }

    /// Run every stage, each consuming the previous stage's output.
    ///
    /// A transport failure aborts the chain; nothing partial is returned.
    pub async fn run(&self, content: String, reference: &EditReference) -> Result<ChainOutcome, TransportError> {
        let mut current = content;
        let mut stages = Vec::with_capacity(self.stages.len());

        for editor in &self.stages {
            let kind = editor.kind();
            let outcome = editor.edit(&current, reference).await?;
            if let Some(error) = &outcome.error {
                tracing::warn!(editor = %kind, %error, "Editor passed content through unchanged");
            } else {
                tracing::debug!(editor = %kind, changes = outcome.changes.len(), "Editor pass applied");
            }
            current = outcome.content;
            stages.push(StageReport {
                kind,
                changes: outcome.changes,
                error: outcome.error,
            });
        }

        Ok(ChainOutcome {
            content: current,
            stages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Appends a tag to whatever it receives and records the input
    struct TaggingEditor {
        kind: EditorKind,
        seen: Mutex<Vec<String>>,
    }

    impl TaggingEditor {
        fn new(kind: EditorKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Editor for TaggingEditor {
        fn kind(&self) -> EditorKind {
            self.kind
        }

        async fn edit(&self, content: &str, _reference: &EditReference) -> Result<EditOutcome, TransportError> {
            self.seen.lock().unwrap().push(content.to_string());
            Ok(EditOutcome::edited(
                format!("{content}+{}", self.kind),
                vec![format!("{} pass", self.kind)],
            ))
        }
    }

    struct FailingEditor;

    #[async_trait]
    impl Editor for FailingEditor {
        fn kind(&self) -> EditorKind {
            EditorKind::Style
        }

        async fn edit(&self, _content: &str, _reference: &EditReference) -> Result<EditOutcome, TransportError> {
            Err(TransportError::Timeout(30))
        }
    }

    #[tokio::test]
    async fn test_stages_run_in_order_on_prior_output() {
        let grammar = TaggingEditor::new(EditorKind::Grammar);
        let style = TaggingEditor::new(EditorKind::Style);
        let continuity = TaggingEditor::new(EditorKind::Continuity);
        let chain = EditorChain::new(grammar.clone(), style.clone(), continuity.clone());

        let outcome = chain.run("draft".into(), &EditReference::default()).await.unwrap();

        assert_eq!(outcome.content, "draft+grammar+style+continuity");
        assert_eq!(style.seen.lock().unwrap()[0], "draft+grammar");
        assert_eq!(continuity.seen.lock().unwrap()[0], "draft+grammar+style");
        let kinds: Vec<_> = outcome.stages.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![EditorKind::Grammar, EditorKind::Style, EditorKind::Continuity]);
        assert_eq!(outcome.total_changes(), 3);
    }

    #[tokio::test]
    async fn test_transport_failure_aborts_chain() {
        let continuity = TaggingEditor::new(EditorKind::Continuity);
        let chain = EditorChain::new(
            TaggingEditor::new(EditorKind::Grammar),
            Arc::new(FailingEditor),
            continuity.clone(),
        );
        let err = chain.run("draft".into(), &EditReference::default()).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(30)));
        assert!(continuity.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unchanged_outcome() {
        let outcome = EditOutcome::unchanged("text", "unparseable");
        assert_eq!(outcome.content, "text");
        assert!(outcome.changes.is_empty());
        assert_eq!(outcome.error.as_deref(), Some("unparseable"));
    }
}
