// Shared fakes for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use quill::config::Config;
use quill::editors::{EditOutcome, EditReference, Editor, EditorChain, EditorKind};
use quill::errors::TransportError;
use quill::evaluator::{EvaluationRequest, Evaluator, Priority, ScoreRecord};
use quill::events::{EventSink, PipelineEvent};
use quill::generators::{AgentRole, GenerationRequest, Generator, GeneratorResponse};
use quill::pipeline::ChapterPipeline;
use quill::store::{MemoryStore, Store};

/// Generator with per-role scripted replies. Roles without a queued reply
/// get a deterministic default.
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<HashMap<AgentRole, VecDeque<Result<String, TransportError>>>>,
    requests: Mutex<Vec<(AgentRole, String)>>,
    counter: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, role: AgentRole, text: impl Into<String>) -> Self {
        self.push(role, Ok(text.into()));
        self
    }

    pub fn fail(self, role: AgentRole, error: TransportError) -> Self {
        self.push(role, Err(error));
        self
    }

    pub fn push(&self, role: AgentRole, reply: Result<String, TransportError>) {
        self.replies
            .lock()
            .unwrap()
            .entry(role)
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self, role: AgentRole) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| *r == role)
            .count()
    }

    pub fn prompts(&self, role: AgentRole) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| *r == role)
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn default_reply(&self, role: AgentRole) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        match role {
            AgentRole::Planner => "Open in the rain. Keep the point of view close.".to_string(),
            AgentRole::Drafter => format!("Mara climbed the wall in the dark. Draft {n}."),
            AgentRole::Reviser => format!("Mara climbed the wall at dusk. Revision {n}."),
            AgentRole::Critic => r#"{"scores": {"prose": 8, "pacing": 8}, "overall_assessment": "Good"}"#.to_string(),
            AgentRole::Summarizer => format!(
                "Summary {n}: Mara reaches the keep and learns of the tunnel.\n\n## Active Threads\n- Who opened the gate?"
            ),
            // Editors pass content through when the reply is not JSON
            _ => "no changes".to_string(),
        }
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratorResponse, TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push((request.role, request.last_user_text().to_string()));
        let scripted = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&request.role)
            .and_then(|q| q.pop_front());
        match scripted {
            Some(Ok(text)) => Ok(GeneratorResponse::text(text)),
            Some(Err(e)) => Err(e),
            None => Ok(GeneratorResponse::text(self.default_reply(request.role))),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Evaluator returning queued verdicts; accepts with 8.0 once the queue is empty
#[derive(Default)]
pub struct ScriptedEvaluator {
    verdicts: Mutex<VecDeque<(f64, bool, Priority)>>,
    seen: Mutex<Vec<(u32, String)>>,
}

impl ScriptedEvaluator {
    pub fn new(verdicts: Vec<(f64, bool, Priority)>) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Always demands revision
    pub fn never_satisfied() -> Self {
        Self::new(vec![(4.0, true, Priority::Critical); 64])
    }

    /// (version, content) of every evaluation, in order
    pub fn seen(&self) -> Vec<(u32, String)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Evaluator for ScriptedEvaluator {
    async fn evaluate(&self, request: EvaluationRequest) -> Result<ScoreRecord, TransportError> {
        self.seen
            .lock()
            .unwrap()
            .push((request.version, request.content.clone()));
        let (overall, requires, priority) = self
            .verdicts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((8.0, false, Priority::None));
        Ok(ScoreRecord::new(
            request.chapter_id,
            request.version,
            Default::default(),
            overall,
            requires,
            priority,
        ))
    }
}

pub type EditLog = Arc<Mutex<Vec<(EditorKind, String)>>>;

/// Appends a tag to the content and records what it received
pub struct RecordingEditor {
    kind: EditorKind,
    log: EditLog,
}

impl RecordingEditor {
    pub fn new(kind: EditorKind, log: EditLog) -> Self {
        Self { kind, log }
    }
}

#[async_trait]
impl Editor for RecordingEditor {
    fn kind(&self) -> EditorKind {
        self.kind
    }

    async fn edit(&self, content: &str, _reference: &EditReference) -> Result<EditOutcome, TransportError> {
        self.log.lock().unwrap().push((self.kind, content.to_string()));
        Ok(EditOutcome::edited(
            format!("{content} [{}]", self.kind),
            vec![format!("{} pass", self.kind)],
        ))
    }
}

pub fn recording_chain() -> (EditorChain, EditLog) {
    let log: EditLog = Arc::new(Mutex::new(Vec::new()));
    let editor = |kind: EditorKind| -> Arc<dyn Editor> { Arc::new(RecordingEditor::new(kind, log.clone())) };
    let chain = EditorChain::new(
        editor(EditorKind::Grammar),
        editor(EditorKind::Style),
        editor(EditorKind::Continuity),
    );
    (chain, log)
}

/// Event sink collecting everything it receives
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingSink {
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event_type())
            .collect()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn emit(&self, event: &PipelineEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.pipeline.max_revision_iterations = 3;
    config.compression.retained_chapters = 2;
    config.retriever.enabled = false;
    config
}

pub struct Harness {
    pub pipeline: ChapterPipeline,
    pub generator: Arc<ScriptedGenerator>,
    pub evaluator: Arc<ScriptedEvaluator>,
    pub store: Arc<MemoryStore>,
    pub edits: EditLog,
}

pub fn harness(config: Config, generator: ScriptedGenerator, evaluator: ScriptedEvaluator) -> Harness {
    let generator = Arc::new(generator);
    let evaluator = Arc::new(evaluator);
    let store = Arc::new(MemoryStore::new());
    let (chain, edits) = recording_chain();
    let pipeline = ChapterPipeline::new(config, generator.clone(), store.clone() as Arc<dyn Store>)
        .with_evaluator(evaluator.clone())
        .with_editors(chain);
    Harness {
        pipeline,
        generator,
        evaluator,
        store,
        edits,
    }
}
