// Pipeline lifecycle events
//
// Emission is fire-and-forget: `EventDispatcher::emit` queues the event and
// returns immediately; a background task fans it out to every sink. Sink
// errors and panics are logged there and never reach the pipeline.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::errors::ErrorKind;
use crate::evaluator::Priority;
use crate::store::ChapterRange;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventKind {
    AssignmentCreated {
        outline_words: usize,
        target_word_count: usize,
    },
    DraftReady {
        version: u32,
        word_count: usize,
    },
    Evaluated {
        version: u32,
        overall_score: f64,
        requires_revision: bool,
        priority: Priority,
    },
    RevisionIteration {
        iteration: usize,
        max_iterations: usize,
    },
    /// A revision iteration failed; the chapter keeps `version`
    RevisionAborted {
        version: u32,
        kind: ErrorKind,
        message: String,
    },
    Completed {
        version: u32,
        overall_score: f64,
        priority: Priority,
        needs_review: bool,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
    SummaryCreated {
        range: ChapterRange,
        meta: bool,
    },
}

impl EventKind {
    pub fn event_type(&self) -> &'static str {
        match self {
            EventKind::AssignmentCreated { .. } => "assignment_created",
            EventKind::DraftReady { .. } => "draft_ready",
            EventKind::Evaluated { .. } => "evaluated",
            EventKind::RevisionIteration { .. } => "revision_iteration",
            EventKind::RevisionAborted { .. } => "revision_aborted",
            EventKind::Completed { .. } => "completed",
            EventKind::Failed { .. } => "failed",
            EventKind::SummaryCreated { .. } => "summary_created",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub project_id: String,
    pub chapter_number: u32,
    #[serde(flatten)]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
}

impl PipelineEvent {
    pub fn new(project_id: impl Into<String>, chapter_number: u32, kind: EventKind) -> Self {
        Self {
            project_id: project_id.into(),
            chapter_number,
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }
}

/// Destination for lifecycle events. Best-effort: errors are logged by the dispatcher.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: &PipelineEvent) -> Result<()>;

    fn name(&self) -> &str;
}

/// Logs every event through `tracing`
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: &PipelineEvent) -> Result<()> {
        tracing::info!(
            project = %event.project_id,
            chapter = event.chapter_number,
            event = event.event_type(),
            "Pipeline event"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "tracing"
    }
}

/// Appends events as JSON lines
pub struct JsonlEventSink {
    path: PathBuf,
}

impl JsonlEventSink {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("Failed to create event log directory")?;
        }
        Ok(Self { path })
    }
}

#[async_trait]
impl EventSink for JsonlEventSink {
    async fn emit(&self, event: &PipelineEvent) -> Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open event log {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}

/// Non-blocking fan-out of events to sinks
pub struct EventDispatcher {
    tx: Mutex<Option<mpsc::UnboundedSender<PipelineEvent>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl EventDispatcher {
    /// Start the delivery task. Must be called inside a tokio runtime.
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<PipelineEvent>();
        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                for sink in &sinks {
                    let delivery = AssertUnwindSafe(sink.emit(&event)).catch_unwind().await;
                    match delivery {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => tracing::warn!(
                            sink = sink.name(),
                            event = event.event_type(),
                            "Event sink failed: {e:#}"
                        ),
                        Err(_) => tracing::warn!(
                            sink = sink.name(),
                            event = event.event_type(),
                            "Event sink panicked"
                        ),
                    }
                }
            }
        });
        Self {
            tx: Mutex::new(Some(tx)),
            worker: tokio::sync::Mutex::new(Some(worker)),
        }
    }

    /// Dispatcher that drops every event
    pub fn disabled() -> Self {
        Self {
            tx: Mutex::new(None),
            worker: tokio::sync::Mutex::new(None),
        }
    }

    /// Queue an event; never blocks and never fails
    pub fn emit(&self, event: PipelineEvent) {
        let Ok(guard) = self.tx.lock() else {
            return;
        };
        if let Some(tx) = guard.as_ref() {
            if tx.send(event).is_err() {
                tracing::debug!("Event dispatcher closed; dropping event");
            }
        }
    }

    /// Stop accepting events and wait until queued ones are delivered
    pub async fn shutdown(&self) {
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }
        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                tracing::warn!("Event dispatcher task ended abnormally: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CollectingSink(Mutex<Vec<String>>);

    #[async_trait]
    impl EventSink for CollectingSink {
        async fn emit(&self, event: &PipelineEvent) -> Result<()> {
            self.0.lock().unwrap().push(event.event_type().to_string());
            Ok(())
        }

        fn name(&self) -> &str {
            "collecting"
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl EventSink for BrokenSink {
        async fn emit(&self, _event: &PipelineEvent) -> Result<()> {
            anyhow::bail!("sink offline")
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    struct PanickingSink;

    #[async_trait]
    impl EventSink for PanickingSink {
        async fn emit(&self, _event: &PipelineEvent) -> Result<()> {
            panic!("sink bug")
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }

    fn draft_ready() -> PipelineEvent {
        PipelineEvent::new("p", 1, EventKind::DraftReady { version: 1, word_count: 10 })
    }

    #[tokio::test]
    async fn test_failing_sinks_do_not_block_delivery() {
        let collecting = Arc::new(CollectingSink(Mutex::new(Vec::new())));
        let dispatcher = EventDispatcher::new(vec![
            Arc::new(BrokenSink),
            Arc::new(PanickingSink),
            collecting.clone(),
        ]);
        dispatcher.emit(draft_ready());
        dispatcher.emit(PipelineEvent::new(
            "p",
            1,
            EventKind::RevisionIteration {
                iteration: 1,
                max_iterations: 3,
            },
        ));
        dispatcher.shutdown().await;

        assert_eq!(
            *collecting.0.lock().unwrap(),
            vec!["draft_ready", "revision_iteration"]
        );
    }

    #[tokio::test]
    async fn test_emit_after_shutdown_is_silent() {
        let dispatcher = EventDispatcher::new(vec![]);
        dispatcher.shutdown().await;
        dispatcher.emit(draft_ready());
        EventDispatcher::disabled().emit(draft_ready());
    }

    #[test]
    fn test_event_serialization_is_flat() {
        let json = serde_json::to_value(draft_ready()).unwrap();
        assert_eq!(json["event_type"], "draft_ready");
        assert_eq!(json["project_id"], "p");
        assert_eq!(json["version"], 1);
    }

    #[tokio::test]
    async fn test_jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events").join("log.jsonl");
        let sink = JsonlEventSink::new(path.clone()).unwrap();
        sink.emit(&draft_ready()).await.unwrap();
        sink.emit(&draft_ready()).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: PipelineEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.event_type(), "draft_ready");
    }
}
