// Quill - multi-agent chapter writing pipeline
// Library exports

pub mod compression;
pub mod config;
pub mod editors;
pub mod errors;
pub mod evaluator;
pub mod events;
pub mod gateway;
pub mod generators;
pub mod llm;
pub mod logging;
pub mod parsing;
pub mod pipeline;
pub mod retriever;
pub mod store;

pub use errors::{ErrorKind, PipelineError, PipelineResult, StoreError, TransportError};
pub use pipeline::{Assignment, ChapterPipeline, PipelineOutcome, ProjectMaterials};
