// Chapter production pipeline
//
// Drives one chapter through draft → evaluate → {revise → edit → evaluate}*
// with a bounded number of revision iterations, persisting every produced
// version and score, and hands committed chapters to the compression engine.

mod brief;
mod controller;
pub mod prompts;
mod types;

pub use controller::ChapterPipeline;
pub use types::{Assignment, PipelineOutcome, ProjectMaterials, WritingBrief};
