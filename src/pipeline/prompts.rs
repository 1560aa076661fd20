// Prompt text for the planner, drafter and reviser roles

use super::types::{ProjectMaterials, WritingBrief};
use crate::evaluator::{Priority, ScoreRecord};
use crate::store::ChapterUnit;

pub const PLANNER_SYSTEM: &str = "You are a story director. Turn a chapter outline into \
concrete writing instructions: scene list, point of view, emotional arc, and which open \
threads to advance. Be brief and specific.";

pub const DRAFTER_SYSTEM: &str = "You are a novelist. Write complete chapters in polished \
prose. Stay consistent with everything established earlier. Output only the chapter text.";

pub const REVISER_SYSTEM: &str = "You are a novelist revising your own chapter after an \
editor's review. Address every point raised while keeping what works. Output only the \
revised chapter text.";

fn heading(title: Option<&str>, number: u32) -> String {
    match title {
        Some(t) => format!("Chapter {number}: {t}"),
        None => format!("Chapter {number}"),
    }
}

pub fn planner(chapter: &ChapterUnit, brief: &WritingBrief, materials: &ProjectMaterials) -> String {
    let mut prompt = String::new();
    if let Some(outline) = materials.project_outline.as_deref() {
        prompt.push_str(&format!("## Book outline\n{outline}\n\n"));
    }
    let context = brief.context_text();
    if !context.is_empty() {
        prompt.push_str(&context);
        prompt.push_str("\n\n");
    }
    prompt.push_str(&format!(
        "## Assignment\n{}\nTarget length: {} words\n\n{}\n\n\
         Write the instructions the author will follow for this chapter.",
        heading(chapter.title.as_deref(), chapter.chapter_number),
        chapter.target_word_count,
        chapter.outline
    ));
    prompt
}

pub fn draft(chapter: &ChapterUnit, brief: &WritingBrief, materials: &ProjectMaterials) -> String {
    let mut prompt = String::new();
    if let Some(outline) = materials.project_outline.as_deref() {
        prompt.push_str(&format!("## Book outline\n{outline}\n\n"));
    }
    if let Some(style) = materials.style_guide.as_deref() {
        prompt.push_str(&format!("## Style guide\n{style}\n\n"));
    }
    let context = brief.context_text();
    if !context.is_empty() {
        prompt.push_str(&context);
        prompt.push_str("\n\n");
    }
    prompt.push_str(&format!(
        "## Write {}\nOutline: {}\n",
        heading(chapter.title.as_deref(), chapter.chapter_number),
        chapter.outline
    ));
    if let Some(instructions) = brief.instructions.as_deref() {
        prompt.push_str(&format!("Instructions:\n{instructions}\n"));
    }
    prompt.push_str(&format!(
        "\nWrite about {} words.",
        chapter.target_word_count
    ));
    prompt
}

/// Free-text notes derived from a score record
pub fn revision_notes(score: &ScoreRecord) -> String {
    let mut notes = Vec::new();
    if !score.assessment.trim().is_empty() {
        notes.push(score.assessment.trim().to_string());
    }
    if !score.weaknesses.is_empty() {
        notes.push(format!("Weaknesses: {}", score.weaknesses.join("; ")));
    }
    if !score.continuity_issues.is_empty() {
        notes.push(format!("Continuity issues: {}", score.continuity_issues.join("; ")));
    }
    notes.join("\n")
}

pub fn revise(chapter: &ChapterUnit, content: &str, score: &ScoreRecord, notes: &str, brief: &WritingBrief) -> String {
    let mut prompt = String::new();
    let context = brief.context_text();
    if !context.is_empty() {
        prompt.push_str(&context);
        prompt.push_str("\n\n");
    }
    prompt.push_str(&format!(
        "## Current draft of {} (scored {:.1}/10)\n{content}\n\n",
        heading(chapter.title.as_deref(), chapter.chapter_number),
        score.overall_score
    ));

    let mut suggestions = score.suggestions.clone();
    suggestions.sort_by(|a, b| b.priority.cmp(&a.priority));
    if !suggestions.is_empty() {
        prompt.push_str("## Revision instructions\n");
        for s in &suggestions {
            let marker = if s.priority >= Priority::High { "!" } else { "-" };
            prompt.push_str(&format!("{marker} [{}] {}: {}\n", s.priority, s.issue, s.suggestion));
        }
        prompt.push('\n');
    }
    if !notes.trim().is_empty() {
        prompt.push_str(&format!("## Editor notes\n{}\n\n", notes.trim()));
    }
    prompt.push_str(&format!(
        "Rewrite the full chapter (about {} words) addressing the points above.",
        chapter.target_word_count
    ));
    prompt
}
