// Summarizer-role prompts and response handling

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::policy::target_summary_words;
use crate::errors::TransportError;
use crate::generators::{AgentRole, GenerationRequest, Generator};
use crate::llm::SamplingParams;
use crate::parsing::{parse_json, word_count, Parsed};

const SUMMARIZER_SYSTEM: &str = "You compress fiction into dense, factual summaries for \
a writer who must continue the story. Keep names, places, objects, decisions and \
open questions. Drop style and description.";

/// Facts later chapters must not contradict
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuityPoints {
    pub characters_introduced: Vec<String>,
    pub characters_present: Vec<String>,
    pub locations: Vec<String>,
    pub time_markers: Vec<String>,
    pub rules_established: Vec<String>,
    pub items_introduced: Vec<String>,
    pub relationships_changed: Vec<String>,
    pub promises_made: Vec<String>,
    pub unresolved_threads: Vec<String>,
}

impl ContinuityPoints {
    pub fn is_empty(&self) -> bool {
        self == &ContinuityPoints::default()
    }

    /// Render as a compact reference block
    pub fn render(&self) -> String {
        let sections = [
            ("Characters introduced", &self.characters_introduced),
            ("Characters present", &self.characters_present),
            ("Locations", &self.locations),
            ("Time", &self.time_markers),
            ("Rules", &self.rules_established),
            ("Items", &self.items_introduced),
            ("Relationships", &self.relationships_changed),
            ("Promises", &self.promises_made),
            ("Unresolved threads", &self.unresolved_threads),
        ];
        sections
            .iter()
            .filter(|(_, items)| !items.is_empty())
            .map(|(title, items)| format!("{title}: {}", items.join("; ")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Summary text plus the threads it lists as still open
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryDraft {
    pub text: String,
    pub unresolved_threads: Vec<String>,
}

pub(crate) struct Summarizer {
    generator: Arc<dyn Generator>,
    sampling: SamplingParams,
    compression_ratio: usize,
}

impl Summarizer {
    pub(crate) fn new(generator: Arc<dyn Generator>, sampling: SamplingParams, compression_ratio: usize) -> Self {
        Self {
            generator,
            sampling,
            compression_ratio,
        }
    }

    async fn call(&self, prompt: String) -> Result<String, TransportError> {
        let request = GenerationRequest::prompt(AgentRole::Summarizer, prompt)
            .with_system(SUMMARIZER_SYSTEM)
            .with_sampling(self.sampling);
        Ok(self.generator.generate(request).await?.text)
    }

    /// One chapter → one summary
    pub(crate) async fn chapter(&self, number: u32, content: &str) -> Result<SummaryDraft, TransportError> {
        let target = target_summary_words(word_count(content), self.compression_ratio);
        let prompt = format!(
            "Summarize chapter {number} in about {target} words.\n\
             Cover the events, what changed for each character, and end with a section\n\
             \"## Active Threads\" listing open plot threads as bullet points.\n\n\
             ## Chapter {number}\n{content}"
        );
        let text = self.call(prompt).await?;
        Ok(draft_from_text(text))
    }

    /// Consecutive chapters → one window summary
    pub(crate) async fn window(&self, chapters: &[(u32, String)]) -> Result<SummaryDraft, TransportError> {
        let source_words: usize = chapters.iter().map(|(_, c)| word_count(c)).sum();
        let target = target_summary_words(source_words, self.compression_ratio);
        let (first, last) = match (chapters.first(), chapters.last()) {
            (Some(first), Some(last)) => (first.0, last.0),
            _ => (0, 0),
        };
        let mut prompt = format!(
            "Summarize chapters {first}-{last} in about {target} words, using these sections:\n\
             ## Major Events\n## Character States\n## World and Themes\n\
             ## Active Threads (bullet list of every unresolved thread)\n\n"
        );
        for (number, content) in chapters {
            prompt.push_str(&format!("## Chapter {number}\n{content}\n\n"));
        }
        let text = self.call(prompt).await?;
        Ok(draft_from_text(text))
    }

    /// Summaries → one meta-summary
    pub(crate) async fn meta(&self, parts: &[(String, &str, &[String])]) -> Result<SummaryDraft, TransportError> {
        let source_words: usize = parts.iter().map(|(_, text, _)| word_count(text)).sum();
        let target = target_summary_words(source_words, 2);
        let mut prompt = format!(
            "Merge these summaries into one of about {target} words. Keep every fact a later\n\
             chapter could depend on. End with \"## Active Threads\" listing threads still open.\n\n"
        );
        for (label, text, threads) in parts {
            prompt.push_str(&format!("## {label}\n{text}\n"));
            if !threads.is_empty() {
                prompt.push_str(&format!("Open threads: {}\n", threads.join("; ")));
            }
            prompt.push('\n');
        }
        let text = self.call(prompt).await?;
        Ok(draft_from_text(text))
    }

    pub(crate) async fn continuity(&self, content: &str) -> Result<Parsed<ContinuityPoints>, TransportError> {
        let prompt = format!(
            "Extract continuity facts from this text. Respond with JSON only:\n\
             {{\"characters_introduced\": [], \"characters_present\": [], \"locations\": [],\n\
             \"time_markers\": [], \"rules_established\": [], \"items_introduced\": [],\n\
             \"relationships_changed\": [], \"promises_made\": [], \"unresolved_threads\": []}}\n\n\
             {content}"
        );
        let text = self.call(prompt).await?;
        let parsed = parse_json::<ContinuityPoints>(&text);
        if let Parsed::Unparsed { reason, .. } = &parsed {
            tracing::warn!(%reason, "Failed to parse continuity extraction");
        }
        Ok(parsed)
    }
}

fn draft_from_text(text: String) -> SummaryDraft {
    let unresolved_threads = parse_active_threads(&text);
    SummaryDraft {
        text: text.trim().to_string(),
        unresolved_threads,
    }
}

/// Bullet items under an "Active Threads" / "Unresolved Threads" heading
pub fn parse_active_threads(text: &str) -> Vec<String> {
    let mut threads = Vec::new();
    let mut in_section = false;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('#') || (trimmed.ends_with(':') && !trimmed.starts_with(['-', '*'])) {
            let heading = trimmed.trim_start_matches('#').to_ascii_lowercase();
            in_section = heading.contains("active threads") || heading.contains("unresolved");
            continue;
        }
        if !in_section {
            continue;
        }
        let item = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
            .or_else(|| trimmed.strip_prefix("• "))
            .map(str::trim);
        if let Some(item) = item.filter(|i| !i.is_empty()) {
            threads.push(item.to_string());
        }
    }
    threads
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_active_threads() {
        let text = "## Major Events\n- The fleet sails\n\n## Active Threads\n- Who sent the letter?\n* The missing key\n\n## Notes\n- not a thread";
        assert_eq!(
            parse_active_threads(text),
            vec!["Who sent the letter?", "The missing key"]
        );
    }

    #[test]
    fn test_parse_threads_plain_heading() {
        let text = "Summary text.\nUnresolved threads:\n- Mara's debt\n";
        assert_eq!(parse_active_threads(text), vec!["Mara's debt"]);
    }

    #[test]
    fn test_no_threads_section() {
        assert!(parse_active_threads("Just a summary.\n- stray bullet").is_empty());
    }

    #[test]
    fn test_continuity_render_skips_empty() {
        let points = ContinuityPoints {
            locations: vec!["Harbour".into(), "Keep".into()],
            promises_made: vec!["Return by dawn".into()],
            ..Default::default()
        };
        assert_eq!(points.render(), "Locations: Harbour; Keep\nPromises: Return by dawn");
        assert!(!points.is_empty());
        assert!(ContinuityPoints::default().is_empty());
    }
}
