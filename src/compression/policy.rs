// Trigger policy and size estimates

use crate::parsing::word_count;
use crate::store::ChapterRange;

/// Whether context usage has crossed `threshold` (a fraction of `max`)
pub fn should_summarize(current: usize, max: usize, threshold: f64) -> bool {
    if max == 0 {
        return current > 0;
    }
    (current as f64 / max as f64) >= threshold
}

/// Rough token count: 1.33 tokens per whitespace-delimited word
pub fn estimate_tokens(text: &str) -> usize {
    (word_count(text) as f64 * 1.33) as usize
}

/// Chapters to summarize when `total` are complete and the last `retained` stay raw.
///
/// `None` when everything fits inside the retention window.
pub fn calculate_summary_range(total: u32, retained: u32) -> Option<ChapterRange> {
    if total <= retained {
        None
    } else {
        Some(ChapterRange::new(1, total - retained))
    }
}

/// Summary length target for `source_words` at `ratio`:1, never below 50 words
pub fn target_summary_words(source_words: usize, ratio: usize) -> usize {
    (source_words / ratio.max(1)).max(50)
}
