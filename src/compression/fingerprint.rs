// Content fingerprints: the invalidation key of every summary

use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

use crate::store::{ChapterRange, Summary, SummarySource};

/// Digest of the exact chapter contents in order.
///
/// Chapter numbers are part of the digest, so the same text under a
/// different number fingerprints differently.
pub fn chapters_fingerprint<'a, I>(chapters: I) -> String
where
    I: IntoIterator<Item = (u32, &'a str)>,
{
    let mut hasher = Sha256::new();
    hasher.update(b"chapters");
    for (number, content) in chapters {
        hasher.update(number.to_be_bytes());
        hasher.update((content.len() as u64).to_be_bytes());
        hasher.update(content.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Digest of child summary fingerprints, for meta-summaries
pub fn summaries_fingerprint<'a, I>(fingerprints: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut hasher = Sha256::new();
    hasher.update(b"summaries");
    for fp in fingerprints {
        hasher.update((fp.len() as u64).to_be_bytes());
        hasher.update(fp.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Fingerprint a summary *should* carry given current chapter content.
///
/// `contents` maps chapter number → accepted content; `by_range` indexes the
/// project's summaries. Returns `None` when a source chapter has no content or
/// a referenced child summary is gone, both of which make the summary stale.
pub fn expected_fingerprint(
    summary: &Summary,
    contents: &BTreeMap<u32, String>,
    by_range: &HashMap<ChapterRange, &Summary>,
) -> Option<String> {
    expected_inner(summary, contents, by_range, 0)
}

// Bounded depth guards against a malformed self-referencing source list
const MAX_DEPTH: usize = 32;

fn expected_inner(
    summary: &Summary,
    contents: &BTreeMap<u32, String>,
    by_range: &HashMap<ChapterRange, &Summary>,
    depth: usize,
) -> Option<String> {
    if depth > MAX_DEPTH {
        return None;
    }
    match &summary.source {
        SummarySource::Chapters => {
            let mut sources = Vec::with_capacity(summary.range.len() as usize);
            for n in summary.range.numbers() {
                sources.push((n, contents.get(&n)?.as_str()));
            }
            Some(chapters_fingerprint(sources))
        }
        SummarySource::Summaries(refs) => {
            let mut child_fps = Vec::with_capacity(refs.len());
            for r in refs {
                let child = by_range.get(&r.range)?;
                if child.id != r.id {
                    return None;
                }
                child_fps.push(expected_inner(child, contents, by_range, depth + 1)?);
            }
            Some(summaries_fingerprint(child_fps.iter().map(String::as_str)))
        }
    }
}

/// Whether `summary` still matches current content
pub fn is_fresh(
    summary: &Summary,
    contents: &BTreeMap<u32, String>,
    by_range: &HashMap<ChapterRange, &Summary>,
) -> bool {
    expected_fingerprint(summary, contents, by_range).as_deref() == Some(summary.fingerprint.as_str())
}
