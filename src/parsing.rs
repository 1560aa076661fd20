// Structured-response parsing
//
// Language-model output is loosely-typed text that is *supposed* to contain
// JSON. Parsing never fails hard: the result is either `Parsed(value)` or
// `Unparsed { raw, reason }`, and every consumer decides its own fallback.

use serde::de::DeserializeOwned;

/// Outcome of parsing a structured generator response
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    Parsed(T),
    Unparsed { raw: String, reason: String },
}

impl<T> Parsed<T> {
    pub fn is_parsed(&self) -> bool {
        matches!(self, Parsed::Parsed(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Parsed::Parsed(value) => Some(value),
            Parsed::Unparsed { .. } => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Parsed<U> {
        match self {
            Parsed::Parsed(value) => Parsed::Parsed(f(value)),
            Parsed::Unparsed { raw, reason } => Parsed::Unparsed { raw, reason },
        }
    }
}

/// Parse `text` as JSON of type `T`.
///
/// Accepts bare JSON, JSON wrapped in markdown code fences, and JSON embedded
/// in surrounding prose (the outermost `{...}` or `[...]` span is tried).
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Parsed<T> {
    let stripped = strip_markdown_fences(text.trim());

    let first_error = match serde_json::from_str::<T>(stripped) {
        Ok(value) => return Parsed::Parsed(value),
        Err(e) => e.to_string(),
    };

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (stripped.find(open), stripped.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str::<T>(&stripped[start..=end]) {
                    return Parsed::Parsed(value);
                }
            }
        }
    }

    Parsed::Unparsed {
        raw: text.to_string(),
        reason: first_error,
    }
}

/// Strip leading/trailing markdown code fences (```json ... ``` or ``` ... ```)
pub fn strip_markdown_fences(s: &str) -> &str {
    let s = s.trim();
    let s = if let Some(rest) = s.strip_prefix("```json") {
        rest
    } else if let Some(rest) = s.strip_prefix("```") {
        rest
    } else {
        s
    };
    if let Some(rest) = s.strip_suffix("```") {
        rest.trim()
    } else {
        s.trim()
    }
}

/// Whitespace-delimited token count
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
