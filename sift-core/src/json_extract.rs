//! Recovering JSON from noisy model output.
//!
//! Small models wrap JSON in markdown fences, prefix it with chatter, or
//! trail it with explanations. [`extract_json`] is the cheap heuristic used on
//! every structured response: fenced block first, otherwise the span from the
//! first opener to the *last* matching closer. It does no depth balancing, so
//! stray brackets in the surrounding prose can break it; [`parse_json`] covers
//! that case by falling back to a string-aware bracket-depth scan.

use crate::error::ParseError;
use crate::sanitize::excerpt;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::LazyLock;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*\n(.*?)\n```").unwrap());

/// Extract the JSON object or array embedded in `raw`.
///
/// Returns `raw` unchanged when no opener is present, so the caller's parse
/// fails explicitly instead of silently succeeding on something else.
pub fn extract_json(raw: &str) -> &str {
    if let Some(body) = CODE_FENCE.captures(raw).and_then(|c| c.get(1)) {
        return body.as_str().trim();
    }
    let Some(start) = raw.find(['{', '[']) else {
        return raw;
    };
    let closer = if raw.as_bytes()[start] == b'{' {
        '}'
    } else {
        ']'
    };
    match raw[start..].rfind(closer) {
        Some(offset) => &raw[start..=start + offset],
        None => raw,
    }
}

/// First balanced JSON object or array in `raw`, honouring string literals
/// and escapes. Openers whose brackets never balance are skipped.
pub fn extract_balanced_json(raw: &str) -> Option<&str> {
    balanced_candidates(raw).next()
}

fn balanced_candidates(raw: &str) -> impl Iterator<Item = &str> {
    raw.char_indices()
        .filter(|(_, c)| matches!(c, '{' | '['))
        .filter_map(move |(start, _)| balanced_end(raw, start).map(|end| &raw[start..end]))
}

/// Byte index one past the bracket closing the opener at `start`.
fn balanced_end(raw: &str, start: usize) -> Option<usize> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(ch) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(start + offset + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a typed value out of model output.
///
/// Tries the [`extract_json`] slice first, then every balanced candidate in
/// order. The error reports the first parse failure with a bounded excerpt of
/// the raw text.
pub fn parse_json<T: DeserializeOwned>(raw: &str, context: &'static str) -> Result<T, ParseError> {
    let first_err = match serde_json::from_str::<T>(extract_json(raw)) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };
    for candidate in balanced_candidates(raw) {
        if let Ok(value) = serde_json::from_str::<T>(candidate) {
            return Ok(value);
        }
    }
    Err(ParseError::Json {
        context,
        message: first_err.to_string(),
        excerpt: excerpt(raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    #[test]
    fn test_extract_fenced_block() {
        let raw = "Here you go:\n```json\n{\"a\": 1}\n```\nThanks!";
        assert_eq!(extract_json(raw), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_unlabelled_fence() {
        let raw = "```\n[\"q1\", \"q2\"]\n```";
        assert_eq!(extract_json(raw), "[\"q1\", \"q2\"]");
    }

    #[test]
    fn test_extract_with_leading_and_trailing_prose() {
        let raw = "Sure! The plan is {\"strategy\": [\"x\"]} hope it helps";
        assert_eq!(extract_json(raw), "{\"strategy\": [\"x\"]}");
    }

    #[test]
    fn test_extract_array_uses_last_closer() {
        let raw = "queries: [\"a\", [\"b\"]] done";
        assert_eq!(extract_json(raw), "[\"a\", [\"b\"]]");
    }

    #[test]
    fn test_extract_without_opener_returns_input() {
        assert_eq!(extract_json("no json here"), "no json here");
    }

    #[test]
    fn test_extract_without_closer_returns_input() {
        assert_eq!(extract_json("broken {\"a\": 1"), "broken {\"a\": 1");
    }

    #[test]
    fn test_heuristic_limitation_with_trailing_brace() {
        // Documented: the last closer may belong to prose.
        let raw = "{\"a\": 1} and then a stray }";
        assert_eq!(extract_json(raw), "{\"a\": 1} and then a stray }");
    }

    #[test]
    fn test_balanced_scan_ignores_brackets_in_strings() {
        let raw = "note [x {\"text\": \"a } b ]\", \"n\": 2} tail }";
        assert_eq!(
            extract_balanced_json(raw),
            Some("{\"text\": \"a } b ]\", \"n\": 2}")
        );
    }

    #[test]
    fn test_balanced_scan_handles_escaped_quotes() {
        let raw = r#"x {"q": "say \"hi\" }"} y"#;
        assert_eq!(extract_balanced_json(raw), Some(r#"{"q": "say \"hi\" }"}"#));
    }

    #[test]
    fn test_parse_json_falls_back_to_balanced_scan() {
        let raw = "{\"can_answer\": true} (confidence {high})";
        let value: Value = parse_json(raw, "answer check").unwrap();
        assert_eq!(value, json!({"can_answer": true}));
    }

    #[test]
    fn test_parse_json_error_carries_context() {
        let err = parse_json::<Vec<String>>("nothing useful", "neighbors").unwrap_err();
        match err {
            ParseError::Json {
                context, excerpt, ..
            } => {
                assert_eq!(context, "neighbors");
                assert_eq!(excerpt, "nothing useful");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
