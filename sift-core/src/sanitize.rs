//! Sanitization of raw model output.
//!
//! Reasoning models (qwen3, deepseek-r1 and friends) wrap their chain of
//! thought in `<think>...</think>` spans, and some backends return an empty
//! text body with everything in a separate reasoning channel. The helpers here
//! turn either shape into the text a strategy should act on.

use crate::types::Generation;
use regex::Regex;
use std::sync::LazyLock;

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>(.*?)</think>").unwrap());

/// Remove every `<think>...</think>` span and trim the remainder.
pub fn strip_think_blocks(input: &str) -> String {
    THINK_BLOCK.replace_all(input, "").trim().to_string()
}

/// Usable content of a response: the sanitized text, or the sanitized
/// reasoning channel when the text is empty. Never fails; returns an empty
/// string only when both channels are empty.
pub fn content_of(generation: &Generation) -> String {
    let text = strip_think_blocks(&generation.text);
    if !text.is_empty() {
        return text;
    }
    generation
        .reasoning
        .as_deref()
        .map(strip_think_blocks)
        .unwrap_or_default()
}

/// The hidden reasoning behind a response: the reasoning channel if the
/// backend filled it, otherwise whatever was inside `<think>` spans.
pub fn reasoning_of(generation: &Generation) -> Option<String> {
    if let Some(reasoning) = generation.reasoning.as_deref() {
        let trimmed = reasoning.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }
    let inline = THINK_BLOCK
        .captures_iter(&generation.text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    (!inline.is_empty()).then_some(inline)
}

/// Truncate to at most `max` bytes on a char boundary.
pub fn truncate_str(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Truncate to at most `max` bytes, preferring to cut right after the last
/// sentence terminator inside the budget. Falls back to a plain char-boundary
/// cut when no terminator exists.
pub fn truncate_at_sentence(s: &str, max: usize) -> &str {
    let head = truncate_str(s, max);
    if head.len() == s.len() {
        return head;
    }
    match head.rfind(['.', '!', '?', '\n']) {
        Some(idx) if idx > 0 => head[..=idx].trim_end(),
        _ => head,
    }
}

/// Bounded excerpt of raw model text for error messages and logs.
pub fn excerpt(s: &str) -> String {
    const MAX: usize = 200;
    let head = truncate_str(s, MAX);
    if head.len() < s.len() {
        format!("{head}...")
    } else {
        head.to_string()
    }
}
