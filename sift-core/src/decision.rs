//! Planner decision parsing.
//!
//! The planner is asked for `Action: Answer` or `Action: Search` plus a
//! `Query:` line, but small models drift from the format. The parser accepts
//! the common drifts and rejects anything it cannot turn into an action.

use crate::error::ParseError;
use crate::sanitize::excerpt;
use regex::Regex;
use std::sync::LazyLock;

static QUERY_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)query\s*[:\-]\s*(.+)").unwrap());

static SEARCH_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)search[\s:\-]*").unwrap());

/// A structured planner action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannerDecision {
    /// Enough knowledge has been gathered; write the final answer.
    Answer,
    /// Run a search with the given query.
    Search { query: String },
}

impl PlannerDecision {
    pub fn label(&self) -> &'static str {
        match self {
            PlannerDecision::Answer => "answer",
            PlannerDecision::Search { .. } => "search",
        }
    }
}

/// Convert sanitized planner text into a decision.
pub fn parse_decision(raw: &str) -> Result<PlannerDecision, ParseError> {
    let trimmed = raw.trim();
    let lower = trimmed.to_lowercase();

    if lower.contains("action: answer") || lower.starts_with("answer") {
        return Ok(PlannerDecision::Answer);
    }

    // Models that skip the action format and emit the answer object directly.
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Ok(PlannerDecision::Answer);
    }

    if lower.contains("search") {
        return match extract_query(trimmed) {
            Some(query) => Ok(PlannerDecision::Search { query }),
            None => Err(ParseError::MissingQuery),
        };
    }

    Err(ParseError::UnrecognizedDecision {
        excerpt: excerpt(raw),
    })
}

fn extract_query(raw: &str) -> Option<String> {
    if let Some(query) = QUERY_LABEL
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|q| !q.is_empty())
    {
        return Some(query.to_string());
    }

    for line in raw.lines() {
        let line = line.trim();
        if let Some(m) = SEARCH_WORD.find(line).filter(|m| m.start() == 0) {
            let rest = line[m.end()..].trim();
            if !rest.is_empty() {
                return Some(rest.to_string());
            }
        }
    }

    let m = SEARCH_WORD.find(raw)?;
    let tail = raw[m.end()..].trim();
    (!tail.is_empty()).then(|| tail.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search(q: &str) -> PlannerDecision {
        PlannerDecision::Search { query: q.into() }
    }

    #[test]
    fn test_action_answer() {
        assert_eq!(parse_decision("Action: Answer").unwrap(), PlannerDecision::Answer);
        assert_eq!(parse_decision("ACTION: ANSWER\n").unwrap(), PlannerDecision::Answer);
        assert_eq!(
            parse_decision("Answer: it is blue").unwrap(),
            PlannerDecision::Answer
        );
    }

    #[test]
    fn test_bare_json_is_implicit_answer() {
        assert_eq!(
            parse_decision("{\"price\": 12}").unwrap(),
            PlannerDecision::Answer
        );
    }

    #[test]
    fn test_action_search_with_query_label() {
        assert_eq!(
            parse_decision("Action: Search\nQuery: foo").unwrap(),
            search("foo")
        );
        assert_eq!(
            parse_decision("Action: Search\nquery - rust borrow checker").unwrap(),
            search("rust borrow checker")
        );
    }

    #[test]
    fn test_search_line_without_label() {
        assert_eq!(
            parse_decision("I think we should\nSearch: tallest mountain").unwrap(),
            search("tallest mountain")
        );
    }

    #[test]
    fn test_search_tail_fallback() {
        assert_eq!(
            parse_decision("Let me search population of Oslo").unwrap(),
            search("population of Oslo")
        );
    }

    #[test]
    fn test_search_without_query_is_error() {
        assert!(matches!(
            parse_decision("Action: Search"),
            Err(ParseError::MissingQuery)
        ));
        assert!(matches!(
            parse_decision("search"),
            Err(ParseError::MissingQuery)
        ));
    }

    #[test]
    fn test_unrecognized_is_error() {
        assert!(matches!(
            parse_decision("I am not sure what to do"),
            Err(ParseError::UnrecognizedDecision { .. })
        ));
    }

    #[test]
    fn test_answer_wins_over_search() {
        let raw = "We searched enough.\nAction: Answer";
        assert_eq!(parse_decision(raw).unwrap(), PlannerDecision::Answer);
    }
}
