//! Fundamental types shared by the providers and the research strategies.

use crate::error::BudgetExhausted;
use serde::{Deserialize, Serialize};

/// A single item returned by a search provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl SearchResult {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        snippet: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
        }
    }
}

/// The output of one `generate` call on a language model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// User-facing text. May still contain `<think>` spans.
    pub text: String,
    /// Secondary channel some backends use for hidden chain-of-thought.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Cost of the call in the caller's accounting unit.
    #[serde(default)]
    pub cost: f64,
}

impl Generation {
    /// A plain text response with zero cost.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reasoning: None,
            cost: 0.0,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }
}

/// What a research call hands back to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    /// The final answer text.
    pub answer: String,
    /// Sum of every provider call's reported cost plus per-search cost.
    pub cost: f64,
    /// Knowledge to seed a follow-up call: free text for the scratchpad
    /// strategy, a JSON fact array for the graph reader.
    pub knowledge: String,
    /// Set when the budget ran out before a confident answer.
    #[serde(skip)]
    pub warning: Option<BudgetExhausted>,
}

impl ResearchResult {
    /// True when the answer is best-effort because a budget ran out.
    pub fn is_exhausted(&self) -> bool {
        self.warning.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_builders() {
        let generation = Generation::text("hello")
            .with_reasoning("thinking")
            .with_cost(0.25);
        assert_eq!(generation.text, "hello");
        assert_eq!(generation.reasoning.as_deref(), Some("thinking"));
        assert!((generation.cost - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_result_exhaustion_flag() {
        let mut result = ResearchResult::default();
        assert!(!result.is_exhausted());
        result.warning = Some(BudgetExhausted {
            budget: "step",
            limit: 3,
        });
        assert!(result.is_exhausted());
    }
}
