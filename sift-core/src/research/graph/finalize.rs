//! Multi-phase answer finalization for the graph reader.
//!
//! 1. Condense the notebook into a knowledge block (bullets, or condensed
//!    paragraphs once the notebook is large).
//! 2. Build a compact question from the research goal plus any output-format
//!    instructions found in the original question.
//! 3. Ask the finalizer.
//! 4. On empty output, retry with a simplified instruction, feeding back the
//!    previous attempt's reasoning or a shrinking slice of the knowledge.
//! 5. Fall back to the knowledge block itself.

use super::prompts::{self, CONDENSER_SYSTEM_PROMPT, FINALIZER_SYSTEM_PROMPT};
use super::{GraphReaderStrategy, GraphState, RationalPlan};
use crate::error::{ProviderError, Result};
use crate::notebook::{AtomicFact, dedup_texts};
use crate::research::session::{ResearchPhase, ResearchSession};
use crate::research::strategy::Role;
use crate::sanitize::{
    content_of, reasoning_of, strip_think_blocks, truncate_at_sentence, truncate_str,
};
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Phrases that open an output-format instruction inside a question.
/// Matched case-insensitively; the earliest match wins.
const FORMAT_MARKERS: &[&str] = &[
    "format instructions",
    "output format",
    "response format",
    "answer format",
    "format your answer",
    "format your response",
    "format the answer",
    "use the following format",
    "in the following format",
    "respond in",
    "respond with",
    "respond only",
    "reply in",
    "reply with",
    "return the answer",
    "return your answer",
    "return only",
    "output only",
    "output as",
    "answer in json",
    "in json format",
    "as json",
    "json schema",
];

/// Byte offsets of every format marker that starts a word, ascending.
fn marker_positions(lower: &str) -> Vec<usize> {
    let mut positions: Vec<usize> = FORMAT_MARKERS
        .iter()
        .flat_map(|marker| lower.match_indices(marker).map(|(i, _)| i))
        .filter(|&i| i == 0 || !lower.as_bytes()[i - 1].is_ascii_alphanumeric())
        .collect();
    positions.sort_unstable();
    positions.dedup();
    positions
}

/// Split a question into its research part and a trailing format-instruction
/// segment. The segment starts at the sentence or line holding the earliest
/// format marker that leaves a non-empty research part before it.
pub fn split_format_instructions(question: &str) -> (&str, Option<&str>) {
    let lower = question.to_ascii_lowercase();
    for marker_at in marker_positions(&lower) {
        let segment_start = question[..marker_at]
            .rfind(['\n', '.', '?', '!', ':'])
            .map_or(0, |i| i + 1);
        let head = question[..segment_start].trim();
        if head.is_empty() {
            continue;
        }
        let segment = question[segment_start..].trim();
        return (head, (!segment.is_empty()).then_some(segment));
    }
    (question.trim(), None)
}

/// Research goal for a plan that did not state one: the question without its
/// format instructions, capped at `max_chars` bytes.
pub fn derive_goal(question: &str, max_chars: usize) -> String {
    let (head, _) = split_format_instructions(question);
    truncate_str(head, max_chars).trim().to_string()
}

/// The question handed to the finalizer.
pub fn compact_question(plan: &RationalPlan) -> String {
    let (_, format) = split_format_instructions(&plan.original_question);
    let goal = if plan.research_goal.trim().is_empty() {
        plan.original_question.trim()
    } else {
        plan.research_goal.trim()
    };
    match format {
        Some(format) if !goal.contains(format) => format!("{goal}\n\n{format}"),
        _ => goal.to_string(),
    }
}

fn bullet_list(facts: &[&AtomicFact]) -> String {
    facts
        .iter()
        .map(|f| {
            if f.source_url.is_empty() {
                format!("- {}", f.content)
            } else {
                format!("- {} ({})", f.content, f.source_url)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn finalizer_prompt(question: &str, knowledge: &str) -> String {
    let knowledge = if knowledge.trim().is_empty() {
        "(empty)"
    } else {
        knowledge
    };
    format!(
        "User Question:\n{question}\n\nNotebook Facts:\n{knowledge}\n\nWrite a direct answer grounded in these facts. If facts are insufficient, say so clearly."
    )
}

fn retry_prompt(question: &str, notes: &str) -> String {
    format!(
        "Question:\n{question}\n\nNotes:\n{notes}\n\nAnswer the question in a few sentences using only the notes."
    )
}

/// Text and reasoning of one finalizer attempt.
struct Attempt {
    text: String,
    reasoning: Option<String>,
}

impl GraphReaderStrategy {
    /// Build the knowledge block from the notebook.
    pub(super) async fn condense(
        &self,
        session: &mut ResearchSession,
        state: &GraphState,
    ) -> Result<String> {
        let all = state.notebook.facts();
        let kept: HashSet<&str> = dedup_texts(all.iter().map(|f| f.content.as_str()))
            .into_iter()
            .collect();
        let facts: Vec<&AtomicFact> = all
            .iter()
            .filter(|f| kept.contains(f.content.trim()))
            .collect();

        if facts.len() <= self.config.direct_fact_threshold {
            return Ok(bullet_list(&facts));
        }

        session.enter(ResearchPhase::Condensing);
        let batches: Vec<&[&AtomicFact]> = facts.chunks(self.config.condense_batch_size).collect();
        info!(facts = facts.len(), batches = batches.len(), "Condensing notebook");

        let mut parts = Vec::with_capacity(batches.len());
        for (i, batch) in batches.into_iter().enumerate() {
            match self.condense_batch(session, &state.plan, batch).await {
                Ok(text) if !text.is_empty() => parts.push(text),
                Ok(_) => {
                    warn!(batch = i, "Condenser returned nothing, using bullet list");
                    parts.push(bullet_list(batch));
                }
                Err(e) if e.is_abort() => return Err(e),
                Err(e) => {
                    warn!(batch = i, error = %e, "Condensation failed, using bullet list");
                    parts.push(bullet_list(batch));
                }
            }
        }
        Ok(parts.join("\n\n"))
    }

    async fn condense_batch(
        &self,
        session: &mut ResearchSession,
        plan: &RationalPlan,
        batch: &[&AtomicFact],
    ) -> Result<String> {
        let contents: Vec<&str> = batch.iter().map(|f| f.content.as_str()).collect();
        let user = self.prompts.render(
            prompts::CONDENSE,
            &json!({ "goal": plan.research_goal, "facts": contents }),
        )?;
        let generation = session
            .generate(
                Role::Condenser.as_str(),
                self.condenser.as_ref(),
                CONDENSER_SYSTEM_PROMPT,
                &user,
            )
            .await?;
        Ok(content_of(&generation))
    }

    /// One finalizer call. Only the answer channel counts as output; the
    /// reasoning is kept for the next retry. Provider failures count as an
    /// empty attempt.
    async fn attempt(
        &self,
        session: &mut ResearchSession,
        user: &str,
        attempt: usize,
    ) -> Result<Attempt> {
        match session
            .generate(
                Role::Finalizer.as_str(),
                self.finalizer.as_ref(),
                FINALIZER_SYSTEM_PROMPT,
                user,
            )
            .await
        {
            Ok(generation) => Ok(Attempt {
                text: strip_think_blocks(&generation.text),
                reasoning: reasoning_of(&generation),
            }),
            Err(e) if e.is_abort() => Err(e),
            Err(e) => {
                warn!(attempt, error = %e, "Finalizer call failed");
                Ok(Attempt {
                    text: String::new(),
                    reasoning: None,
                })
            }
        }
    }

    pub(super) async fn finalize(
        &self,
        session: &mut ResearchSession,
        state: &GraphState,
    ) -> Result<String> {
        let knowledge = self.condense(session, state).await?;
        session.enter(ResearchPhase::Finalizing);
        let question = compact_question(&state.plan);

        let primary = self
            .attempt(session, &finalizer_prompt(&question, &knowledge), 1)
            .await?;
        if !primary.text.is_empty() {
            return Ok(primary.text);
        }

        let mut reasoning = primary.reasoning;
        let attempts = 1 + self.config.max_finalize_retries;
        for attempt in 2..=attempts {
            let notes = match reasoning.as_deref() {
                Some(trace) => {
                    debug!(attempt, "Retrying finalizer with previous reasoning");
                    truncate_at_sentence(trace, self.config.reasoning_budget_chars).to_string()
                }
                None => {
                    let budget = (self.config.knowledge_budget_chars / attempt).max(1);
                    debug!(attempt, budget, "Retrying finalizer with shrunken knowledge");
                    truncate_at_sentence(&knowledge, budget).to_string()
                }
            };
            let notes = if notes.trim().is_empty() {
                "(empty)".to_string()
            } else {
                notes
            };

            let next = self
                .attempt(session, &retry_prompt(&question, &notes), attempt)
                .await?;
            if !next.text.is_empty() {
                info!(attempt, "Finalizer answered on retry");
                return Ok(next.text);
            }
            if next.reasoning.is_some() {
                reasoning = next.reasoning;
            }
        }

        let fallback = knowledge.trim();
        if fallback.is_empty() {
            return Err(ProviderError::EmptyOutput { attempts }.into());
        }
        warn!(attempts, "Finalizer stayed empty, returning condensed knowledge");
        Ok(fallback.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_format_instructions() {
        let q = "What is the population of Oslo? Respond in JSON with keys city and population.";
        let (head, format) = split_format_instructions(q);
        assert_eq!(head, "What is the population of Oslo?");
        assert_eq!(format, Some("Respond in JSON with keys city and population."));
    }

    #[test]
    fn test_split_on_newline_segment() {
        let q = "List the moons of Mars\nOutput format: a comma separated list";
        let (head, format) = split_format_instructions(q);
        assert_eq!(head, "List the moons of Mars");
        assert_eq!(format, Some("Output format: a comma separated list"));
    }

    #[test]
    fn test_split_without_markers() {
        let (head, format) = split_format_instructions("  Why is the sky blue?  ");
        assert_eq!(head, "Why is the sky blue?");
        assert_eq!(format, None);
    }

    #[test]
    fn test_marker_in_first_sentence_keeps_question() {
        let q = "Respond with the year the Berlin wall fell";
        assert_eq!(split_format_instructions(q), (q, None));
    }

    #[test]
    fn test_marker_in_first_sentence_does_not_hide_later_format() {
        let q = "Respond with the name of the capital of France. Output format: JSON with key city.";
        let (head, format) = split_format_instructions(q);
        assert_eq!(head, "Respond with the name of the capital of France.");
        assert_eq!(format, Some("Output format: JSON with key city."));

        let plan = RationalPlan {
            original_question: q.into(),
            research_goal: "Identify the capital of France".into(),
            ..Default::default()
        };
        assert_eq!(
            compact_question(&plan),
            "Identify the capital of France\n\nOutput format: JSON with key city."
        );
    }

    #[test]
    fn test_marker_must_start_a_word() {
        let q = "Which units exist? How do they correspond in SI?";
        assert_eq!(split_format_instructions(q), (q, None));
    }

    #[test]
    fn test_derive_goal_truncates() {
        let q = "Who designed the Eiffel Tower? Return only the name.";
        assert_eq!(derive_goal(q, 300), "Who designed the Eiffel Tower?");
        assert_eq!(derive_goal(q, 3), "Who");
    }

    #[test]
    fn test_compact_question_appends_format() {
        let plan = RationalPlan {
            original_question: "Who designed the Eiffel Tower? Return only the name.".into(),
            research_goal: "Identify the designer of the Eiffel Tower".into(),
            ..Default::default()
        };
        assert_eq!(
            compact_question(&plan),
            "Identify the designer of the Eiffel Tower\n\nReturn only the name."
        );
    }

    #[test]
    fn test_bullet_list_includes_sources() {
        let a = AtomicFact::new("fact a", "https://a");
        let b = AtomicFact::new("fact b", "");
        assert_eq!(bullet_list(&[&a, &b]), "- fact a (https://a)\n- fact b");
    }

    #[test]
    fn test_finalizer_prompt_empty_knowledge() {
        assert!(finalizer_prompt("q", "  ").contains("Notebook Facts:\n(empty)\n"));
    }
}
