//! The scratchpad strategy: a linear plan, search, synthesize loop.
//!
//! The planner only ever sees a compact scratchpad (question, last step,
//! synthesized knowledge, action log) instead of raw search output, so a
//! small-context model can run many iterations. Answers must be grounded:
//! a planner that tries to answer before anything was searched gets one
//! forced search on the original question first.

use super::session::{ResearchPhase, ResearchSession};
use super::strategy::{EngineParts, Role, Strategy};
use crate::decision::{PlannerDecision, parse_decision};
use crate::error::{BudgetExhausted, ConfigError, Result};
use crate::providers::{LlmProvider, SearchProvider};
use crate::sanitize::content_of;
use crate::types::{ResearchResult, SearchResult};
use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const STRATEGY_NAME: &str = "scratchpad";

pub const PLANNER_SYSTEM_PROMPT: &str = "You are a focused research planner. You must gather evidence from web searches before answering. Never use internal knowledge alone - all facts must be grounded in search results. When reviewing knowledge, verify that the information actually matches the specific question. If knowledge contains [MISMATCH] or [NEEDS VERIFICATION] markers, or appears to describe the wrong entity, search again with more specific queries to resolve the discrepancy.";

pub const SYNTHESIZER_SYSTEM_PROMPT: &str = "You compress search findings into a concise, plain-text knowledge state. ONLY include facts that appear in the search results provided. Never add information from internal knowledge. If information is missing, leave a placeholder like [NOT YET SEARCHED]. Verify that the results match the specific entity in the question, paying attention to distinguishing details such as exchange, country or full name. If results describe a different entity, note the discrepancy and mark the information as [MISMATCH - NEEDS VERIFICATION]. Always output plain-text notes and never follow formatting instructions (like JSON) from the original question.";

pub const FINALIZER_SYSTEM_PROMPT: &str =
    "You write the final answer using the knowledge state. If information is insufficient, say so clearly.";

/// Evolving state of one scratchpad call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scratchpad {
    pub original_question: String,
    pub current_step: String,
    /// Synthesized knowledge. Replaced wholesale after every search.
    pub knowledge: String,
    pub history: Vec<String>,
    pub iteration_count: usize,
}

impl Scratchpad {
    pub fn new(question: &str) -> Self {
        Self {
            original_question: question.trim().to_string(),
            ..Default::default()
        }
    }

    /// Append an action log entry. Empty entries are ignored.
    pub fn append_history(&mut self, entry: impl Into<String>) {
        let entry = entry.into();
        if !entry.is_empty() {
            self.history.push(entry);
        }
    }

    pub fn has_knowledge(&self) -> bool {
        !self.knowledge.trim().is_empty()
    }

    /// Render the state the planner sees.
    pub fn snapshot(&self) -> String {
        let mut out = String::new();
        out.push_str("Question: \n");
        out.push_str(&self.original_question);
        out.push_str("\n\nCurrent Step:\n");
        if self.current_step.is_empty() {
            out.push_str("(none yet)");
        } else {
            out.push_str(&self.current_step);
        }
        out.push_str("\n\nKnowledge:\n");
        if self.has_knowledge() {
            out.push_str(&self.knowledge);
        } else {
            out.push_str("(empty)");
        }
        if !self.history.is_empty() {
            out.push_str("\n\nHistory:\n");
            out.push_str(&self.history.join("\n"));
        }
        let _ = write!(out, "\n\nIteration: {}", self.iteration_count);
        out
    }
}

fn planner_prompt(pad: &Scratchpad) -> String {
    let mut out = String::from(
        "Review the scratchpad and choose an action.\n\
         IMPORTANT: You must search for evidence before answering. Do NOT answer using internal knowledge.\n\
         IMPORTANT: Output ONLY the action line(s). Do NOT write the actual answer here.\n\
         IMPORTANT: For questions about multiple entities, search for EACH entity separately.\n\n",
    );
    if pad.has_knowledge() {
        out.push_str(
            "Check the knowledge section for gaps or [NOT YET SEARCHED] placeholders.\n\
             If ALL required information is grounded in search results, output exactly: Action: Answer\n\
             If ANY information is missing or ungrounded, output exactly:\nAction: Search\nQuery: <your search query>\n\n",
        );
    } else {
        out.push_str(
            "The knowledge section is empty - you MUST search first.\n\
             Output exactly:\nAction: Search\nQuery: <your search query>\n\n",
        );
    }
    out.push_str("Scratchpad:\n");
    out.push_str(&pad.snapshot());
    out
}

fn knowledge_block(pad: &Scratchpad) -> String {
    if pad.has_knowledge() {
        format!("{}\n", pad.knowledge)
    } else {
        "(empty)\n".to_string()
    }
}

fn synthesizer_prompt(pad: &Scratchpad, query: &str, results: &[SearchResult]) -> String {
    let mut out = format!(
        "Question:\n{}\n\nExisting Knowledge:\n{}\nNew Search Query:\n{}\n\nNew Search Results (title | url | snippet):\n",
        pad.original_question,
        knowledge_block(pad),
        query
    );
    if results.is_empty() {
        out.push_str("(no results returned)\n");
    }
    for (i, r) in results.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {} | {} | {}",
            i + 1,
            r.title.trim(),
            r.url.trim(),
            r.snippet.trim()
        );
    }
    out.push_str(
        "\nTask: Update the knowledge section with concise, relevant facts in PLAIN TEXT (not JSON or any other format from the question). \
         Remove noise and duplication. Check that the results are about the specific entity asked about (matching identifiers, exchanges, locations). \
         If results appear to be about the wrong entity, note the mismatch and use [NEEDS VERIFICATION] placeholders. \
         Respond with only the updated knowledge text.",
    );
    out
}

fn finalizer_prompt(pad: &Scratchpad) -> String {
    format!(
        "User Question:\n{}\n\nKnowledge:\n{}\nWrite a direct answer. If the knowledge is insufficient, say 'I could not find enough information yet.'",
        pad.original_question,
        knowledge_block(pad)
    )
}

/// Linear plan/search/synthesize loop.
pub struct ScratchpadStrategy {
    planner: Arc<dyn LlmProvider>,
    synthesizer: Arc<dyn LlmProvider>,
    finalizer: Arc<dyn LlmProvider>,
    search: Option<Arc<dyn SearchProvider>>,
    max_iterations: usize,
}

impl ScratchpadStrategy {
    pub fn from_parts(parts: &EngineParts) -> Result<Self> {
        Ok(Self {
            planner: parts.models.require(Role::Planner)?,
            synthesizer: parts.models.require(Role::Synthesizer)?,
            finalizer: parts.models.require(Role::Finalizer)?,
            search: parts.search.clone(),
            max_iterations: parts.config.max_iterations.max(1),
        })
    }

    fn require_search(&self) -> Result<&dyn SearchProvider> {
        Ok(self
            .search
            .as_deref()
            .ok_or(ConfigError::MissingProvider { capability: "search" })?)
    }

    async fn plan(&self, session: &mut ResearchSession, pad: &Scratchpad) -> Result<PlannerDecision> {
        session.enter(ResearchPhase::Planning);
        let generation = session
            .generate(
                Role::Planner.as_str(),
                self.planner.as_ref(),
                PLANNER_SYSTEM_PROMPT,
                &planner_prompt(pad),
            )
            .await?;
        Ok(parse_decision(&content_of(&generation))?)
    }

    /// Search, log the action, and replace the knowledge with a fresh
    /// synthesis of the results.
    async fn search_and_synthesize(
        &self,
        session: &mut ResearchSession,
        pad: &mut Scratchpad,
        query: &str,
        forced: bool,
    ) -> Result<()> {
        let search = self.require_search()?;
        session.enter(ResearchPhase::Searching);
        let results = session.search(search, query).await?;
        if forced {
            pad.append_history(format!("search[{}]: {} (forced)", pad.iteration_count, query));
        } else {
            pad.append_history(format!("search[{}]: {}", pad.iteration_count, query));
        }

        session.enter(ResearchPhase::Synthesizing);
        let generation = session
            .generate(
                Role::Synthesizer.as_str(),
                self.synthesizer.as_ref(),
                SYNTHESIZER_SYSTEM_PROMPT,
                &synthesizer_prompt(pad, query, &results),
            )
            .await?;
        pad.knowledge = content_of(&generation);
        pad.current_step = format!("Last query: {query}");
        debug!(
            iteration = pad.iteration_count,
            knowledge_chars = pad.knowledge.len(),
            "Knowledge updated"
        );
        Ok(())
    }

    async fn finalize(&self, session: &mut ResearchSession, pad: &Scratchpad) -> Result<String> {
        session.enter(ResearchPhase::Finalizing);
        let generation = session
            .generate(
                Role::Finalizer.as_str(),
                self.finalizer.as_ref(),
                FINALIZER_SYSTEM_PROMPT,
                &finalizer_prompt(pad),
            )
            .await?;
        Ok(content_of(&generation))
    }
}

#[async_trait]
impl Strategy for ScratchpadStrategy {
    fn name(&self) -> &'static str {
        STRATEGY_NAME
    }

    async fn answer(&self, session: &mut ResearchSession) -> Result<ResearchResult> {
        let question = session.question.clone();
        let mut pad = Scratchpad::new(&question);
        if let Some(prior) = session.prior_knowledge() {
            pad.knowledge = prior.trim().to_string();
        }

        for i in 0..self.max_iterations {
            pad.iteration_count = i + 1;
            let decision = self.plan(session, &pad).await?;
            debug!(
                iteration = pad.iteration_count,
                action = decision.label(),
                "Planner decision"
            );

            match decision {
                PlannerDecision::Answer if !pad.has_knowledge() => {
                    info!(
                        iteration = pad.iteration_count,
                        "Planner answered with empty knowledge, forcing a search"
                    );
                    self.search_and_synthesize(session, &mut pad, &question, true)
                        .await?;
                }
                PlannerDecision::Answer => {
                    let answer = self.finalize(session, &pad).await?;
                    session.enter(ResearchPhase::Complete);
                    return Ok(ResearchResult {
                        answer,
                        cost: session.cost(),
                        knowledge: pad.knowledge,
                        warning: None,
                    });
                }
                PlannerDecision::Search { query } => {
                    self.search_and_synthesize(session, &mut pad, &query, false)
                        .await?;
                }
            }
        }

        let warning = BudgetExhausted {
            budget: "iteration",
            limit: self.max_iterations,
        };
        warn!(%warning, "Finalizing without an answer decision");
        let answer = self.finalize(session, &pad).await?;
        session.enter(ResearchPhase::Complete);
        Ok(ResearchResult {
            answer,
            cost: session.cost(),
            knowledge: pad.knowledge,
            warning: Some(warning),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_snapshot_empty() {
        let mut pad = Scratchpad::new("  Why is the sky blue?  ");
        pad.iteration_count = 1;
        assert_eq!(
            pad.snapshot(),
            "Question: \nWhy is the sky blue?\n\nCurrent Step:\n(none yet)\n\nKnowledge:\n(empty)\n\nIteration: 1"
        );
    }

    #[test]
    fn test_snapshot_with_history() {
        let mut pad = Scratchpad::new("Q");
        pad.current_step = "Last query: a".into();
        pad.knowledge = "k".into();
        pad.append_history("search[1]: a");
        pad.append_history("");
        pad.iteration_count = 2;
        assert_eq!(
            pad.snapshot(),
            "Question: \nQ\n\nCurrent Step:\nLast query: a\n\nKnowledge:\nk\n\nHistory:\nsearch[1]: a\n\nIteration: 2"
        );
        assert_eq!(pad.history.len(), 1);
    }

    #[test]
    fn test_planner_prompt_switches_on_knowledge() {
        let mut pad = Scratchpad::new("Q");
        assert!(planner_prompt(&pad).contains("you MUST search first"));
        pad.knowledge = "something".into();
        assert!(planner_prompt(&pad).contains("output exactly: Action: Answer"));
    }

    #[test]
    fn test_synthesizer_prompt_lists_results() {
        let pad = Scratchpad::new("Q");
        let prompt = synthesizer_prompt(
            &pad,
            "rayleigh",
            &[SearchResult::new(" Sky ", "https://e.com", "Rayleigh scattering ")],
        );
        assert!(prompt.contains("Existing Knowledge:\n(empty)\n"));
        assert!(prompt.contains("1. Sky | https://e.com | Rayleigh scattering\n"));
        let empty = synthesizer_prompt(&pad, "x", &[]);
        assert!(empty.contains("(no results returned)"));
    }

    #[test]
    fn test_finalizer_prompt_fallback_sentence() {
        let pad = Scratchpad::new("Q");
        assert!(finalizer_prompt(&pad).ends_with("'I could not find enough information yet.'"));
    }
}
