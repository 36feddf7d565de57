//! The graph reader strategy.
//!
//! Breadth-first exploration of search queries ("nodes"). Every node's search
//! results are compressed into atomic facts in a [`Notebook`]; follow-up
//! queries are proposed from what was learned; a validator decides when the
//! notebook already answers the goal. Finalization condenses the notebook and
//! escalates through simplified retries when the finalizer comes back empty.

mod explorer;
mod finalize;
pub mod prompts;

pub use explorer::is_ad_or_tracker_url;
pub use finalize::{compact_question, derive_goal, split_format_instructions};

use super::session::{ResearchPhase, ResearchSession};
use super::strategy::{EngineParts, Role, Strategy};
use crate::config::GraphConfig;
use crate::error::{BudgetExhausted, Result};
use crate::notebook::Notebook;
use crate::providers::{FetchProvider, LlmProvider, SearchProvider};
use crate::types::ResearchResult;
use async_trait::async_trait;
use prompts::GraphPrompts;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{info, warn};

pub const STRATEGY_NAME: &str = "graph-reader";

/// The research plan built once per call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RationalPlan {
    pub original_question: String,
    /// The question with output-format instructions removed.
    pub research_goal: String,
    pub strategy: Vec<String>,
    pub key_elements: Vec<String>,
}

/// A search query in the exploration graph. The name is its identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub rationale: String,
    pub depth: usize,
}

impl Node {
    pub fn new(name: impl Into<String>, rationale: impl Into<String>, depth: usize) -> Self {
        Self {
            name: name.into(),
            rationale: rationale.into(),
            depth,
        }
    }
}

/// Exploration state: plan, notebook, FIFO queue and visited set.
#[derive(Debug, Clone, Default)]
pub struct GraphState {
    pub plan: RationalPlan,
    pub notebook: Notebook,
    queue: VecDeque<Node>,
    visited: HashSet<String>,
    /// URLs already fetched this call.
    fetched: HashSet<String>,
}

impl GraphState {
    pub fn new(plan: RationalPlan, notebook: Notebook) -> Self {
        Self {
            plan,
            notebook,
            ..Default::default()
        }
    }

    /// Enqueue unless the name is empty, visited, or already queued.
    pub fn enqueue(&mut self, node: Node) -> bool {
        if node.name.is_empty() || self.is_visited(&node.name) || self.is_queued(&node.name) {
            return false;
        }
        self.queue.push_back(node);
        true
    }

    pub fn dequeue(&mut self) -> Option<Node> {
        self.queue.pop_front()
    }

    /// Mark a node visited. Returns `false` if it already was.
    pub fn mark_visited(&mut self, name: &str) -> bool {
        self.visited.insert(name.to_string())
    }

    pub fn is_visited(&self, name: &str) -> bool {
        self.visited.contains(name)
    }

    pub fn is_queued(&self, name: &str) -> bool {
        self.queue.iter().any(|n| n.name == name)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn visited_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.visited.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn mark_fetched(&mut self, url: &str) -> bool {
        self.fetched.insert(url.to_string())
    }
}

/// Notebook-building breadth-first research.
pub struct GraphReaderStrategy {
    planner: Arc<dyn LlmProvider>,
    extractor: Arc<dyn LlmProvider>,
    navigator: Arc<dyn LlmProvider>,
    validator: Arc<dyn LlmProvider>,
    condenser: Arc<dyn LlmProvider>,
    finalizer: Arc<dyn LlmProvider>,
    search: Arc<dyn SearchProvider>,
    fetch: Option<Arc<dyn FetchProvider>>,
    config: GraphConfig,
    prompts: GraphPrompts,
}

impl GraphReaderStrategy {
    pub fn from_parts(parts: &EngineParts) -> Result<Self> {
        let models = &parts.models;
        let normalized = parts.config.normalized();
        Ok(Self {
            planner: models.require(Role::Planner)?,
            extractor: models.require(Role::Extractor)?,
            navigator: models.require(Role::Navigator)?,
            validator: models.require(Role::Validator)?,
            condenser: models.require(Role::Condenser)?,
            finalizer: models.require(Role::Finalizer)?,
            search: parts.require_search()?,
            fetch: parts.fetch.clone(),
            config: normalized.graph,
            prompts: GraphPrompts::new()?,
        })
    }
}

#[async_trait]
impl Strategy for GraphReaderStrategy {
    fn name(&self) -> &'static str {
        STRATEGY_NAME
    }

    async fn answer(&self, session: &mut ResearchSession) -> Result<ResearchResult> {
        let plan = self.plan(session).await?;
        let notebook = session
            .prior_knowledge()
            .map(Notebook::from_prior_knowledge)
            .unwrap_or_default();
        if !notebook.is_empty() {
            info!(facts = notebook.len(), "Seeded notebook from prior knowledge");
        }
        let mut state = GraphState::new(plan, notebook);

        for node in self.initial_nodes(session, &state.plan).await? {
            state.enqueue(node);
        }

        let outcome = self.explore(session, &mut state).await?;
        let warning = (!outcome.sufficient && outcome.budget_spent && state.queue_len() > 0)
            .then_some(BudgetExhausted {
                budget: "step",
                limit: self.config.max_steps,
            });
        if let Some(warning) = &warning {
            warn!(%warning, queued = state.queue_len(), "Finalizing with unexplored nodes");
        }
        info!(
            steps = outcome.steps,
            facts = state.notebook.len(),
            sufficient = outcome.sufficient,
            "Exploration finished"
        );

        let answer = self.finalize(session, &state).await?;
        session.enter(ResearchPhase::Complete);
        Ok(ResearchResult {
            answer,
            cost: session.cost(),
            knowledge: state.notebook.to_json(),
            warning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_rejects_visited_and_queued() {
        let mut state = GraphState::default();
        assert!(state.enqueue(Node::new("a", "initial", 0)));
        assert!(!state.enqueue(Node::new("a", "neighbor", 1)));
        assert!(!state.enqueue(Node::new("", "initial", 0)));

        let node = state.dequeue().unwrap();
        assert!(!state.is_visited(&node.name));
        assert!(state.mark_visited(&node.name));
        assert!(state.is_visited(&node.name));
        assert!(!state.mark_visited(&node.name));
        assert!(!state.enqueue(Node::new("a", "neighbor", 1)));
        assert!(state.enqueue(Node::new("b", "neighbor", 1)));
        assert_eq!(state.queue_len(), 1);
        assert_eq!(state.visited_names(), vec!["a"]);
    }
}
