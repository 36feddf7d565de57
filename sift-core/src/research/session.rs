//! Per-call research session.
//!
//! A session is created when a call enters the engine and dropped when it
//! returns. It owns everything that differs between two concurrent calls on
//! the same engine: prior knowledge, the running cost total, the cancellation
//! token and the deadline. Every external call goes through the guarded
//! helpers here, which race it against cancellation, the whole-call deadline
//! and the per-request timeout, and book its cost.

use crate::error::{ProviderError, Result, SiftError};
use crate::providers::{FetchProvider, LlmProvider, SearchProvider};
use crate::sanitize::truncate_str;
use crate::types::{Generation, SearchResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Where a session currently is. Carried on log events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResearchPhase {
    Planning,
    Searching,
    Synthesizing,
    Extracting,
    Fetching,
    Checking,
    Navigating,
    Condensing,
    Finalizing,
    Complete,
}

impl ResearchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResearchPhase::Planning => "planning",
            ResearchPhase::Searching => "searching",
            ResearchPhase::Synthesizing => "synthesizing",
            ResearchPhase::Extracting => "extracting",
            ResearchPhase::Fetching => "fetching",
            ResearchPhase::Checking => "checking",
            ResearchPhase::Navigating => "navigating",
            ResearchPhase::Condensing => "condensing",
            ResearchPhase::Finalizing => "finalizing",
            ResearchPhase::Complete => "complete",
        }
    }
}

/// Mutable state of one research call.
#[derive(Debug)]
pub struct ResearchSession {
    pub id: Uuid,
    pub question: String,
    pub started_at: DateTime<Utc>,
    pub phase: ResearchPhase,
    prior_knowledge: Option<String>,
    cost: f64,
    search_cost: f64,
    verbose: bool,
    cancel: CancellationToken,
    /// Absolute deadline plus the budget it was derived from.
    deadline: Option<(Instant, Duration)>,
    request_timeout: Option<Duration>,
}

impl ResearchSession {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            question: question.into(),
            started_at: Utc::now(),
            phase: ResearchPhase::Planning,
            prior_knowledge: None,
            cost: 0.0,
            search_cost: 0.0,
            verbose: false,
            cancel: CancellationToken::new(),
            deadline: None,
            request_timeout: None,
        }
    }

    pub fn with_prior_knowledge(mut self, prior: Option<String>) -> Self {
        self.prior_knowledge = prior.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn with_search_cost(mut self, cost: f64) -> Self {
        self.search_cost = cost;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Bound the whole call, counting from now.
    pub fn with_deadline(mut self, budget: Option<Duration>) -> Self {
        self.deadline = budget.map(|b| (Instant::now() + b, b));
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn prior_knowledge(&self) -> Option<&str> {
        self.prior_knowledge.as_deref()
    }

    /// Running cost total.
    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn enter(&mut self, phase: ResearchPhase) {
        self.phase = phase;
        tracing::trace!(session = %self.id, phase = phase.as_str(), "Phase change");
    }

    /// Fail fast if the caller has already aborted.
    pub fn check_abort(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(SiftError::Cancelled);
        }
        if let Some((at, budget)) = self.deadline
            && Instant::now() >= at
        {
            return Err(SiftError::DeadlineExceeded(budget));
        }
        Ok(())
    }

    /// Run one provider call under cancellation, deadline and timeout.
    async fn guarded<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, ProviderError>>,
    {
        self.check_abort()?;

        let timed = async {
            match self.request_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, call).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout {
                        operation: operation.to_string(),
                        timeout,
                    }),
                },
                None => call.await,
            }
        };
        let deadline = async {
            match self.deadline {
                Some((at, budget)) => {
                    tokio::time::sleep_until(at).await;
                    budget
                }
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SiftError::Cancelled),
            budget = deadline => Err(SiftError::DeadlineExceeded(budget)),
            result = timed => result.map_err(SiftError::from),
        }
    }

    /// Call a model and book its cost.
    pub async fn generate(
        &mut self,
        role: &'static str,
        llm: &dyn LlmProvider,
        system: &str,
        user: &str,
    ) -> Result<Generation> {
        if self.verbose {
            tracing::debug!(session = %self.id, role, model = llm.model_name(), system, user, "Prompt");
        }
        let generation = self
            .guarded(role, llm.generate(system, user))
            .await?;
        self.cost += generation.cost;
        if self.verbose {
            tracing::debug!(
                session = %self.id,
                role,
                text = %generation.text,
                reasoning = generation.reasoning.as_deref().unwrap_or_default(),
                "Response"
            );
        }
        Ok(generation)
    }

    /// Run a search; the fixed per-search cost is booked on success.
    pub async fn search(
        &mut self,
        search: &dyn SearchProvider,
        query: &str,
    ) -> Result<Vec<SearchResult>> {
        let results = self.guarded("search", search.search(query)).await?;
        self.cost += self.search_cost;
        tracing::debug!(session = %self.id, query, results = results.len(), "Search complete");
        Ok(results)
    }

    pub async fn fetch(&mut self, fetch: &dyn FetchProvider, url: &str) -> Result<String> {
        let body = self.guarded("fetch", fetch.fetch(url)).await?;
        tracing::debug!(
            session = %self.id,
            url = %truncate_str(url, 120),
            chars = body.len(),
            "Fetched page"
        );
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ScriptedLlm, StaticSearch};

    #[tokio::test]
    async fn test_costs_accumulate() {
        let llm = ScriptedLlm::new().with_cost_per_call(0.25).script("s", ["a", "b"]);
        let search = StaticSearch::new(Vec::new());
        let mut session = ResearchSession::new("q").with_search_cost(0.1);

        session.generate("planner", &llm, "s", "u").await.unwrap();
        session.search(&search, "x").await.unwrap();
        session.generate("planner", &llm, "s", "u").await.unwrap();
        assert!((session.cost() - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failed_search_books_no_cost() {
        let search = StaticSearch::new(Vec::new()).failing_on("x");
        let mut session = ResearchSession::new("q").with_search_cost(0.1);
        let err = session.search(&search, "x").await.unwrap_err();
        assert!(matches!(err, SiftError::Provider(ProviderError::Search { .. })));
        assert_eq!(session.cost(), 0.0);
    }

    #[tokio::test]
    async fn test_cancelled_before_call_makes_no_call() {
        let llm = ScriptedLlm::new().script("s", ["a"]);
        let token = CancellationToken::new();
        token.cancel();
        let mut session = ResearchSession::new("q").with_cancellation(token);
        let err = session.generate("planner", &llm, "s", "u").await.unwrap_err();
        assert!(matches!(err, SiftError::Cancelled));
        assert!(llm.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_call() {
        let llm = ScriptedLlm::new()
            .with_latency(Duration::from_secs(30))
            .script("s", ["a"]);
        let token = CancellationToken::new();
        let mut session = ResearchSession::new("q").with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        });
        let err = session.generate("planner", &llm, "s", "u").await.unwrap_err();
        canceller.await.unwrap();
        assert!(err.is_abort());
        assert!(matches!(err, SiftError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded() {
        let llm = ScriptedLlm::new()
            .with_latency(Duration::from_secs(30))
            .script("s", ["a"]);
        let mut session = ResearchSession::new("q").with_deadline(Some(Duration::from_secs(5)));
        let err = session.generate("planner", &llm, "s", "u").await.unwrap_err();
        assert!(matches!(err, SiftError::DeadlineExceeded(d) if d == Duration::from_secs(5)));
        assert!(session.check_abort().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_is_provider_error() {
        let llm = ScriptedLlm::new()
            .with_latency(Duration::from_secs(30))
            .script("s", ["a"]);
        let mut session =
            ResearchSession::new("q").with_request_timeout(Some(Duration::from_secs(2)));
        let err = session.generate("extractor", &llm, "s", "u").await.unwrap_err();
        assert!(!err.is_abort());
        match err {
            SiftError::Provider(ProviderError::Timeout { operation, timeout }) => {
                assert_eq!(operation, "extractor");
                assert_eq!(timeout, Duration::from_secs(2));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_blank_prior_knowledge_dropped() {
        let session = ResearchSession::new("q").with_prior_knowledge(Some("  ".into()));
        assert_eq!(session.prior_knowledge(), None);
    }
}
