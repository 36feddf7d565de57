//! The research engine: configuration, providers and a single entry point.
//!
//! An engine is immutable once built and can serve concurrent calls. Each call
//! gets its own [`ResearchSession`], so prior knowledge, cost totals and
//! cancellation never leak between calls.

use super::session::ResearchSession;
use super::strategy::{EngineParts, Role, Strategy, StrategyRegistry};
use crate::config::SiftConfig;
use crate::error::{ConfigError, Result, SiftError};
use crate::providers::{FetchProvider, LlmProvider, SearchProvider};
use crate::types::ResearchResult;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct AnswerOptions {
    /// `knowledge` from a previous call, to continue from.
    pub prior_knowledge: Option<String>,
    /// Strategy for this call instead of the engine default.
    pub strategy: Option<String>,
    pub cancellation: Option<CancellationToken>,
    /// Budget for the whole call.
    pub deadline: Option<Duration>,
}

impl AnswerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prior_knowledge(mut self, knowledge: impl Into<String>) -> Self {
        self.prior_knowledge = Some(knowledge.into());
        self
    }

    pub fn with_strategy(mut self, name: impl Into<String>) -> Self {
        self.strategy = Some(name.into());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Turns questions into grounded answers using a configured strategy.
#[derive(Clone)]
pub struct ResearchEngine {
    parts: EngineParts,
    registry: StrategyRegistry,
}

impl ResearchEngine {
    pub fn builder() -> ResearchEngineBuilder {
        ResearchEngineBuilder::default()
    }

    pub fn config(&self) -> &SiftConfig {
        &self.parts.config
    }

    /// Names of the strategies this engine can run.
    pub fn strategies(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Answer with the default strategy and no prior knowledge.
    pub async fn answer(&self, question: &str) -> Result<ResearchResult> {
        self.answer_with(question, AnswerOptions::default()).await
    }

    pub async fn answer_with(
        &self,
        question: &str,
        options: AnswerOptions,
    ) -> Result<ResearchResult> {
        let question = question.trim();
        if question.is_empty() {
            return Err(SiftError::validation("question is empty"));
        }

        let config = &self.parts.config;
        let name = options.strategy.as_deref().unwrap_or(&config.strategy);
        let strategy: Box<dyn Strategy> = self.registry.build(name, &self.parts)?;

        let mut session = ResearchSession::new(question)
            .with_prior_knowledge(options.prior_knowledge)
            .with_search_cost(config.search_cost)
            .with_verbose(config.verbose)
            .with_cancellation(options.cancellation.unwrap_or_default())
            .with_deadline(options.deadline)
            .with_request_timeout(config.request_timeout());

        info!(
            session = %session.id,
            strategy = strategy.name(),
            has_prior_knowledge = session.prior_knowledge().is_some(),
            "Research started"
        );
        let started = Instant::now();
        let result = strategy.answer(&mut session).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(result) => info!(
                session = %session.id,
                cost = result.cost,
                exhausted = result.is_exhausted(),
                elapsed_ms,
                "Research finished"
            ),
            Err(e) => warn!(
                session = %session.id,
                phase = session.phase.as_str(),
                cost = session.cost(),
                elapsed_ms,
                error = %e,
                "Research failed"
            ),
        }
        result
    }
}

/// Builder for [`ResearchEngine`].
#[derive(Default)]
pub struct ResearchEngineBuilder {
    config: Option<SiftConfig>,
    models: super::strategy::RoleModels,
    search: Option<Arc<dyn SearchProvider>>,
    fetch: Option<Arc<dyn FetchProvider>>,
    registry: Option<StrategyRegistry>,
    overrides: Vec<Box<dyn FnOnce(&mut SiftConfig) + Send>>,
}

impl ResearchEngineBuilder {
    /// Start from a loaded configuration instead of the defaults.
    pub fn config(mut self, config: SiftConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn model(mut self, role: Role, model: Arc<dyn LlmProvider>) -> Self {
        self.models.set(role, model);
        self
    }

    pub fn planner(self, model: Arc<dyn LlmProvider>) -> Self {
        self.model(Role::Planner, model)
    }

    pub fn synthesizer(self, model: Arc<dyn LlmProvider>) -> Self {
        self.model(Role::Synthesizer, model)
    }

    pub fn finalizer(self, model: Arc<dyn LlmProvider>) -> Self {
        self.model(Role::Finalizer, model)
    }

    pub fn extractor(self, model: Arc<dyn LlmProvider>) -> Self {
        self.model(Role::Extractor, model)
    }

    pub fn navigator(self, model: Arc<dyn LlmProvider>) -> Self {
        self.model(Role::Navigator, model)
    }

    pub fn validator(self, model: Arc<dyn LlmProvider>) -> Self {
        self.model(Role::Validator, model)
    }

    pub fn condenser(self, model: Arc<dyn LlmProvider>) -> Self {
        self.model(Role::Condenser, model)
    }

    pub fn search(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(provider);
        self
    }

    pub fn fetch(mut self, provider: Arc<dyn FetchProvider>) -> Self {
        self.fetch = Some(provider);
        self
    }

    pub fn strategy(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.with_override(move |c| c.strategy = name)
    }

    pub fn max_iterations(self, n: usize) -> Self {
        self.with_override(move |c| c.max_iterations = n)
    }

    pub fn max_steps(self, n: usize) -> Self {
        self.with_override(move |c| c.graph.max_steps = n)
    }

    pub fn search_cost(self, cost: f64) -> Self {
        self.with_override(move |c| c.search_cost = cost)
    }

    pub fn verbose(self, verbose: bool) -> Self {
        self.with_override(move |c| c.verbose = verbose)
    }

    /// Use a custom registry instead of the built-in strategies.
    pub fn registry(mut self, registry: StrategyRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    fn with_override(mut self, f: impl FnOnce(&mut SiftConfig) + Send + 'static) -> Self {
        self.overrides.push(Box::new(f));
        self
    }

    /// Validate the configuration and assemble the engine.
    ///
    /// Role models are checked when a strategy is built for a call, since
    /// each strategy needs a different set.
    pub fn build(self) -> Result<ResearchEngine> {
        let mut config = self.config.unwrap_or_default();
        for apply in self.overrides {
            apply(&mut config);
        }
        for warning in config.validate() {
            warn!(%warning, "Configuration adjusted");
        }
        let config = config.normalized();

        let registry = self.registry.unwrap_or_default();
        if !registry.contains(&config.strategy) {
            return Err(ConfigError::UnknownStrategy {
                name: config.strategy.clone(),
                available: registry.names(),
            }
            .into());
        }

        Ok(ResearchEngine {
            parts: EngineParts {
                config,
                models: self.models,
                search: self.search,
                fetch: self.fetch,
            },
            registry,
        })
    }
}
