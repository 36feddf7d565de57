//! Strategy abstraction and the name-keyed strategy registry.

use super::session::ResearchSession;
use crate::config::SiftConfig;
use crate::error::{ConfigError, Result};
use crate::providers::{FetchProvider, LlmProvider, SearchProvider};
use crate::types::ResearchResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A research loop turning a question into a grounded answer.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run the loop for the session's question. The question is already
    /// trimmed and non-empty.
    async fn answer(&self, session: &mut ResearchSession) -> Result<ResearchResult>;
}

/// Model roles a strategy may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Planner,
    Synthesizer,
    Finalizer,
    Extractor,
    Navigator,
    Validator,
    Condenser,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Planner => "planner",
            Role::Synthesizer => "synthesizer",
            Role::Finalizer => "finalizer",
            Role::Extractor => "extractor",
            Role::Navigator => "navigator",
            Role::Validator => "validator",
            Role::Condenser => "condenser",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-role model assignment with fallbacks.
///
/// | Role        | Falls back to |
/// |-------------|---------------|
/// | finalizer   | synthesizer   |
/// | extractor   | synthesizer   |
/// | navigator   | extractor     |
/// | validator   | planner       |
/// | condenser   | extractor     |
#[derive(Clone, Default)]
pub struct RoleModels {
    planner: Option<Arc<dyn LlmProvider>>,
    synthesizer: Option<Arc<dyn LlmProvider>>,
    finalizer: Option<Arc<dyn LlmProvider>>,
    extractor: Option<Arc<dyn LlmProvider>>,
    navigator: Option<Arc<dyn LlmProvider>>,
    validator: Option<Arc<dyn LlmProvider>>,
    condenser: Option<Arc<dyn LlmProvider>>,
}

impl RoleModels {
    pub fn set(&mut self, role: Role, model: Arc<dyn LlmProvider>) {
        let slot = match role {
            Role::Planner => &mut self.planner,
            Role::Synthesizer => &mut self.synthesizer,
            Role::Finalizer => &mut self.finalizer,
            Role::Extractor => &mut self.extractor,
            Role::Navigator => &mut self.navigator,
            Role::Validator => &mut self.validator,
            Role::Condenser => &mut self.condenser,
        };
        *slot = Some(model);
    }

    /// The model serving `role` after fallbacks, if any.
    pub fn resolve(&self, role: Role) -> Option<Arc<dyn LlmProvider>> {
        match role {
            Role::Planner => self.planner.clone(),
            Role::Synthesizer => self.synthesizer.clone(),
            Role::Finalizer => self.finalizer.clone().or_else(|| self.resolve(Role::Synthesizer)),
            Role::Extractor => self.extractor.clone().or_else(|| self.resolve(Role::Synthesizer)),
            Role::Navigator => self.navigator.clone().or_else(|| self.resolve(Role::Extractor)),
            Role::Validator => self.validator.clone().or_else(|| self.resolve(Role::Planner)),
            Role::Condenser => self.condenser.clone().or_else(|| self.resolve(Role::Extractor)),
        }
    }

    pub fn require(&self, role: Role) -> std::result::Result<Arc<dyn LlmProvider>, ConfigError> {
        self.resolve(role).ok_or(ConfigError::MissingModel {
            role: role.as_str(),
        })
    }
}

/// Everything a strategy constructor may draw on.
#[derive(Clone, Default)]
pub struct EngineParts {
    pub config: SiftConfig,
    pub models: RoleModels,
    pub search: Option<Arc<dyn SearchProvider>>,
    pub fetch: Option<Arc<dyn FetchProvider>>,
}

impl EngineParts {
    pub fn require_search(&self) -> std::result::Result<Arc<dyn SearchProvider>, ConfigError> {
        self.search
            .clone()
            .ok_or(ConfigError::MissingProvider { capability: "search" })
    }
}

/// Builds a strategy from the engine's parts, validating what it needs.
pub type StrategyFactory = Arc<dyn Fn(&EngineParts) -> Result<Box<dyn Strategy>> + Send + Sync>;

/// Name-keyed strategy constructors.
#[derive(Clone)]
pub struct StrategyRegistry {
    factories: BTreeMap<String, StrategyFactory>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl StrategyRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// A registry holding `scratchpad` and `graph-reader`.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(super::scratchpad::STRATEGY_NAME, |parts| {
            Ok(Box::new(super::scratchpad::ScratchpadStrategy::from_parts(parts)?))
        });
        registry.register(super::graph::STRATEGY_NAME, |parts| {
            Ok(Box::new(super::graph::GraphReaderStrategy::from_parts(parts)?))
        });
        registry
    }

    /// Register (or replace) a strategy constructor.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&EngineParts) -> Result<Box<dyn Strategy>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn build(&self, name: &str, parts: &EngineParts) -> Result<Box<dyn Strategy>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ConfigError::UnknownStrategy {
                name: name.to_string(),
                available: self.names(),
            })?;
        factory(parts)
    }
}
