//! Configuration system for Sift.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config -> environment variables -> explicit overrides.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Name of the strategy used when nothing else is configured.
pub const DEFAULT_STRATEGY: &str = "scratchpad";

/// Top-level configuration for a research engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiftConfig {
    /// Strategy used when a call does not name one.
    pub strategy: String,
    /// Loop budget of the scratchpad strategy.
    pub max_iterations: usize,
    /// Fixed accounting cost added for every successful search.
    pub search_cost: f64,
    /// Log full prompts and raw responses at debug level.
    pub verbose: bool,
    /// Upper bound for each individual provider call.
    pub request_timeout_secs: Option<u64>,
    pub graph: GraphConfig,
}

impl Default for SiftConfig {
    fn default() -> Self {
        Self {
            strategy: DEFAULT_STRATEGY.to_string(),
            max_iterations: 5,
            search_cost: 0.0,
            verbose: false,
            request_timeout_secs: None,
            graph: GraphConfig::default(),
        }
    }
}

impl SiftConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Human-readable warnings about settings that will be adjusted or look
    /// suspicious. An empty list means the configuration is used as-is.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.max_iterations == 0 {
            warnings.push("max_iterations is 0; using 1".to_string());
        }
        if self.search_cost < 0.0 {
            warnings.push(format!(
                "search_cost is negative ({}); totals will decrease per search",
                self.search_cost
            ));
        }
        if self.request_timeout_secs == Some(0) {
            warnings.push("request_timeout_secs is 0; per-request timeout disabled".to_string());
        }
        let graph = &self.graph;
        for (name, value) in [
            ("graph.max_steps", graph.max_steps),
            ("graph.condense_batch_size", graph.condense_batch_size),
            ("graph.goal_max_chars", graph.goal_max_chars),
            ("graph.reasoning_budget_chars", graph.reasoning_budget_chars),
            ("graph.knowledge_budget_chars", graph.knowledge_budget_chars),
        ] {
            if value == 0 {
                warnings.push(format!("{name} is 0; using 1"));
            }
        }
        if graph.min_facts_for_check == 0 {
            warnings.push(
                "graph.min_facts_for_check is 0; the validator still waits for a non-empty notebook"
                    .to_string(),
            );
        }
        warnings
    }

    /// Copy with every zero budget raised to 1.
    pub fn normalized(&self) -> Self {
        let mut config = self.clone();
        config.max_iterations = config.max_iterations.max(1);
        let graph = &mut config.graph;
        graph.max_steps = graph.max_steps.max(1);
        graph.condense_batch_size = graph.condense_batch_size.max(1);
        graph.goal_max_chars = graph.goal_max_chars.max(1);
        graph.reasoning_budget_chars = graph.reasoning_budget_chars.max(1);
        graph.knowledge_budget_chars = graph.knowledge_budget_chars.max(1);
        graph.min_facts_for_check = graph.min_facts_for_check.max(1);
        config
    }
}

/// What the graph reader does when a per-node operation fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeFailurePolicy {
    /// Log the failure; the node contributes nothing.
    #[default]
    Skip,
    /// A failed per-node search ends the call.
    Abort,
}

/// Budgets and thresholds of the graph reader strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Nodes dequeued before the loop stops.
    pub max_steps: usize,
    /// Notebook size at which the sufficiency check starts running.
    pub min_facts_for_check: usize,
    /// Pages fetched per node from `read_more_urls`.
    pub max_read_more_per_node: usize,
    /// Fetched pages shorter than this (after trimming) are ignored.
    pub min_page_chars: usize,
    /// Length cap for a research goal derived from the question.
    pub goal_max_chars: usize,
    /// Up to this many facts are handed to the finalizer as a bullet list.
    pub direct_fact_threshold: usize,
    /// Facts per condensation call beyond the direct threshold.
    pub condense_batch_size: usize,
    /// Extra finalizer attempts after an empty primary answer.
    pub max_finalize_retries: usize,
    /// Length cap for reasoning reused as knowledge on retry.
    pub reasoning_budget_chars: usize,
    /// Length cap for the knowledge block on retry without reasoning.
    pub knowledge_budget_chars: usize,
    pub failure_policy: NodeFailurePolicy,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            min_facts_for_check: 2,
            max_read_more_per_node: 3,
            min_page_chars: 200,
            goal_max_chars: 300,
            direct_fact_threshold: 12,
            condense_batch_size: 8,
            max_finalize_retries: 2,
            reasoning_budget_chars: 1500,
            knowledge_budget_chars: 4000,
            failure_policy: NodeFailurePolicy::Skip,
        }
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `SIFT_`)
/// 3. Workspace-local config (`.sift/config.toml`)
/// 4. User config (`~/.config/sift/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&SiftConfig>,
) -> Result<SiftConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(SiftConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "sift", "sift") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".sift").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // SIFT_MAX_ITERATIONS, SIFT_GRAPH__MAX_STEPS, ...
    figment = figment.merge(Env::prefixed("SIFT_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Check whether a Sift configuration file exists at user or workspace level.
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "sift", "sift")
        && config_dir.config_dir().join("config.toml").exists()
    {
        return true;
    }
    workspace.is_some_and(|ws| ws.join(".sift").join("config.toml").exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = SiftConfig::default();
        assert_eq!(config.strategy, "scratchpad");
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.graph.max_steps, 10);
        assert_eq!(config.graph.min_page_chars, 200);
        assert_eq!(config.graph.failure_policy, NodeFailurePolicy::Skip);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_load_config_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.graph, GraphConfig::default());
    }

    #[test]
    fn test_load_config_with_overrides() {
        let overrides = SiftConfig {
            strategy: "graph-reader".into(),
            max_iterations: 9,
            ..Default::default()
        };
        let config = load_config(None, Some(&overrides)).unwrap();
        assert_eq!(config.strategy, "graph-reader");
        assert_eq!(config.max_iterations, 9);
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let sift_dir = dir.path().join(".sift");
        std::fs::create_dir_all(&sift_dir).unwrap();
        std::fs::write(
            sift_dir.join("config.toml"),
            r#"
strategy = "graph-reader"
search_cost = 0.002
request_timeout_secs = 30

[graph]
max_steps = 4
failure_policy = "abort"
"#,
        )
        .unwrap();

        assert!(config_exists(Some(dir.path())));
        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.strategy, "graph-reader");
        assert_eq!(config.graph.max_steps, 4);
        assert_eq!(config.graph.failure_policy, NodeFailurePolicy::Abort);
        // Unset keys keep their defaults.
        assert_eq!(config.graph.condense_batch_size, 8);
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_invalid_workspace_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let sift_dir = dir.path().join(".sift");
        std::fs::create_dir_all(&sift_dir).unwrap();
        std::fs::write(sift_dir.join("config.toml"), "max_iterations = \"many\"").unwrap();
        assert!(load_config(Some(dir.path()), None).is_err());
    }

    #[test]
    fn test_validate_and_normalize_zero_budgets() {
        let mut config = SiftConfig::default();
        config.max_iterations = 0;
        config.graph.condense_batch_size = 0;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("max_iterations"));

        let normalized = config.normalized();
        assert_eq!(normalized.max_iterations, 1);
        assert_eq!(normalized.graph.condense_batch_size, 1);
    }

    #[test]
    fn test_zero_timeout_disabled() {
        let config = SiftConfig {
            request_timeout_secs: Some(0),
            ..Default::default()
        };
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = SiftConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: SiftConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }
}
