//! Scripted providers for tests, demos and offline development.
//!
//! Every provider here records what it was asked so tests can assert on the
//! exact sequence of external calls a strategy made.

use super::{FetchProvider, LlmProvider, SearchProvider};
use crate::error::ProviderError;
use crate::types::{Generation, SearchResult};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Scripted {
    Text(String),
    Full(Generation),
    Fail(String),
}

/// One recorded `generate` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub system: String,
    pub user: String,
}

/// A language model that replays queued responses, keyed by system prompt.
///
/// Each system prompt (one per role) has its own FIFO queue. A call whose
/// queue is empty fails with [`ProviderError::Generate`].
pub struct ScriptedLlm {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<RecordedCall>>,
    cost_per_call: f64,
    latency: Option<Duration>,
}

impl Default for ScriptedLlm {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            cost_per_call: 0.0,
            latency: None,
        }
    }

    /// Cost reported by every plain-text scripted response.
    pub fn with_cost_per_call(mut self, cost: f64) -> Self {
        self.cost_per_call = cost;
        self
    }

    /// Sleep this long before answering each call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue plain-text responses for a system prompt.
    pub fn script<I, S>(self, system: &str, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for text in responses {
            self.enqueue(system, Scripted::Text(text.into()));
        }
        self
    }

    /// Queue a full generation (reasoning channel, explicit cost).
    pub fn push(&self, system: &str, generation: Generation) {
        self.enqueue(system, Scripted::Full(generation));
    }

    /// Queue a provider failure.
    pub fn push_error(&self, system: &str, message: impl Into<String>) {
        self.enqueue(system, Scripted::Fail(message.into()));
    }

    fn enqueue(&self, system: &str, item: Scripted) {
        lock(&self.scripts)
            .entry(system.to_string())
            .or_default()
            .push_back(item);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// User prompts sent with the given system prompt, in call order.
    pub fn prompts_for(&self, system: &str) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.system == system)
            .map(|c| c.user.clone())
            .collect()
    }

    pub fn call_count(&self, system: &str) -> usize {
        lock(&self.calls).iter().filter(|c| c.system == system).count()
    }

    /// Responses still queued for a system prompt.
    pub fn remaining(&self, system: &str) -> usize {
        lock(&self.scripts).get(system).map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn generate(&self, system: &str, user: &str) -> Result<Generation, ProviderError> {
        lock(&self.calls).push(RecordedCall {
            system: system.to_string(),
            user: user.to_string(),
        });
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let next = lock(&self.scripts)
            .get_mut(system)
            .and_then(VecDeque::pop_front);
        match next {
            Some(Scripted::Text(text)) => Ok(Generation::text(text).with_cost(self.cost_per_call)),
            Some(Scripted::Full(generation)) => Ok(generation),
            Some(Scripted::Fail(message)) => Err(ProviderError::Generate { message }),
            None => Err(ProviderError::Generate {
                message: format!(
                    "no scripted response for system prompt {:?}",
                    crate::sanitize::truncate_str(system, 40)
                ),
            }),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// A search provider returning canned results.
#[derive(Default)]
pub struct StaticSearch {
    default_results: Vec<SearchResult>,
    by_query: HashMap<String, Vec<SearchResult>>,
    failing: HashSet<String>,
    queries: Mutex<Vec<String>>,
}

impl StaticSearch {
    /// Return `results` for every query.
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self {
            default_results: results,
            ..Default::default()
        }
    }

    /// Return `results` for this exact query instead of the default list.
    pub fn with_results_for(mut self, query: &str, results: Vec<SearchResult>) -> Self {
        self.by_query.insert(query.to_string(), results);
        self
    }

    /// Fail whenever this exact query is searched.
    pub fn failing_on(mut self, query: &str) -> Self {
        self.failing.insert(query.to_string());
        self
    }

    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }
}

#[async_trait]
impl SearchProvider for StaticSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ProviderError> {
        lock(&self.queries).push(query.to_string());
        if self.failing.contains(query) {
            return Err(ProviderError::Search {
                message: format!("scripted failure for {query:?}"),
            });
        }
        Ok(self
            .by_query
            .get(query)
            .unwrap_or(&self.default_results)
            .clone())
    }
}

/// A page fetcher serving pages from memory. Unknown URLs fail.
#[derive(Default)]
pub struct StaticFetch {
    pages: HashMap<String, String>,
    urls: Mutex<Vec<String>>,
}

impl StaticFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, body: impl Into<String>) -> Self {
        self.pages.insert(url.to_string(), body.into());
        self
    }

    /// Every URL requested, in order.
    pub fn urls(&self) -> Vec<String> {
        lock(&self.urls).clone()
    }
}

#[async_trait]
impl FetchProvider for StaticFetch {
    async fn fetch(&self, url: &str) -> Result<String, ProviderError> {
        lock(&self.urls).push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| ProviderError::Fetch {
                url: url.to_string(),
                message: "not found".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_llm_queues_per_system_prompt() {
        let llm = ScriptedLlm::new()
            .with_cost_per_call(0.5)
            .script("planner", ["p1", "p2"])
            .script("writer", ["w1"]);

        assert_eq!(llm.generate("writer", "u").await.unwrap().text, "w1");
        let first = llm.generate("planner", "u1").await.unwrap();
        assert_eq!(first.text, "p1");
        assert!((first.cost - 0.5).abs() < f64::EPSILON);
        assert_eq!(llm.generate("planner", "u2").await.unwrap().text, "p2");
        assert!(llm.generate("planner", "u3").await.is_err());

        assert_eq!(llm.call_count("planner"), 3);
        assert_eq!(llm.prompts_for("planner"), vec!["u1", "u2", "u3"]);
    }

    #[tokio::test]
    async fn test_scripted_llm_full_and_error_entries() {
        let llm = ScriptedLlm::new().with_cost_per_call(1.0);
        llm.push("s", Generation::text("").with_reasoning("hidden").with_cost(0.2));
        llm.push_error("s", "backend down");

        let generation = llm.generate("s", "u").await.unwrap();
        assert_eq!(generation.reasoning.as_deref(), Some("hidden"));
        assert!((generation.cost - 0.2).abs() < f64::EPSILON);
        let err = llm.generate("s", "u").await.unwrap_err();
        assert!(err.to_string().contains("backend down"));
        assert_eq!(llm.remaining("s"), 0);
    }

    #[tokio::test]
    async fn test_static_search_routing_and_failures() {
        let search = StaticSearch::new(vec![SearchResult::new("t", "u", "s")])
            .with_results_for("special", Vec::new())
            .failing_on("broken");

        assert_eq!(search.search("any").await.unwrap().len(), 1);
        assert!(search.search("special").await.unwrap().is_empty());
        assert!(search.search("broken").await.is_err());
        assert_eq!(search.queries(), vec!["any", "special", "broken"]);
    }

    #[tokio::test]
    async fn test_static_fetch() {
        let fetch = StaticFetch::new().with_page("https://a", "body");
        assert_eq!(fetch.fetch("https://a").await.unwrap(), "body");
        assert!(fetch.fetch("https://b").await.is_err());
        assert_eq!(fetch.urls(), vec!["https://a", "https://b"]);
    }
}
