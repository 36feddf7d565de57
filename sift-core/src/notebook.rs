//! The fact notebook used by the graph reader.
//!
//! An append-only collection of atomic facts. Adds are deduplicated with a
//! case-insensitive containment policy: a candidate is dropped when its text
//! equals, contains, or is contained in an existing fact. The notebook
//! round-trips through a JSON array so a follow-up call can start from what a
//! previous call learned.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A single self-contained piece of evidence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicFact {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub source_url: String,
    /// Unix seconds at capture time.
    #[serde(default)]
    pub timestamp: i64,
}

impl AtomicFact {
    pub fn new(content: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            content: content.into(),
            source_url: source_url.into(),
            timestamp: 0,
        }
    }
}

/// True when two fact texts count as the same fact.
///
/// Both inputs must already be trimmed and lowercased.
fn is_duplicate(candidate: &str, existing: &str) -> bool {
    candidate == existing || existing.contains(candidate) || candidate.contains(existing)
}

/// Ordered, deduplicated fact store.
#[derive(Debug, Clone, Default)]
pub struct Notebook {
    facts: Vec<AtomicFact>,
    /// Lowercased content of every fact, parallel to `facts`.
    normalized: Vec<String>,
    ids: HashSet<String>,
}

impl Notebook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a notebook from a previous call's `knowledge` output.
    ///
    /// A JSON fact array is loaded fact by fact; any other non-empty text
    /// becomes a single fact.
    pub fn from_prior_knowledge(prior: &str) -> Self {
        let mut notebook = Self::new();
        let trimmed = prior.trim();
        if trimmed.is_empty() {
            return notebook;
        }
        match serde_json::from_str::<Vec<AtomicFact>>(trimmed) {
            Ok(facts) => {
                notebook.add_facts(facts);
            }
            Err(_) => {
                notebook.add_facts([AtomicFact::new(trimmed, "")]);
            }
        }
        notebook
    }

    /// Add candidates, skipping empty and duplicate content. Returns how many
    /// were accepted.
    pub fn add_facts(&mut self, candidates: impl IntoIterator<Item = AtomicFact>) -> usize {
        candidates
            .into_iter()
            .filter(|fact| self.add(fact.clone()))
            .count()
    }

    /// Add one candidate. Returns `false` when it was empty or a duplicate.
    pub fn add(&mut self, mut fact: AtomicFact) -> bool {
        let content = fact.content.trim();
        if content.is_empty() {
            return false;
        }
        let lower = content.to_lowercase();
        if self.normalized.iter().any(|e| is_duplicate(&lower, e)) {
            tracing::debug!(
                fact = %crate::sanitize::truncate_str(content, 80),
                "Skipping duplicate fact"
            );
            return false;
        }

        fact.content = content.to_string();
        fact.source_url = fact.source_url.trim().to_string();
        if fact.timestamp == 0 {
            fact.timestamp = Utc::now().timestamp();
        }
        let supplied = fact.id.trim();
        fact.id = if supplied.is_empty() || self.ids.contains(supplied) {
            self.next_id()
        } else {
            supplied.to_string()
        };

        self.ids.insert(fact.id.clone());
        self.normalized.push(lower);
        self.facts.push(fact);
        true
    }

    fn next_id(&self) -> String {
        let mut n = self.facts.len() + 1;
        loop {
            let id = format!("fact-{n}");
            if !self.ids.contains(&id) {
                return id;
            }
            n += 1;
        }
    }

    pub fn facts(&self) -> &[AtomicFact] {
        &self.facts
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Serialize to the JSON array hand-off format.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.facts).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Deduplicate free-text facts with the notebook's containment policy,
/// keeping first occurrences in order.
pub fn dedup_texts<'a>(texts: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let mut kept: Vec<&str> = Vec::new();
    let mut normalized: Vec<String> = Vec::new();
    for text in texts {
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        let lower = text.to_lowercase();
        if normalized.iter().any(|e| is_duplicate(&lower, e)) {
            continue;
        }
        normalized.push(lower);
        kept.push(text);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_add_assigns_sequential_ids() {
        let mut notebook = Notebook::new();
        let added = notebook.add_facts([
            AtomicFact::new("Paris is the capital of France", "https://a"),
            AtomicFact::new("The Seine flows through Paris", "https://b"),
        ]);
        assert_eq!(added, 2);
        let ids: Vec<_> = notebook.facts().iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["fact-1", "fact-2"]);
        assert!(notebook.facts().iter().all(|f| f.timestamp > 0));
    }

    #[test]
    fn test_containment_is_duplicate() {
        let mut notebook = Notebook::new();
        assert!(notebook.add(AtomicFact::new("The Eiffel Tower is 330 m tall", "")));
        assert!(!notebook.add(AtomicFact::new("eiffel tower is 330 m", "")));
        assert!(!notebook.add(AtomicFact::new(
            "Today the Eiffel Tower is 330 m tall, per SETE",
            ""
        )));
        assert!(!notebook.add(AtomicFact::new("THE EIFFEL TOWER IS 330 M TALL", "")));
        assert_eq!(notebook.len(), 1);
    }

    #[test]
    fn test_empty_content_skipped() {
        let mut notebook = Notebook::new();
        assert!(!notebook.add(AtomicFact::new("   ", "https://a")));
        assert!(notebook.is_empty());
    }

    #[test]
    fn test_supplied_ids_kept_and_collisions_redrawn() {
        let mut notebook = Notebook::new();
        notebook.add(AtomicFact {
            id: "fact-2".into(),
            content: "alpha".into(),
            ..Default::default()
        });
        notebook.add(AtomicFact::new("beta", ""));
        notebook.add(AtomicFact {
            id: "fact-2".into(),
            content: "gamma".into(),
            ..Default::default()
        });
        let ids: Vec<_> = notebook.facts().iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["fact-2", "fact-3", "fact-4"]);
    }

    #[test]
    fn test_json_round_trip_through_prior_knowledge() {
        let mut notebook = Notebook::new();
        notebook.add(AtomicFact::new("Water boils at 100 C at sea level", "https://w"));
        let json = notebook.to_json();

        let restored = Notebook::from_prior_knowledge(&json);
        assert_eq!(restored.facts(), notebook.facts());
    }

    #[test]
    fn test_prior_knowledge_plain_text_is_single_fact() {
        let notebook = Notebook::from_prior_knowledge("  The user lives in Oslo.  ");
        assert_eq!(notebook.len(), 1);
        assert_eq!(notebook.facts()[0].content, "The user lives in Oslo.");
        assert_eq!(notebook.facts()[0].id, "fact-1");
        assert!(Notebook::from_prior_knowledge("   ").is_empty());
    }

    #[test]
    fn test_prior_knowledge_tolerates_missing_fields() {
        let notebook = Notebook::from_prior_knowledge(r#"[{"content": "a fact"}]"#);
        assert_eq!(notebook.len(), 1);
        assert_eq!(notebook.facts()[0].id, "fact-1");
    }

    #[test]
    fn test_dedup_texts() {
        let kept = dedup_texts(["Rust is fast", "rust is fast and safe", "Go", " ", "go"]);
        assert_eq!(kept, vec!["Rust is fast", "Go"]);
    }
}
