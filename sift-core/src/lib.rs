//! # Sift Core
//!
//! Evidence-first research orchestration for small-context language models.
//!
//! A question goes in; the engine alternates between searching and
//! compressing what it found, so the model never sees more than a compact
//! knowledge state. Two strategies are built in:
//!
//! - **scratchpad**: a linear plan, search, synthesize loop over free-text
//!   knowledge.
//! - **graph-reader**: breadth-first exploration that collects atomic facts in
//!   a notebook and finalizes through condensation and retries.
//!
//! Search, page fetching and generation are reached through the traits in
//! [`providers`]; the crate ships no network clients of its own.

pub mod config;
pub mod decision;
pub mod error;
pub mod json_extract;
pub mod logging;
pub mod notebook;
pub mod providers;
pub mod research;
pub mod sanitize;
pub mod types;

pub use config::{GraphConfig, NodeFailurePolicy, SiftConfig, load_config};
pub use decision::{PlannerDecision, parse_decision};
pub use error::{BudgetExhausted, ConfigError, ParseError, ProviderError, SiftError};
pub use json_extract::{extract_json, parse_json};
pub use notebook::{AtomicFact, Notebook};
pub use providers::{FetchProvider, LlmProvider, SearchProvider};
pub use research::{AnswerOptions, ResearchEngine, ResearchEngineBuilder, Role, Strategy};
pub use sanitize::{content_of, strip_think_blocks};
pub use types::{Generation, ResearchResult, SearchResult};
