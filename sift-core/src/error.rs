//! Error types for the Sift research core.
//!
//! Uses `thiserror` for public API error types. Caller aborts (cancellation,
//! deadline) are kept apart from provider and parse failures so strategies can
//! tell a failure they may tolerate from one that must end the call.

use std::time::Duration;

/// Top-level error type for the Sift core library.
#[derive(Debug, thiserror::Error)]
pub enum SiftError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Research call was cancelled")]
    Cancelled,

    #[error("Research call exceeded its deadline of {}s", .0.as_secs_f64())]
    DeadlineExceeded(Duration),
}

impl SiftError {
    /// Shorthand for an input validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        SiftError::Validation {
            message: message.into(),
        }
    }

    /// True when the caller asked the call to stop. Such errors always end the
    /// call, whatever failure policy a strategy follows for everything else.
    pub fn is_abort(&self) -> bool {
        matches!(self, SiftError::Cancelled | SiftError::DeadlineExceeded(_))
    }
}

/// Errors from the configuration system and engine wiring.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{role} model is not configured")]
    MissingModel { role: &'static str },

    #[error("{capability} provider is not configured")]
    MissingProvider { capability: &'static str },

    #[error("Unknown strategy: {name} (available: {})", .available.join(", "))]
    UnknownStrategy { name: String, available: Vec<String> },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration load error: {0}")]
    Load(#[from] Box<figment::Error>),
}

/// Errors from reading structured data out of model output.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("planner requested search but no query was found")]
    MissingQuery,

    #[error("unable to parse planner output: {excerpt:?}")]
    UnrecognizedDecision { excerpt: String },

    #[error("{context} JSON parse: {message} (raw: {excerpt:?})")]
    Json {
        context: &'static str,
        message: String,
        excerpt: String,
    },

    #[error("template render failed for {template}: {message}")]
    Template { template: String, message: String },
}

/// Errors reported by (or on behalf of) the external capabilities.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("search failed: {message}")]
    Search { message: String },

    #[error("fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("generation failed: {message}")]
    Generate { message: String },

    #[error("{operation} timed out after {}s", .timeout.as_secs_f64())]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[error("finalizer produced no output after {attempts} attempts")]
    EmptyOutput { attempts: usize },
}

/// Warning-class signal: the iteration or step budget ran out before the
/// planner (or the sufficiency check) was confident. The result that carries
/// it still holds a usable best-effort answer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{budget} budget of {limit} exhausted; returning best-effort answer")]
pub struct BudgetExhausted {
    /// Which budget ran out ("iteration" or "step").
    pub budget: &'static str,
    /// The configured limit.
    pub limit: usize,
}

/// A type alias for results using the top-level `SiftError`.
pub type Result<T> = std::result::Result<T, SiftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_config() {
        let err = SiftError::Config(ConfigError::MissingModel { role: "planner" });
        assert_eq!(
            err.to_string(),
            "Configuration error: planner model is not configured"
        );
    }

    #[test]
    fn test_unknown_strategy_lists_available() {
        let err = ConfigError::UnknownStrategy {
            name: "tree".into(),
            available: vec!["graph-reader".into(), "scratchpad".into()],
        };
        assert_eq!(
            err.to_string(),
            "Unknown strategy: tree (available: graph-reader, scratchpad)"
        );
    }

    #[test]
    fn test_is_abort() {
        assert!(SiftError::Cancelled.is_abort());
        assert!(SiftError::DeadlineExceeded(Duration::from_secs(3)).is_abort());
        assert!(!SiftError::validation("question is empty").is_abort());
        let timeout = SiftError::Provider(ProviderError::Timeout {
            operation: "search".into(),
            timeout: Duration::from_secs(2),
        });
        assert!(!timeout.is_abort());
    }

    #[test]
    fn test_budget_exhausted_display() {
        let warning = BudgetExhausted {
            budget: "iteration",
            limit: 5,
        };
        assert_eq!(
            warning.to_string(),
            "iteration budget of 5 exhausted; returning best-effort answer"
        );
    }

    #[test]
    fn test_parse_error_from() {
        let err: SiftError = ParseError::MissingQuery.into();
        assert!(matches!(err, SiftError::Parse(ParseError::MissingQuery)));
    }
}
