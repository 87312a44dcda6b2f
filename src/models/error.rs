//! Error types for phronesis.
//!
//! Epistemic taxonomy:
//! - B_i falsified: Expected failures (invalid input, exhausted budget)
//! - I^B materialized: Infrastructure failures (network, timeout, crashed task)
//! - K_i violated: Internal invariant violations (bugs)

use thiserror::Error;

/// Top-level error type for phronesis.
#[derive(Debug, Error)]
pub enum PhronesisError {
    // ═══════════════════════════════════════════════════════════════════
    // B_i FALSIFIED — Belief proven wrong (expected failures)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Budget exhausted: allocation of {requested:.2} would exceed global limit {limit:.2} (used {used:.2})")]
    BudgetExhausted {
        requested: f64,
        limit: f64,
        used: f64,
    },

    #[error("Model rejected the request: {0}")]
    ModelRejected(String),

    // ═══════════════════════════════════════════════════════════════════
    // I^B MATERIALIZED — Bounded ignorance became known-bad
    // ═══════════════════════════════════════════════════════════════════

    #[error("All {attempts} generation attempts failed")]
    AllGeneratorsFailed { attempts: usize },

    #[error("Generator crashed: {0}")]
    GeneratorCrashed(String),

    #[error("All {count} confidence estimators failed")]
    AllEstimatorsFailed { count: usize },

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Model call failed: {0}")]
    ModelCall(String),

    #[error("Invalid model response: {0}")]
    InvalidModelResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // K_i VIOLATED — Invariant broken (bug, should not happen)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PhronesisError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Check if this error is retryable.
    ///
    /// Budget exhaustion, validation failures, and rejected requests (bad
    /// auth, malformed request) are terminal; infrastructure failures may
    /// clear on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Network(_) | Self::ModelCall(_)
        )
    }
}

/// Result type alias for phronesis.
pub type Result<T> = std::result::Result<T, PhronesisError>;
