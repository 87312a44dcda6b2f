//! Language-model client boundary.
//!
//! The pipeline never talks to a provider directly; everything goes through
//! the [`LanguageModel`] trait so tests can substitute in-process fakes and
//! callers can bring their own client. One OpenAI-compatible HTTP
//! implementation ships as the default collaborator.

mod http;

pub use http::HttpLanguageModel;

use crate::models::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Options for one completion call.
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    /// Max tokens to generate (client default when absent)
    pub max_tokens: Option<u32>,

    /// Sampling temperature (client default when absent)
    pub temperature: Option<f64>,

    /// Per-call timeout, distinct from any overall run timeout
    pub timeout: Option<Duration>,
}

impl CompletionOptions {
    /// Options for a short deterministic classification call.
    pub fn classification(timeout: Duration) -> Self {
        Self {
            max_tokens: Some(256),
            temperature: Some(0.0),
            timeout: Some(timeout),
        }
    }
}

/// Opaque completion interface to an external language model.
///
/// B_i: The call may fail or time out; both surface as typed errors.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Submit a prompt and return the completion text.
    async fn complete(&self, prompt: &str, opts: &CompletionOptions) -> Result<String>;
}
