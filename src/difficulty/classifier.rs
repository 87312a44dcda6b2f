//! Model-backed difficulty classifier.
//!
//! Builds a classification prompt from a sanitized query, asks the language
//! model for a small JSON object, and falls back to regex extraction of the
//! level token when the model ignores the format. Oversized or malformed
//! responses are typed errors, never partial estimates.

use crate::client::{CompletionOptions, LanguageModel};
use crate::difficulty::DifficultyEstimator;
use crate::models::{
    ClassifierConfig, Context, DifficultyEstimate, DifficultyLevel, PhronesisError, Result,
};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

const CLASSIFICATION_PROMPT: &str = r#"Classify the difficulty of answering the following query.

Respond with only a JSON object:
{"level": "easy" | "medium" | "hard", "score": <0.0-1.0>, "confidence": <0.0-1.0>, "reasoning": "<one sentence>"}

Query:
"#;

/// Raw classifier response shape. Every field optional; validation happens
/// after parsing.
#[derive(Debug, Deserialize)]
struct RawClassification {
    level: Option<String>,
    score: Option<f64>,
    confidence: Option<f64>,
    reasoning: Option<String>,
}

/// Difficulty estimator backed by an external language model.
pub struct ClassifierEstimator {
    config: ClassifierConfig,
    model: Arc<dyn LanguageModel>,
    level_fallback: Regex,
}

impl ClassifierEstimator {
    /// Create a classifier; config is validated here.
    pub fn new(config: ClassifierConfig, model: Arc<dyn LanguageModel>) -> Result<Self> {
        config.validate()?;
        let level_fallback = Regex::new(r"(?i)\b(easy|medium|hard)\b")
            .map_err(|e| PhronesisError::Internal(format!("level fallback pattern: {e}")))?;
        Ok(Self {
            config,
            model,
            level_fallback,
        })
    }

    /// Normalize line endings and truncate to the configured cap.
    ///
    /// Queries are untrusted; carriage returns are stripped so they cannot
    /// smuggle extra prompt lines past log inspection.
    fn sanitize(&self, query: &str) -> String {
        let normalized = query.replace("\r\n", "\n").replace('\r', "\n");
        normalized
            .chars()
            .take(self.config.max_query_chars)
            .collect()
    }

    /// Parse the model response: JSON first, regex level-token fallback second.
    fn parse_response(&self, response: &str) -> Result<DifficultyEstimate> {
        if response.len() > self.config.max_response_bytes {
            return Err(PhronesisError::InvalidModelResponse(format!(
                "response size {} exceeds cap {}",
                response.len(),
                self.config.max_response_bytes
            )));
        }

        if let Some(estimate) = self.parse_json(response)? {
            return Ok(estimate);
        }

        // The model ignored the JSON format; salvage the level token.
        if let Some(captures) = self.level_fallback.captures(response) {
            let level = DifficultyLevel::parse(&captures[1])?;
            let score = match level {
                DifficultyLevel::Easy => 0.2,
                DifficultyLevel::Medium => 0.5,
                DifficultyLevel::Hard => 0.8,
            };
            warn!(level = %level, "Classifier fell back to regex level extraction");
            return DifficultyEstimate::new(level, score, 0.5)
                .map(|e| e.with_reasoning("level extracted from non-JSON response"));
        }

        Err(PhronesisError::InvalidModelResponse(
            "no JSON object or level token in response".to_string(),
        ))
    }

    /// Try to parse the first JSON object in the response.
    ///
    /// Returns Ok(None) when no parseable object is present, so the caller
    /// can try the regex fallback.
    fn parse_json(&self, response: &str) -> Result<Option<DifficultyEstimate>> {
        let Some(start) = response.find('{') else {
            return Ok(None);
        };
        let Some(end) = response.rfind('}') else {
            return Ok(None);
        };
        if end < start {
            return Ok(None);
        }

        let raw: RawClassification = match serde_json::from_str(&response[start..=end]) {
            Ok(raw) => raw,
            Err(_) => return Ok(None),
        };

        let score = raw.score.unwrap_or(0.5).clamp(0.0, 1.0);
        let confidence = raw.confidence.unwrap_or(0.5).clamp(0.0, 1.0);

        // An explicit level is validated against the whitelist and trusted;
        // otherwise the level derives from the score.
        let level = match raw.level.as_deref() {
            Some(value) => DifficultyLevel::parse(value)?,
            None => DifficultyLevel::from_score(score),
        };

        let mut estimate = DifficultyEstimate::new(level, score, confidence)?;
        if let Some(reasoning) = raw.reasoning {
            estimate = estimate.with_reasoning(reasoning);
        }
        Ok(Some(estimate))
    }
}

#[async_trait]
impl DifficultyEstimator for ClassifierEstimator {
    async fn estimate(&self, query: &str, _context: &Context) -> Result<DifficultyEstimate> {
        if query.trim().is_empty() {
            return Err(PhronesisError::InvalidInput("empty query".to_string()));
        }

        let sanitized = self.sanitize(query);
        let prompt = format!("{CLASSIFICATION_PROMPT}{sanitized}");
        let opts = CompletionOptions::classification(self.config.timeout());

        let response = tokio::time::timeout(self.config.timeout(), async {
            self.model.complete(&prompt, &opts).await
        })
        .await
        .map_err(|_| PhronesisError::Timeout(self.config.timeout()))??;

        let estimate = self.parse_response(&response)?;
        debug!(
            level = %estimate.level,
            score = estimate.score,
            "Model-based difficulty estimate"
        );
        Ok(estimate)
    }
}
