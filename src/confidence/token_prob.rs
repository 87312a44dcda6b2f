//! Token-probability confidence estimation.
//!
//! Reads per-token logprobs off a candidate, floors each probability at the
//! configured minimum to avoid zero-collapse, and aggregates. The product
//! rule is the conservative default; mean and min are available per call.

use crate::confidence::ConfidenceEstimator;
use crate::models::{
    Candidate, ConfidenceEstimate, Context, PhronesisError, ProbAggregation, Result,
    TokenProbConfig,
};
use async_trait::async_trait;
use tracing::debug;

pub const TOKEN_PROB_METHOD: &str = "token_probability";

/// Context key that overrides the configured aggregation for one call.
pub const AGGREGATION_KEY: &str = "aggregation";

/// Confidence estimator over candidate token logprobs.
#[derive(Debug, Clone)]
pub struct TokenProbabilityEstimator {
    config: TokenProbConfig,
}

impl TokenProbabilityEstimator {
    /// Create an estimator; config is validated here.
    pub fn new(config: TokenProbConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Resolve the aggregation rule: per-call context override, else config.
    fn resolve_aggregation(&self, context: &Context) -> Result<ProbAggregation> {
        match context.get(AGGREGATION_KEY).and_then(|v| v.as_str()) {
            Some(value) => ProbAggregation::parse(value),
            None => Ok(self.config.aggregation),
        }
    }

    /// Convert logprobs to floored probabilities and aggregate.
    fn aggregate(&self, logprobs: &[f64], rule: ProbAggregation) -> Result<(f64, Vec<f64>)> {
        if logprobs.iter().any(|lp| lp.is_nan() || *lp > 0.0) {
            return Err(PhronesisError::InvalidInput(
                "token logprobs must be finite and <= 0".to_string(),
            ));
        }

        let probs: Vec<f64> = logprobs
            .iter()
            .map(|lp| lp.exp().clamp(self.config.min_token_prob, 1.0))
            .collect();

        let score = match rule {
            ProbAggregation::Product => probs.iter().product(),
            ProbAggregation::Mean => probs.iter().sum::<f64>() / probs.len() as f64,
            ProbAggregation::Min => probs.iter().fold(1.0_f64, |acc, p| acc.min(*p)),
        };

        Ok((score.clamp(0.0, 1.0), probs))
    }
}

#[async_trait]
impl ConfidenceEstimator for TokenProbabilityEstimator {
    async fn estimate(
        &self,
        candidate: &Candidate,
        context: &Context,
    ) -> Result<ConfidenceEstimate> {
        let Some(logprobs) = candidate.token_logprobs() else {
            return Err(PhronesisError::InvalidInput(
                "candidate carries no token logprobs".to_string(),
            ));
        };

        let rule = self.resolve_aggregation(context)?;
        let (score, probs) = self.aggregate(&logprobs, rule)?;

        debug!(
            tokens = probs.len(),
            rule = ?rule,
            score,
            "Token-probability confidence"
        );

        let mut estimate = ConfidenceEstimate::new(score, TOKEN_PROB_METHOD)?;
        estimate.token_level_confidence = Some(probs);
        estimate
            .metadata
            .insert("aggregation".to_string(), format!("{rule:?}").to_lowercase().into());
        Ok(estimate)
    }

    fn name(&self) -> &str {
        TOKEN_PROB_METHOD
    }
}
