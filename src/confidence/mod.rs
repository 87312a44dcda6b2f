//! Confidence estimation over candidate answers.
//!
//! Two estimators ship here: a token-probability estimator reading logprobs
//! off the candidate, and an ensemble that fans out to several estimators and
//! combines their scores. Both return a [`ConfidenceEstimate`] whose `method`
//! names what produced it.

mod ensemble;
mod token_prob;

pub use ensemble::{EnsembleEstimator, ENSEMBLE_METHOD};
pub use token_prob::{TokenProbabilityEstimator, AGGREGATION_KEY, TOKEN_PROB_METHOD};

use crate::models::{Candidate, ConfidenceEstimate, Context, Result};
use async_trait::async_trait;

/// Pluggable confidence-estimation strategy.
#[async_trait]
pub trait ConfidenceEstimator: Send + Sync {
    /// Estimate confidence for one candidate.
    async fn estimate(
        &self,
        candidate: &Candidate,
        context: &Context,
    ) -> Result<ConfidenceEstimate>;

    /// Stable label identifying this estimator in metadata and logs.
    fn name(&self) -> &str;
}
