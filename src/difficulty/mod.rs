//! Difficulty estimation.
//!
//! Two implementations of one seam: a heuristic feature-weighted estimator
//! that runs entirely in-process, and a model-backed classifier that asks an
//! external language model. Both clamp their outputs to [0, 1] and constrain
//! the level to the three-value enum.

mod classifier;
mod heuristic;

pub use classifier::ClassifierEstimator;
pub use heuristic::HeuristicEstimator;

use crate::models::{Context, DifficultyEstimate, Result};
use async_trait::async_trait;

/// Pluggable difficulty estimation strategy.
#[async_trait]
pub trait DifficultyEstimator: Send + Sync {
    /// Estimate the difficulty of one query.
    ///
    /// B_i: May fail (oversized query, timeout, model failure); a failure is
    /// a typed error, never a partial estimate.
    async fn estimate(&self, query: &str, context: &Context) -> Result<DifficultyEstimate>;

    /// Estimate a batch of queries sequentially.
    ///
    /// Default implementation; estimators with a cheaper batched path can
    /// override it.
    async fn estimate_batch(
        &self,
        queries: &[String],
        context: &Context,
    ) -> Result<Vec<DifficultyEstimate>> {
        let mut estimates = Vec::with_capacity(queries.len());
        for query in queries {
            estimates.push(self.estimate(query, context).await?);
        }
        Ok(estimates)
    }
}
