//! Generator and aggregator seams.
//!
//! K_i: Generation tolerates partial failure — a batch is a list of
//! per-candidate results, and callers decide how many failures they accept.
//! Aggregation is order-independent: the vote count never depends on
//! candidate arrival order.

mod majority;

pub use majority::{extract_answer, normalize_answer, MajorityVoteAggregator};

use crate::models::{Candidate, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;

/// Pluggable candidate-generation strategy.
///
/// Implementations call out to a language model (or any other source) and
/// must honor externally imposed timeouts on those calls.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate up to `n` candidates for a query.
    ///
    /// B_i: Each candidate may independently fail; the returned list mixes
    /// ok and error entries.
    async fn generate(&self, query: &str, n: usize, context: &Context)
        -> Vec<Result<Candidate>>;
}

/// Result of aggregating a candidate set.
#[derive(Debug, Clone)]
pub struct AggregateOutcome {
    /// Best candidate according to the aggregation strategy
    pub best: Candidate,

    /// Votes per normalized answer
    pub vote_distribution: HashMap<String, usize>,

    /// Fraction of candidates agreeing with the modal answer
    pub agreement: f64,
}

/// Pluggable voting/selection strategy over candidates.
pub trait Aggregator: Send + Sync {
    /// Aggregate a non-empty candidate set into one best candidate plus a
    /// vote distribution.
    ///
    /// B_i falsified on an empty candidate list.
    fn aggregate(&self, candidates: &[Candidate]) -> Result<AggregateOutcome>;
}
