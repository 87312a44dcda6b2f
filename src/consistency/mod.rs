//! Adaptive self-consistency controller.
//!
//! Samples candidates in batches, checks consensus after each batch, and
//! stops early once agreement clears the threshold — harder queries get more
//! samples, easy ones stop at the minimum.
//!
//! Epistemic foundation:
//! - K_i: The batch loop is bounded by `requested < max_n`; no recursion,
//!   no unbounded sampling
//! - K_i: Consensus is computed over a stable, order-independent vote count
//! - B_i: Any batch may partially or totally fail; a run only errors when
//!   every attempt failed
//! - I^B: The whole run executes under one overall timeout; in-flight
//!   generation is aborted best-effort on expiry

use crate::difficulty::DifficultyEstimator;
use crate::generate::{Aggregator, Generator};
use crate::models::{
    Candidate, Context, ControllerConfig, DifficultyEstimate, DifficultyLevel, Metadata,
    PhronesisError, Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

/// Sampling plan derived from a difficulty level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SamplingPlan {
    initial_n: usize,
    max_n: usize,
    batch_size: usize,
}

impl SamplingPlan {
    /// Per-level plan, bounded by the configured min/max.
    fn for_level(level: DifficultyLevel, config: &ControllerConfig) -> Self {
        let (initial, max, batch) = match level {
            DifficultyLevel::Easy => (3, 5, 3),
            DifficultyLevel::Medium => (5, 10, 3),
            DifficultyLevel::Hard => (10, 20, 5),
        };
        let max_n = max.clamp(config.min_candidates, config.max_candidates);
        let initial_n = initial.clamp(config.min_candidates, max_n);
        Self {
            initial_n,
            max_n,
            batch_size: batch,
        }
    }

    /// Apply an external candidate cap (e.g. from an allocated budget).
    fn capped(mut self, cap: usize) -> Self {
        self.max_n = self.max_n.min(cap.max(1));
        self.initial_n = self.initial_n.min(self.max_n);
        self
    }
}

/// Result of one adaptive sampling run, with full provenance.
#[derive(Debug, Clone)]
pub struct ConsistencyOutcome {
    /// Aggregated best candidate
    pub answer: Candidate,

    /// All candidates that contributed to the final aggregation
    pub candidates: Vec<Candidate>,

    /// Votes per normalized answer
    pub vote_distribution: HashMap<String, usize>,

    /// Candidates actually generated
    pub actual_n: usize,

    /// Whether consensus stopped the run before `max_n`
    pub early_stopped: bool,

    /// Final agreement fraction
    pub consensus: f64,

    /// Difficulty level the plan was derived from
    pub difficulty_level: DifficultyLevel,

    /// First-batch size of the plan
    pub initial_n: usize,

    /// Candidate cap of the plan
    pub max_n: usize,

    /// Generation attempts that returned errors
    pub failed_attempts: usize,
}

impl ConsistencyOutcome {
    /// Provenance metadata map for embedding in downstream results.
    pub fn metadata(&self) -> Metadata {
        let mut map = Metadata::new();
        map.insert("actual_n".to_string(), self.actual_n.into());
        map.insert("early_stopped".to_string(), self.early_stopped.into());
        map.insert("consensus".to_string(), self.consensus.into());
        map.insert(
            "difficulty_level".to_string(),
            self.difficulty_level.to_string().into(),
        );
        map.insert("initial_n".to_string(), self.initial_n.into());
        map.insert("max_n".to_string(), self.max_n.into());
        map
    }
}

/// Aborts a spawned generation task when the surrounding future is dropped
/// (overall timeout expiry). Aborting a finished task is a no-op.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Batched candidate generation with consensus-based early stopping.
pub struct AdaptiveController {
    config: ControllerConfig,
    generator: Arc<dyn Generator>,
    aggregator: Arc<dyn Aggregator>,
    estimator: Option<Arc<dyn DifficultyEstimator>>,
}

impl AdaptiveController {
    /// Create a controller; config is validated here.
    pub fn new(
        config: ControllerConfig,
        generator: Arc<dyn Generator>,
        aggregator: Arc<dyn Aggregator>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            generator,
            aggregator,
            estimator: None,
        })
    }

    /// Inject a difficulty estimator used when no estimate is supplied.
    pub fn with_estimator(mut self, estimator: Arc<dyn DifficultyEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    /// Run adaptive sampling for a query.
    pub async fn run(
        &self,
        query: &str,
        difficulty: Option<&DifficultyEstimate>,
        context: &Context,
    ) -> Result<ConsistencyOutcome> {
        self.run_bounded(query, difficulty, None, context).await
    }

    /// Run adaptive sampling with an external candidate cap, typically the
    /// `num_candidates` of an allocated budget.
    pub async fn run_bounded(
        &self,
        query: &str,
        difficulty: Option<&DifficultyEstimate>,
        candidate_cap: Option<usize>,
        context: &Context,
    ) -> Result<ConsistencyOutcome> {
        if query.trim().is_empty() {
            return Err(PhronesisError::InvalidInput("empty query".to_string()));
        }

        let level = match difficulty {
            Some(estimate) => estimate.level,
            None => match &self.estimator {
                Some(estimator) => estimator.estimate(query, context).await?.level,
                None => {
                    debug!("No difficulty estimate or estimator; defaulting to medium");
                    DifficultyLevel::Medium
                }
            },
        };

        let mut plan = SamplingPlan::for_level(level, &self.config);
        if let Some(cap) = candidate_cap {
            plan = plan.capped(cap);
        }

        let timeout = self.config.timeout();
        let outcome = tokio::time::timeout(timeout, self.sample_loop(query, level, plan, context))
            .await
            .map_err(|_| PhronesisError::Timeout(timeout))??;

        info!(
            actual_n = outcome.actual_n,
            early_stopped = outcome.early_stopped,
            consensus = outcome.consensus,
            difficulty = %outcome.difficulty_level,
            failed = outcome.failed_attempts,
            "Adaptive sampling complete"
        );
        Ok(outcome)
    }

    /// The bounded batch loop. Invariant: `requested` grows by at least one
    /// per iteration and the loop exits once `requested >= plan.max_n`.
    async fn sample_loop(
        &self,
        query: &str,
        level: DifficultyLevel,
        plan: SamplingPlan,
        context: &Context,
    ) -> Result<ConsistencyOutcome> {
        let mut candidates: Vec<Candidate> = Vec::with_capacity(plan.max_n);
        let mut failed_attempts = 0usize;
        let mut requested = 0usize;
        let mut consensus = 0.0;
        let mut early_stopped = false;

        while requested < plan.max_n {
            let want = if requested == 0 {
                plan.initial_n
            } else {
                plan.batch_size.min(plan.max_n - requested)
            };
            requested += want;

            let batch = self.generate_batch(query, want, context).await?;
            for result in batch {
                match result {
                    Ok(candidate) => candidates.push(candidate),
                    Err(e) => {
                        warn!(error = %e, "Candidate generation failed");
                        failed_attempts += 1;
                    }
                }
            }

            if candidates.len() >= self.config.min_candidates {
                let outcome = self.aggregator.aggregate(&candidates)?;
                consensus = outcome.agreement;
                debug!(
                    total = candidates.len(),
                    agreement = consensus,
                    "Consensus check"
                );
                if consensus >= self.config.early_stop_threshold {
                    early_stopped = requested < plan.max_n;
                    break;
                }
            }
        }

        if candidates.is_empty() {
            return Err(PhronesisError::AllGeneratorsFailed {
                attempts: failed_attempts,
            });
        }

        let aggregate = self.aggregator.aggregate(&candidates)?;
        Ok(ConsistencyOutcome {
            answer: aggregate.best,
            actual_n: candidates.len(),
            candidates,
            vote_distribution: aggregate.vote_distribution,
            early_stopped,
            consensus: aggregate.agreement.max(consensus),
            difficulty_level: level,
            initial_n: plan.initial_n,
            max_n: plan.max_n,
            failed_attempts,
        })
    }

    /// Generate one batch on a spawned task so a generator panic becomes a
    /// typed error and an expired overall timeout aborts the work.
    async fn generate_batch(
        &self,
        query: &str,
        n: usize,
        context: &Context,
    ) -> Result<Vec<Result<Candidate>>> {
        let generator = Arc::clone(&self.generator);
        let query = query.to_string();
        let context = context.clone();

        let handle =
            tokio::spawn(async move { generator.generate(&query, n, &context).await });
        let _guard = AbortOnDrop(handle.abort_handle());

        handle.await.map_err(|e| {
            if e.is_panic() {
                PhronesisError::GeneratorCrashed(format!("generator panicked: {e}"))
            } else {
                PhronesisError::GeneratorCrashed(format!("generation task aborted: {e}"))
            }
        })
    }
}
