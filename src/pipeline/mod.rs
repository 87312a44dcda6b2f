//! End-to-end governance pipeline.
//!
//! Wires the stages together for one query: estimate difficulty, allocate a
//! compute budget, sample candidates adaptively under that budget, estimate
//! confidence, classify uncertainty, route through the calibration gate, and
//! take the answer-or-abstain decision. The result carries every intermediate
//! artifact so a decision can be audited after the fact.
//!
//! The budgeter is threaded functionally: `run` takes the current budgeter
//! state and returns the successor alongside the answer. A failed run leaves
//! the caller's budgeter untouched.

use crate::budget::Budgeter;
use crate::confidence::{ConfidenceEstimator, TokenProbabilityEstimator, TOKEN_PROB_METHOD};
use crate::consistency::AdaptiveController;
use crate::difficulty::{DifficultyEstimator, HeuristicEstimator};
use crate::gate::CalibrationGate;
use crate::generate::{Generator, MajorityVoteAggregator};
use crate::models::{
    Candidate, ComputeBudget, ConfidenceEstimate, Context, Decision, DecisionResult,
    DifficultyEstimate, Metadata, PhronesisError, PipelineConfig, Result, RoutingResult,
    SuggestedAction, UncertaintyResult,
};
use crate::selective::SelectiveGenerator;
use crate::uncertainty::UncertaintyQuantifier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Confidence method label used when the pipeline falls back to consensus
/// agreement because candidates carry no token logprobs.
pub const CONSENSUS_METHOD: &str = "consensus";

/// Fully governed answer for one query, with complete provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernedAnswer {
    /// Unique id of this pipeline run
    pub id: String,

    /// When the run completed
    pub timestamp: DateTime<Utc>,

    /// The query as received
    pub query: String,

    /// Final candidate to present, after gating and the abstention decision
    pub answer: Candidate,

    /// Difficulty estimate that drove the budget
    pub difficulty: DifficultyEstimate,

    /// Budget allocated for the run
    pub budget: ComputeBudget,

    /// Confidence estimate for the aggregated answer
    pub confidence: ConfidenceEstimate,

    /// Query-level uncertainty classification
    pub uncertainty: UncertaintyResult,

    /// Calibration-gate routing outcome
    pub routing: RoutingResult,

    /// Answer-or-abstain decision
    pub decision: DecisionResult,

    /// Sampling provenance (candidate counts, consensus, early stopping)
    pub sampling: Metadata,

    /// Wall-clock duration of the run in milliseconds
    pub duration_ms: u64,
}

impl GovernedAnswer {
    /// True when the final answer was withheld by any stage.
    pub fn is_withheld(&self) -> bool {
        self.decision.decision == Decision::Abstain
            || matches!(
                self.routing.action,
                crate::models::RoutingAction::Abstain | crate::models::RoutingAction::Escalate
            )
    }
}

/// Orchestrates the full governance flow for single queries.
pub struct GovernancePipeline {
    difficulty: Arc<dyn DifficultyEstimator>,
    controller: AdaptiveController,
    confidence: Arc<dyn ConfidenceEstimator>,
    uncertainty: UncertaintyQuantifier,
    gate: CalibrationGate,
    selective: SelectiveGenerator,
}

impl GovernancePipeline {
    /// Build a pipeline from configuration and a candidate generator.
    ///
    /// Defaults: heuristic difficulty estimation, majority-vote aggregation,
    /// token-probability confidence with consensus fallback.
    pub fn new(config: PipelineConfig, generator: Arc<dyn Generator>) -> Result<Self> {
        config.validate()?;

        let difficulty: Arc<dyn DifficultyEstimator> =
            Arc::new(HeuristicEstimator::new(config.heuristic.clone())?);
        let controller = AdaptiveController::new(
            config.controller.clone(),
            generator,
            Arc::new(MajorityVoteAggregator::new()),
        )?;
        let confidence: Arc<dyn ConfidenceEstimator> =
            Arc::new(TokenProbabilityEstimator::new(config.token_prob.clone())?);

        Ok(Self {
            difficulty,
            controller,
            confidence,
            uncertainty: UncertaintyQuantifier::new(config.uncertainty.clone())?,
            gate: CalibrationGate::new(config.gate.clone())?,
            selective: SelectiveGenerator::new(config.selective.clone())?,
        })
    }

    /// Replace the difficulty estimator (e.g. with a model-backed classifier).
    pub fn with_difficulty_estimator(mut self, estimator: Arc<dyn DifficultyEstimator>) -> Self {
        self.difficulty = estimator;
        self
    }

    /// Replace the confidence estimator (e.g. with an ensemble).
    pub fn with_confidence_estimator(mut self, estimator: Arc<dyn ConfidenceEstimator>) -> Self {
        self.confidence = estimator;
        self
    }

    /// Run the full governance flow for one query.
    ///
    /// Returns the governed answer and the successor budgeter state. On any
    /// error the passed-in budgeter remains valid and uncharged except for
    /// the allocation made before the failing stage.
    pub async fn run(
        &self,
        query: &str,
        budgeter: Budgeter,
        context: &Context,
    ) -> Result<(GovernedAnswer, Budgeter)> {
        if query.trim().is_empty() {
            return Err(PhronesisError::InvalidInput("empty query".to_string()));
        }
        let started = Instant::now();

        // Stage 1: difficulty.
        let difficulty = self.difficulty.estimate(query, context).await?;
        debug!(level = %difficulty.level, score = difficulty.score, "Difficulty estimated");

        // Stage 2: budget. The returned budgeter is only handed back on
        // success, so a failed run charges nothing from the caller's view.
        let (budget, budgeter) = budgeter.allocate(&difficulty)?;

        // Stage 3: adaptive sampling, capped by the allocated budget.
        let outcome = self
            .controller
            .run_bounded(
                query,
                Some(&difficulty),
                Some(budget.num_candidates as usize),
                context,
            )
            .await?;
        let sampling = outcome.metadata();

        // Stage 4: confidence. The fallback applies only when the default
        // token-probability estimator would have nothing to read; estimator
        // errors always propagate.
        let no_logprobs = self.confidence.name() == TOKEN_PROB_METHOD
            && outcome.answer.token_logprobs().is_none();
        let confidence = if no_logprobs {
            debug!("Candidates carry no token logprobs; using consensus agreement");
            ConfidenceEstimate::new(outcome.consensus.clamp(0.0, 1.0), CONSENSUS_METHOD)?
                .with_reasoning(format!(
                    "agreement of {}/{} candidates",
                    (outcome.consensus * outcome.actual_n as f64).round() as usize,
                    outcome.actual_n
                ))
        } else {
            self.confidence.estimate(&outcome.answer, context).await?
        };

        // Stage 5: query-level uncertainty classification.
        let uncertainty = self.uncertainty.classify(query, context).await?;

        // Stage 6: calibration-gate routing.
        let routing = self.gate.route(&outcome.answer, confidence.score)?;

        // Stage 7: answer-or-abstain decision on the routed candidate.
        let mut decision = self
            .selective
            .answer_or_abstain(&routing.candidate, confidence.score)?;

        // An epistemic classification confident enough to suggest abstention
        // overrides a positive expected value.
        if decision.decision == Decision::Answer
            && uncertainty.suggested_action == SuggestedAction::Abstain
        {
            warn!(
                confidence = confidence.score,
                "Epistemic uncertainty overrides the answer decision"
            );
            decision = DecisionResult {
                decision: Decision::Abstain,
                candidate: routing.candidate.with_replaced_content(format!(
                    "I'm not able to answer this reliably: {}",
                    uncertainty.reasoning
                )),
                reasoning: format!(
                    "overridden by epistemic uncertainty ({})",
                    uncertainty.reasoning
                ),
                ..decision
            };
        }

        let answer = decision.candidate.clone();
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            level = %difficulty.level,
            actual_n = outcome.actual_n,
            confidence = confidence.score,
            action = %routing.action,
            decision = %decision.decision,
            duration_ms,
            "Pipeline run complete"
        );

        Ok((
            GovernedAnswer {
                id: Uuid::new_v4().to_string(),
                timestamp: Utc::now(),
                query: query.to_string(),
                answer,
                difficulty,
                budget,
                confidence,
                uncertainty,
                routing,
                decision,
                sampling,
                duration_ms,
            },
            budgeter,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DifficultyLevel, RoutingAction, UncertaintyKind};
    use async_trait::async_trait;

    /// Generator returning identical confident candidates with logprobs.
    struct ConfidentGenerator;

    #[async_trait]
    impl Generator for ConfidentGenerator {
        async fn generate(
            &self,
            _query: &str,
            n: usize,
            _context: &Context,
        ) -> Vec<Result<Candidate>> {
            (0..n)
                .map(|_| {
                    Ok(Candidate::new("<answer>4</answer>").with_logprobs(&[-0.01, -0.02]))
                })
                .collect()
        }
    }

    /// Generator without logprobs, forcing the consensus fallback.
    struct PlainGenerator;

    #[async_trait]
    impl Generator for PlainGenerator {
        async fn generate(
            &self,
            _query: &str,
            n: usize,
            _context: &Context,
        ) -> Vec<Result<Candidate>> {
            (0..n)
                .map(|_| Ok(Candidate::new("<answer>Paris</answer>")))
                .collect()
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        async fn generate(
            &self,
            _query: &str,
            n: usize,
            _context: &Context,
        ) -> Vec<Result<Candidate>> {
            (0..n)
                .map(|_| Err(PhronesisError::ModelCall("down".to_string())))
                .collect()
        }
    }

    fn pipeline(generator: Arc<dyn Generator>) -> GovernancePipeline {
        GovernancePipeline::new(PipelineConfig::default(), generator).unwrap()
    }

    #[tokio::test]
    async fn test_confident_run_answers_directly() {
        let p = pipeline(Arc::new(ConfidentGenerator));
        let (answer, budgeter) = p
            .run("What is 2+2?", Budgeter::new(), &Context::new())
            .await
            .unwrap();

        assert_eq!(answer.routing.action, RoutingAction::Direct);
        assert_eq!(answer.decision.decision, Decision::Answer);
        assert!(!answer.is_withheld());
        assert!(answer.answer.content.contains('4'));
        assert_eq!(answer.uncertainty.uncertainty_type, UncertaintyKind::None);
        // One allocation was charged.
        assert_eq!(budgeter.allocation_count(), 1);
        assert!(budgeter.used_budget() > 0.0);
    }

    #[tokio::test]
    async fn test_consensus_fallback_without_logprobs() {
        let p = pipeline(Arc::new(PlainGenerator));
        let (answer, _) = p
            .run("What is the capital of France?", Budgeter::new(), &Context::new())
            .await
            .unwrap();

        assert_eq!(answer.confidence.method, CONSENSUS_METHOD);
        // Unanimous candidates give full consensus confidence.
        assert!((answer.confidence.score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_invalid_aggregation_override_propagates() {
        // Candidates carry logprobs, so the fallback does not apply and a
        // bad per-call aggregation override must surface as an error.
        let p = pipeline(Arc::new(ConfidentGenerator));
        let mut ctx = Context::new();
        ctx.insert(
            crate::confidence::AGGREGATION_KEY.to_string(),
            "median".into(),
        );

        let err = p
            .run("What is 2+2?", Budgeter::new(), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, PhronesisError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_budget_threads_through_runs() {
        let p = pipeline(Arc::new(ConfidentGenerator));
        let budgeter = Budgeter::new();

        let (first, budgeter) = p.run("q one", budgeter, &Context::new()).await.unwrap();
        let (_, budgeter) = p.run("q two", budgeter, &Context::new()).await.unwrap();

        assert_eq!(budgeter.allocation_count(), 2);
        assert!(budgeter.used_budget() >= 2.0 * first.budget.cost - 1e-9);
    }

    #[tokio::test]
    async fn test_exhausted_budget_fails_before_sampling() {
        let p = pipeline(Arc::new(ConfidentGenerator));
        let budgeter = Budgeter::with_limit(1.0).unwrap();

        let err = p
            .run("any query", budgeter, &Context::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PhronesisError::BudgetExhausted { .. }));
    }

    #[tokio::test]
    async fn test_generator_failure_propagates() {
        let p = pipeline(Arc::new(FailingGenerator));
        let err = p
            .run("any query", Budgeter::new(), &Context::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PhronesisError::AllGeneratorsFailed { .. }));
    }

    #[tokio::test]
    async fn test_epistemic_override_withholds() {
        // Unanimous confident candidates, but the query is a future
        // prediction: the uncertainty stage overrides the answer.
        let p = pipeline(Arc::new(ConfidentGenerator));
        let (answer, _) = p
            .run(
                "Predict the forecast: who will win the next election in the future?",
                Budgeter::new(),
                &Context::new(),
            )
            .await
            .unwrap();

        assert_eq!(answer.uncertainty.uncertainty_type, UncertaintyKind::Epistemic);
        assert_eq!(answer.decision.decision, Decision::Abstain);
        assert!(answer.is_withheld());
        // The generated answer text is withheld, replaced by the override
        // explanation.
        assert!(!answer.answer.content.contains("<answer>"));
        assert!(answer
            .answer
            .content
            .starts_with("I'm not able to answer this reliably"));
    }

    #[tokio::test]
    async fn test_provenance_is_complete() {
        let p = pipeline(Arc::new(ConfidentGenerator));
        let (answer, _) = p
            .run("What is 2+2?", Budgeter::new(), &Context::new())
            .await
            .unwrap();

        assert!(!answer.id.is_empty());
        assert_eq!(answer.query, "What is 2+2?");
        assert!(answer.sampling.contains_key("actual_n"));
        assert!(answer.sampling.contains_key("consensus"));
        assert!(answer.budget.cost > 0.0);
        assert_eq!(answer.difficulty.level, DifficultyLevel::Easy);

        // The whole record serializes for audit logs.
        let json = serde_json::to_string(&answer).unwrap();
        assert!(json.contains("\"query\""));
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let p = pipeline(Arc::new(ConfidentGenerator));
        assert!(p.run("", Budgeter::new(), &Context::new()).await.is_err());
    }
}
