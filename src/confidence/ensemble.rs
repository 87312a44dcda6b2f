//! Ensemble confidence estimation.
//!
//! Fans out to every member estimator concurrently, tolerates individual
//! failures, and combines surviving scores with the configured strategy.
//! Disagreement between survivors is reported alongside the combined score.

use crate::confidence::ConfidenceEstimator;
use crate::models::{
    Candidate, CombineStrategy, ConfidenceEstimate, ConfidenceLevel, Context, EnsembleConfig,
    PhronesisError, Result,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub const ENSEMBLE_METHOD: &str = "ensemble";

/// Score from one surviving member, tagged with its position and name.
#[derive(Debug, Clone)]
struct MemberScore {
    index: usize,
    name: String,
    score: f64,
}

/// Confidence estimator combining several member estimators.
pub struct EnsembleEstimator {
    config: EnsembleConfig,
    members: Vec<Arc<dyn ConfidenceEstimator>>,
}

impl EnsembleEstimator {
    /// Create an ensemble; config is validated against the member count here.
    pub fn new(
        config: EnsembleConfig,
        members: Vec<Arc<dyn ConfidenceEstimator>>,
    ) -> Result<Self> {
        config.validate(members.len())?;
        Ok(Self { config, members })
    }

    /// Combine surviving member scores per the configured strategy.
    fn combine(&self, survivors: &[MemberScore]) -> f64 {
        match self.config.strategy {
            CombineStrategy::WeightedMean => match &self.config.weights {
                Some(weights) => {
                    // Renormalize over survivors only; validation guarantees
                    // every weight is positive.
                    let total: f64 = survivors.iter().map(|s| weights[s.index]).sum();
                    survivors
                        .iter()
                        .map(|s| s.score * weights[s.index] / total)
                        .sum()
                }
                None => mean(survivors),
            },
            CombineStrategy::Mean => mean(survivors),
            CombineStrategy::Voting => {
                let mut votes: HashMap<ConfidenceLevel, usize> = HashMap::new();
                for s in survivors {
                    *votes.entry(ConfidenceLevel::from_score(s.score)).or_insert(0) += 1;
                }
                // Tie-break toward the lower band: never report more
                // confidence than the vote supports.
                votes
                    .into_iter()
                    .max_by_key(|(level, count)| {
                        (*count, std::cmp::Reverse(ordinal(*level)))
                    })
                    .map(|(level, _)| level.midpoint())
                    .unwrap_or(0.0)
            }
        }
    }

    /// Mean absolute deviation of member scores from the combined score for
    /// one candidate. Runs the full ensemble estimate.
    pub async fn disagreement(&self, candidate: &Candidate, context: &Context) -> Result<f64> {
        let estimate = self.estimate(candidate, context).await?;
        estimate
            .metadata
            .get("disagreement")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| PhronesisError::Internal("ensemble estimate without disagreement".to_string()))
    }

    /// Mean absolute deviation of survivor scores from the combined score.
    fn survivor_disagreement(survivors: &[MemberScore], combined: f64) -> f64 {
        if survivors.len() < 2 {
            return 0.0;
        }
        survivors.iter().map(|s| (s.score - combined).abs()).sum::<f64>()
            / survivors.len() as f64
    }
}

fn mean(survivors: &[MemberScore]) -> f64 {
    survivors.iter().map(|s| s.score).sum::<f64>() / survivors.len() as f64
}

fn ordinal(level: ConfidenceLevel) -> u8 {
    match level {
        ConfidenceLevel::Low => 0,
        ConfidenceLevel::Medium => 1,
        ConfidenceLevel::High => 2,
    }
}

#[async_trait]
impl ConfidenceEstimator for EnsembleEstimator {
    async fn estimate(
        &self,
        candidate: &Candidate,
        context: &Context,
    ) -> Result<ConfidenceEstimate> {
        let mut handles = Vec::with_capacity(self.members.len());
        for (index, member) in self.members.iter().enumerate() {
            let member = Arc::clone(member);
            let candidate = candidate.clone();
            let context = context.clone();
            handles.push((index, tokio::spawn(async move {
                let name = member.name().to_string();
                (name, member.estimate(&candidate, &context).await)
            })));
        }

        let mut survivors: Vec<MemberScore> = Vec::with_capacity(self.members.len());
        let mut failures = 0usize;
        for (index, handle) in handles {
            match handle.await {
                Ok((name, Ok(estimate))) => survivors.push(MemberScore {
                    index,
                    name,
                    score: estimate.score,
                }),
                Ok((name, Err(e))) => {
                    warn!(member = %name, error = %e, "Ensemble member failed");
                    failures += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Ensemble member task crashed");
                    failures += 1;
                }
            }
        }

        if survivors.is_empty() {
            return Err(PhronesisError::AllEstimatorsFailed { count: failures });
        }

        let combined = self.combine(&survivors).clamp(0.0, 1.0);
        let disagreement = Self::survivor_disagreement(&survivors, combined);
        debug!(
            survivors = survivors.len(),
            failures,
            combined,
            disagreement,
            "Ensemble confidence"
        );

        let mut estimate = ConfidenceEstimate::new(combined, ENSEMBLE_METHOD)?;
        let member_scores: serde_json::Map<String, serde_json::Value> = survivors
            .iter()
            .map(|s| (s.name.clone(), s.score.into()))
            .collect();
        estimate
            .metadata
            .insert("member_scores".to_string(), member_scores.into());
        estimate
            .metadata
            .insert("disagreement".to_string(), disagreement.into());
        estimate
            .metadata
            .insert("failed_members".to_string(), failures.into());
        Ok(estimate)
    }

    fn name(&self) -> &str {
        ENSEMBLE_METHOD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Member returning a fixed score.
    struct FixedEstimator {
        label: String,
        score: f64,
    }

    impl FixedEstimator {
        fn arc(label: &str, score: f64) -> Arc<dyn ConfidenceEstimator> {
            Arc::new(Self {
                label: label.to_string(),
                score,
            })
        }
    }

    #[async_trait]
    impl ConfidenceEstimator for FixedEstimator {
        async fn estimate(
            &self,
            _candidate: &Candidate,
            _context: &Context,
        ) -> Result<ConfidenceEstimate> {
            ConfidenceEstimate::new(self.score, self.label.clone())
        }

        fn name(&self) -> &str {
            &self.label
        }
    }

    struct BrokenEstimator;

    #[async_trait]
    impl ConfidenceEstimator for BrokenEstimator {
        async fn estimate(
            &self,
            _candidate: &Candidate,
            _context: &Context,
        ) -> Result<ConfidenceEstimate> {
            Err(PhronesisError::ModelCall("member down".to_string()))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn candidate() -> Candidate {
        Candidate::new("answer")
    }

    #[tokio::test]
    async fn test_mean_combination() {
        let ensemble = EnsembleEstimator::new(
            EnsembleConfig {
                strategy: CombineStrategy::Mean,
                weights: None,
            },
            vec![FixedEstimator::arc("a", 0.8), FixedEstimator::arc("b", 0.6)],
        )
        .unwrap();

        let e = ensemble.estimate(&candidate(), &Context::new()).await.unwrap();
        assert!((e.score - 0.7).abs() < 1e-9);
        assert_eq!(e.method, ENSEMBLE_METHOD);
    }

    #[tokio::test]
    async fn test_weighted_mean() {
        let ensemble = EnsembleEstimator::new(
            EnsembleConfig {
                strategy: CombineStrategy::WeightedMean,
                weights: Some(vec![3.0, 1.0]),
            },
            vec![FixedEstimator::arc("a", 0.8), FixedEstimator::arc("b", 0.4)],
        )
        .unwrap();

        let e = ensemble.estimate(&candidate(), &Context::new()).await.unwrap();
        assert!((e.score - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failed_member_excluded_and_weights_renormalized() {
        let ensemble = EnsembleEstimator::new(
            EnsembleConfig {
                strategy: CombineStrategy::WeightedMean,
                weights: Some(vec![1.0, 5.0, 1.0]),
            },
            vec![
                FixedEstimator::arc("a", 0.9),
                Arc::new(BrokenEstimator),
                FixedEstimator::arc("c", 0.3),
            ],
        )
        .unwrap();

        let e = ensemble.estimate(&candidate(), &Context::new()).await.unwrap();
        // Survivor weights 1.0 and 1.0 -> plain mean of 0.9 and 0.3.
        assert!((e.score - 0.6).abs() < 1e-9);
        assert_eq!(e.metadata["failed_members"], 1);
        // Disagreement over the two survivors: mean |s - 0.6| = 0.3.
        let d = e.metadata["disagreement"].as_f64().unwrap();
        assert!((d - 0.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_all_members_failing_is_typed_error() {
        let ensemble = EnsembleEstimator::new(
            EnsembleConfig::default(),
            vec![Arc::new(BrokenEstimator), Arc::new(BrokenEstimator)],
        )
        .unwrap();

        let err = ensemble
            .estimate(&candidate(), &Context::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PhronesisError::AllEstimatorsFailed { count: 2 }
        ));
    }

    #[tokio::test]
    async fn test_voting_uses_band_midpoints() {
        let ensemble = EnsembleEstimator::new(
            EnsembleConfig {
                strategy: CombineStrategy::Voting,
                weights: None,
            },
            vec![
                FixedEstimator::arc("a", 0.9),
                FixedEstimator::arc("b", 0.8),
                FixedEstimator::arc("c", 0.1),
            ],
        )
        .unwrap();

        let e = ensemble.estimate(&candidate(), &Context::new()).await.unwrap();
        // Two High votes win; High midpoint is 0.85.
        assert!((e.score - 0.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_voting_tie_breaks_low() {
        let ensemble = EnsembleEstimator::new(
            EnsembleConfig {
                strategy: CombineStrategy::Voting,
                weights: None,
            },
            vec![FixedEstimator::arc("a", 0.9), FixedEstimator::arc("b", 0.1)],
        )
        .unwrap();

        let e = ensemble.estimate(&candidate(), &Context::new()).await.unwrap();
        // One High vote, one Low vote: the lower band wins the tie.
        assert!((e.score - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_standalone_disagreement() {
        let ensemble = EnsembleEstimator::new(
            EnsembleConfig {
                strategy: CombineStrategy::Mean,
                weights: None,
            },
            vec![FixedEstimator::arc("a", 0.9), FixedEstimator::arc("b", 0.3)],
        )
        .unwrap();

        let d = ensemble
            .disagreement(&candidate(), &Context::new())
            .await
            .unwrap();
        // Combined mean 0.6; mean |s - 0.6| = 0.3.
        assert!((d - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_empty_ensemble_rejected() {
        assert!(EnsembleEstimator::new(EnsembleConfig::default(), vec![]).is_err());
    }

    #[tokio::test]
    async fn test_member_scores_in_metadata() {
        let ensemble = EnsembleEstimator::new(
            EnsembleConfig {
                strategy: CombineStrategy::Mean,
                weights: None,
            },
            vec![FixedEstimator::arc("a", 0.5)],
        )
        .unwrap();

        let e = ensemble.estimate(&candidate(), &Context::new()).await.unwrap();
        let scores = e.metadata["member_scores"].as_object().unwrap();
        assert!((scores["a"].as_f64().unwrap() - 0.5).abs() < 1e-9);
    }
}
