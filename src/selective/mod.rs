//! Selective generation: answer or abstain by expected value.
//!
//! With reward R for a correct answer and penalty P for a wrong one, the
//! expected value of answering at confidence c is `c*R - (1-c)*P`; abstaining
//! is worth 0. Answer only when answering beats abstaining. A plain
//! confidence-threshold rule is available as an alternative.

use crate::models::estimate::validate_unit;
use crate::models::{
    Candidate, Decision, DecisionResult, Metadata, Result, SelectiveConfig,
};
use tracing::debug;

/// Replacement content for a withheld answer.
const ABSTAIN_MESSAGE: &str =
    "I'm not confident enough in my answer to share it. Answering at this confidence level would do more harm than staying silent.";

/// Expected values of (answering, abstaining) at a confidence level.
pub fn calculate_ev(config: &SelectiveConfig, confidence: f64) -> Result<(f64, f64)> {
    validate_unit("confidence", confidence)?;
    let ev_answer = confidence * config.reward - (1.0 - confidence) * config.penalty;
    Ok((ev_answer, 0.0))
}

/// Answer-or-abstain decision maker.
pub struct SelectiveGenerator {
    config: SelectiveConfig,
}

impl SelectiveGenerator {
    /// Create a generator; config is validated here.
    pub fn new(config: SelectiveConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// High-penalty preset for safety-critical domains.
    pub fn high_stakes() -> Self {
        // The preset always validates.
        Self {
            config: SelectiveConfig::high_stakes(),
        }
    }

    /// Decide whether to present the candidate or withhold it.
    pub fn answer_or_abstain(
        &self,
        candidate: &Candidate,
        confidence: f64,
    ) -> Result<DecisionResult> {
        let (ev_answer, ev_abstain) = calculate_ev(&self.config, confidence)?;

        let (decision, reasoning) = if self.config.use_ev {
            if ev_answer > ev_abstain {
                (
                    Decision::Answer,
                    format!(
                        "answering has positive expected value ({ev_answer:.3} vs {ev_abstain:.1})"
                    ),
                )
            } else {
                (
                    Decision::Abstain,
                    format!(
                        "answering has non-positive expected value ({ev_answer:.3} vs {ev_abstain:.1})"
                    ),
                )
            }
        } else {
            // validate() guarantees the threshold is present in this mode.
            let threshold = self.config.confidence_threshold.unwrap_or(0.5);
            if confidence >= threshold {
                (
                    Decision::Answer,
                    format!("confidence {confidence:.3} meets threshold {threshold:.3}"),
                )
            } else {
                (
                    Decision::Abstain,
                    format!("confidence {confidence:.3} is below threshold {threshold:.3}"),
                )
            }
        };

        debug!(
            decision = %decision,
            confidence,
            ev_answer,
            "Selective decision"
        );

        let presented = match decision {
            Decision::Answer => candidate.clone(),
            Decision::Abstain => candidate.with_replaced_content(ABSTAIN_MESSAGE),
        };

        Ok(DecisionResult {
            decision,
            candidate: presented,
            confidence,
            ev_answer,
            ev_abstain,
            reasoning,
            metadata: Metadata::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ev_formula() {
        let config = SelectiveConfig::default();
        let (ev, abstain) = calculate_ev(&config, 0.8).unwrap();
        // 0.8*1 - 0.2*1 = 0.6
        assert!((ev - 0.6).abs() < 1e-9);
        assert_eq!(abstain, 0.0);
    }

    #[test]
    fn test_symmetric_stakes_break_even_at_half() {
        let g = SelectiveGenerator::new(SelectiveConfig::default()).unwrap();
        let c = Candidate::new("answer");

        assert_eq!(
            g.answer_or_abstain(&c, 0.51).unwrap().decision,
            Decision::Answer
        );
        // EV is exactly zero at 0.5; ties go to abstention.
        assert_eq!(
            g.answer_or_abstain(&c, 0.5).unwrap().decision,
            Decision::Abstain
        );
    }

    #[test]
    fn test_high_stakes_abstains_at_high_confidence() {
        let g = SelectiveGenerator::high_stakes();
        let c = Candidate::new("dosage advice");

        // 0.9*1 - 0.1*10 = -0.1: still not worth answering.
        let result = g.answer_or_abstain(&c, 0.9).unwrap();
        assert_eq!(result.decision, Decision::Abstain);
        assert!((result.ev_answer - (-0.1)).abs() < 1e-9);
        assert!(!result.candidate.content.contains("dosage"));

        // Break-even for R=1, P=10 is c = 10/11.
        let result = g.answer_or_abstain(&c, 0.95).unwrap();
        assert_eq!(result.decision, Decision::Answer);
    }

    #[test]
    fn test_threshold_mode() {
        let config = SelectiveConfig {
            use_ev: false,
            confidence_threshold: Some(0.6),
            ..SelectiveConfig::default()
        };
        let g = SelectiveGenerator::new(config).unwrap();
        let c = Candidate::new("answer");

        assert_eq!(
            g.answer_or_abstain(&c, 0.6).unwrap().decision,
            Decision::Answer
        );
        assert_eq!(
            g.answer_or_abstain(&c, 0.59).unwrap().decision,
            Decision::Abstain
        );
    }

    #[test]
    fn test_abstention_preserves_candidate_identity() {
        let g = SelectiveGenerator::high_stakes();
        let c = Candidate::new("original");
        let result = g.answer_or_abstain(&c, 0.1).unwrap();
        assert_eq!(result.candidate.id, c.id);
        assert_ne!(result.candidate.content, "original");
    }

    #[test]
    fn test_invalid_confidence_rejected() {
        let g = SelectiveGenerator::new(SelectiveConfig::default()).unwrap();
        let c = Candidate::new("x");
        assert!(g.answer_or_abstain(&c, -0.1).is_err());
        assert!(g.answer_or_abstain(&c, f64::NAN).is_err());
    }

    #[test]
    fn test_zero_penalty_always_answers() {
        let config = SelectiveConfig {
            penalty: 0.0,
            ..SelectiveConfig::default()
        };
        let g = SelectiveGenerator::new(config).unwrap();
        let c = Candidate::new("x");
        assert_eq!(
            g.answer_or_abstain(&c, 0.01).unwrap().decision,
            Decision::Answer
        );
    }
}
