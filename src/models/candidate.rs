//! Candidate answer type shared by every pipeline component.
//!
//! K_i: A candidate is one generated answer instance. It is created by a
//! Generator call, immutable afterward, and consumed by aggregators and
//! confidence estimators.

use crate::models::{MapConvert, Metadata, PhronesisError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved metadata key carrying per-token log-probabilities.
///
/// When present, the value must be a JSON array of numbers (natural-log
/// probabilities, one per generated token). Token-probability confidence
/// estimation reads this key.
pub const LOGPROBS_KEY: &str = "token_logprobs";

/// One generated answer instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Unique identifier for this candidate
    pub id: String,

    /// Generated answer content
    pub content: String,

    /// Optional reasoning trace that produced the content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Optional generator-assigned quality score (0.0 - 1.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Arbitrary metadata; [`LOGPROBS_KEY`] is reserved
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl Candidate {
    /// Create a candidate with a fresh id and no optional fields.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            reasoning: None,
            score: None,
            metadata: Metadata::new(),
        }
    }

    /// Attach a reasoning trace.
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// Attach a generator score. Rejects scores outside [0, 1].
    pub fn with_score(mut self, score: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&score) || !score.is_finite() {
            return Err(PhronesisError::InvalidInput(format!(
                "candidate score must be in [0, 1], got {score}"
            )));
        }
        self.score = Some(score);
        Ok(self)
    }

    /// Attach per-token log-probabilities under the reserved metadata key.
    pub fn with_logprobs(mut self, logprobs: &[f64]) -> Self {
        let values: Vec<serde_json::Value> = logprobs
            .iter()
            .filter_map(|lp| serde_json::Number::from_f64(*lp).map(serde_json::Value::Number))
            .collect();
        self.metadata
            .insert(LOGPROBS_KEY.to_string(), serde_json::Value::Array(values));
        self
    }

    /// Read per-token log-probabilities from metadata, if present.
    pub fn token_logprobs(&self) -> Option<Vec<f64>> {
        let values = self.metadata.get(LOGPROBS_KEY)?.as_array()?;
        let parsed: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
        if parsed.is_empty() {
            None
        } else {
            Some(parsed)
        }
    }

    /// Produce a copy with replaced content, preserving provenance.
    ///
    /// Used by the calibration gate and selective generation when the
    /// original content must be withheld or annotated. The original content
    /// is not carried along; only the candidate id links back to it.
    pub fn with_replaced_content(&self, content: impl Into<String>) -> Self {
        Self {
            id: self.id.clone(),
            content: content.into(),
            reasoning: self.reasoning.clone(),
            score: self.score,
            metadata: self.metadata.clone(),
        }
    }
}

impl MapConvert for Candidate {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_validation() {
        assert!(Candidate::new("x").with_score(0.5).is_ok());
        assert!(Candidate::new("x").with_score(1.0).is_ok());
        assert!(Candidate::new("x").with_score(1.5).is_err());
        assert!(Candidate::new("x").with_score(-0.1).is_err());
        assert!(Candidate::new("x").with_score(f64::NAN).is_err());
    }

    #[test]
    fn test_logprobs_round_trip() {
        let c = Candidate::new("answer").with_logprobs(&[-0.1, -0.5, -2.0]);
        let lps = c.token_logprobs().unwrap();
        assert_eq!(lps.len(), 3);
        assert!((lps[1] + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_missing_logprobs() {
        assert!(Candidate::new("answer").token_logprobs().is_none());
        let empty = Candidate::new("answer").with_logprobs(&[]);
        assert!(empty.token_logprobs().is_none());
    }

    #[test]
    fn test_map_round_trip() {
        let c = Candidate::new("forty-two")
            .with_reasoning("deep thought")
            .with_score(0.9)
            .unwrap();
        let map = c.to_map().unwrap();
        let back = Candidate::from_map(map.clone()).unwrap();
        assert_eq!(back.id, c.id);
        assert_eq!(back.content, c.content);
        assert_eq!(back.to_map().unwrap(), map);
    }

    #[test]
    fn test_replaced_content_keeps_id() {
        let c = Candidate::new("original");
        let replaced = c.with_replaced_content("withheld");
        assert_eq!(replaced.id, c.id);
        assert_eq!(replaced.content, "withheld");
    }
}
