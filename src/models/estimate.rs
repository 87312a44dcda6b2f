//! Estimate result types: difficulty, confidence, and uncertainty.
//!
//! Epistemic foundation:
//! - K_i: Score→level band boundaries are fixed and total over [0, 1]
//! - B_i: An estimate is a belief about the query, never ground truth
//! - I^R: Which estimator produced a value is recorded in `method`/`features`

use crate::models::{MapConvert, Metadata, PhronesisError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Difficulty level of a query.
///
/// K_i: Exactly three levels; unknown strings fail deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    Easy,
    Medium,
    Hard,
}

impl DifficultyLevel {
    /// Derive a level from a score in [0, 1].
    ///
    /// Total and monotonic: `< 0.35` → Easy, `[0.35, 0.65]` → Medium,
    /// `> 0.65` → Hard. Both band boundaries belong to Medium.
    pub fn from_score(score: f64) -> Self {
        if score < 0.35 {
            Self::Easy
        } else if score <= 0.65 {
            Self::Medium
        } else {
            Self::Hard
        }
    }

    /// Parse a level name against the explicit whitelist.
    ///
    /// Replaces any dynamic string→enum coercion: unknown values are a typed
    /// error, never a silent default.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            other => Err(PhronesisError::InvalidInput(format!(
                "unknown difficulty level '{other}' (expected easy|medium|hard)"
            ))),
        }
    }
}

impl fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Easy => write!(f, "easy"),
            Self::Medium => write!(f, "medium"),
            Self::Hard => write!(f, "hard"),
        }
    }
}

/// Difficulty estimate for a query.
///
/// Produced by exactly one estimator call per query; immutable thereafter.
///
/// Note on level/score disagreement: when both are supplied explicitly they
/// are not cross-validated against the fixed thresholds. The explicit level
/// is trusted. A caller constructing `level = Hard, score = 0.1` gets exactly
/// that back; this is permissive by design and a likely caller error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifficultyEstimate {
    /// Difficulty level
    pub level: DifficultyLevel,

    /// Difficulty score (0.0 - 1.0)
    pub score: f64,

    /// Estimator's confidence in this estimate (0.0 - 1.0)
    pub confidence: f64,

    /// Estimator's reasoning, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Named feature scores that contributed to the estimate
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub features: HashMap<String, f64>,

    /// Additional metadata
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl DifficultyEstimate {
    /// Construct with an explicit level (not cross-validated against score).
    pub fn new(level: DifficultyLevel, score: f64, confidence: f64) -> Result<Self> {
        validate_unit("difficulty score", score)?;
        validate_unit("difficulty confidence", confidence)?;
        Ok(Self {
            level,
            score,
            confidence,
            reasoning: None,
            features: HashMap::new(),
            metadata: Metadata::new(),
        })
    }

    /// Construct deriving the level from the score via the fixed thresholds.
    pub fn from_score(score: f64, confidence: f64) -> Result<Self> {
        Self::new(DifficultyLevel::from_score(score), score, confidence)
    }

    /// Attach reasoning.
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// Attach feature scores.
    pub fn with_features(mut self, features: HashMap<String, f64>) -> Self {
        self.features = features;
        self
    }
}

impl MapConvert for DifficultyEstimate {}

/// Confidence level derived from a confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    /// Derive a level from a score in [0, 1].
    ///
    /// `>= 0.7` → High, `[0.4, 0.7)` → Medium, `< 0.4` → Low.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            Self::High
        } else if score >= 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Representative score for this band, used by vote-combined ensembles.
    pub fn midpoint(&self) -> f64 {
        match self {
            Self::High => 0.85,
            Self::Medium => 0.55,
            Self::Low => 0.2,
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Confidence estimate for a candidate answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceEstimate {
    /// Confidence score (0.0 - 1.0)
    pub score: f64,

    /// Calibration quality of the score, if known (0.0 - 1.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration: Option<f64>,

    /// Label of the method that produced the score
    pub method: String,

    /// Estimator's reasoning, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Per-token confidence values, if the method produces them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_level_confidence: Option<Vec<f64>>,

    /// Additional metadata
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl ConfidenceEstimate {
    /// Construct a confidence estimate. Rejects out-of-range scores.
    pub fn new(score: f64, method: impl Into<String>) -> Result<Self> {
        validate_unit("confidence score", score)?;
        Ok(Self {
            score,
            calibration: None,
            method: method.into(),
            reasoning: None,
            token_level_confidence: None,
            metadata: Metadata::new(),
        })
    }

    /// Derived confidence level for this estimate's score.
    pub fn level(&self) -> ConfidenceLevel {
        ConfidenceLevel::from_score(self.score)
    }

    /// Attach calibration quality. Rejects out-of-range values.
    pub fn with_calibration(mut self, calibration: f64) -> Result<Self> {
        validate_unit("calibration", calibration)?;
        self.calibration = Some(calibration);
        Ok(self)
    }

    /// Attach reasoning.
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

impl MapConvert for ConfidenceEstimate {}

/// Category of uncertainty detected in a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UncertaintyKind {
    /// Irreducible ambiguity inherent to the question (subjective/preference)
    Aleatoric,
    /// Missing-knowledge uncertainty (future speculation, out-of-domain)
    Epistemic,
    /// No dominant uncertainty signal
    None,
}

impl fmt::Display for UncertaintyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aleatoric => write!(f, "aleatoric"),
            Self::Epistemic => write!(f, "epistemic"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Action suggested by the uncertainty quantifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Aleatoric: present the option space instead of one answer
    ProvideOptions,
    /// Epistemic with high confidence: decline to answer
    Abstain,
    /// Epistemic with moderate confidence: point at an authoritative source
    SuggestSource,
    /// No dominant uncertainty: answer directly
    AnswerDirectly,
}

/// Result of aleatoric/epistemic query classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UncertaintyResult {
    /// Dominant uncertainty category
    pub uncertainty_type: UncertaintyKind,

    /// Confidence in the classification (0.0 - 1.0)
    pub confidence: f64,

    /// Classifier reasoning
    pub reasoning: String,

    /// Suggested downstream action
    pub suggested_action: SuggestedAction,

    /// Additional metadata (per-category scores, match counts)
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl MapConvert for UncertaintyResult {}

pub(crate) fn validate_unit(what: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(PhronesisError::InvalidInput(format!(
            "{what} must be in [0, 1], got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_thresholds() {
        assert_eq!(DifficultyLevel::from_score(0.0), DifficultyLevel::Easy);
        assert_eq!(DifficultyLevel::from_score(0.34), DifficultyLevel::Easy);
        // Boundary values belong to Medium.
        assert_eq!(DifficultyLevel::from_score(0.35), DifficultyLevel::Medium);
        assert_eq!(DifficultyLevel::from_score(0.5), DifficultyLevel::Medium);
        assert_eq!(DifficultyLevel::from_score(0.65), DifficultyLevel::Medium);
        assert_eq!(DifficultyLevel::from_score(0.66), DifficultyLevel::Hard);
        assert_eq!(DifficultyLevel::from_score(1.0), DifficultyLevel::Hard);
    }

    #[test]
    fn test_difficulty_monotonic() {
        // Walking the score range never moves to a lower level.
        let rank = |l: DifficultyLevel| match l {
            DifficultyLevel::Easy => 0,
            DifficultyLevel::Medium => 1,
            DifficultyLevel::Hard => 2,
        };
        let mut prev = 0;
        for i in 0..=100 {
            let cur = rank(DifficultyLevel::from_score(i as f64 / 100.0));
            assert!(cur >= prev);
            prev = cur;
        }
    }

    #[test]
    fn test_level_whitelist() {
        assert_eq!(
            DifficultyLevel::parse("  HARD ").unwrap(),
            DifficultyLevel::Hard
        );
        assert!(DifficultyLevel::parse("impossible").is_err());
        assert!(DifficultyLevel::parse("").is_err());
    }

    #[test]
    fn test_unknown_enum_string_rejected_on_deserialize() {
        let map = serde_json::json!({
            "level": "brutal",
            "score": 0.5,
            "confidence": 0.5
        });
        assert!(DifficultyEstimate::from_map(map).is_err());
    }

    #[test]
    fn test_explicit_level_trusted_over_score() {
        // Permissive by design: explicit level wins, no cross-validation.
        let e = DifficultyEstimate::new(DifficultyLevel::Hard, 0.1, 0.9).unwrap();
        assert_eq!(e.level, DifficultyLevel::Hard);
        assert!((e.score - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_estimate_validation() {
        assert!(DifficultyEstimate::from_score(1.1, 0.5).is_err());
        assert!(DifficultyEstimate::from_score(0.5, -0.1).is_err());
        assert!(DifficultyEstimate::from_score(f64::NAN, 0.5).is_err());
    }

    #[test]
    fn test_confidence_bands() {
        assert_eq!(ConfidenceLevel::from_score(0.7), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.95), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.69), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.4), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.39), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_score(0.0), ConfidenceLevel::Low);
    }

    #[test]
    fn test_difficulty_map_round_trip() {
        let e = DifficultyEstimate::from_score(0.8, 0.75)
            .unwrap()
            .with_reasoning("multi-step proof");
        let map = e.to_map().unwrap();
        let back = DifficultyEstimate::from_map(map.clone()).unwrap();
        assert_eq!(back.level, DifficultyLevel::Hard);
        assert_eq!(back.to_map().unwrap(), map);
    }

    #[test]
    fn test_uncertainty_map_round_trip() {
        let mut metadata = Metadata::new();
        metadata.insert("epistemic_matches".to_string(), 2.into());
        let r = UncertaintyResult {
            uncertainty_type: UncertaintyKind::Epistemic,
            confidence: 0.8,
            reasoning: "asks about future events".to_string(),
            suggested_action: SuggestedAction::SuggestSource,
            metadata,
        };
        let map = r.to_map().unwrap();
        let back = UncertaintyResult::from_map(map.clone()).unwrap();
        assert_eq!(back.uncertainty_type, UncertaintyKind::Epistemic);
        assert_eq!(back.suggested_action, SuggestedAction::SuggestSource);
        assert_eq!(back.to_map().unwrap(), map);
    }

    #[test]
    fn test_unknown_uncertainty_strings_rejected() {
        let template = UncertaintyResult {
            uncertainty_type: UncertaintyKind::None,
            confidence: 0.5,
            reasoning: String::new(),
            suggested_action: SuggestedAction::AnswerDirectly,
            metadata: Metadata::new(),
        };

        let mut map = template.to_map().unwrap();
        map["uncertainty_type"] = serde_json::Value::String("quantum".to_string());
        assert!(UncertaintyResult::from_map(map).is_err());

        let mut map = template.to_map().unwrap();
        map["suggested_action"] = serde_json::Value::String("guess".to_string());
        assert!(UncertaintyResult::from_map(map).is_err());
    }

    #[test]
    fn test_confidence_map_round_trip() {
        let e = ConfidenceEstimate::new(0.66, "token_probability").unwrap();
        let map = e.to_map().unwrap();
        let back = ConfidenceEstimate::from_map(map.clone()).unwrap();
        assert_eq!(back.method, "token_probability");
        assert_eq!(back.level(), ConfidenceLevel::Medium);
        assert_eq!(back.to_map().unwrap(), map);
    }
}
