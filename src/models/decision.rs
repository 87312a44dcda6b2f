//! Routing and abstention decision result types.
//!
//! K_i: A routed candidate always carries its original score and the level
//! that selected the action, so downstream consumers can audit the decision.

use crate::models::{ConfidenceLevel, Candidate, MapConvert, Metadata};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Action selected by the calibration gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingAction {
    /// Present the answer as-is
    Direct,
    /// Present with a verification-request annotation
    WithVerification,
    /// Present with a citation-request annotation
    WithCitations,
    /// Withhold the answer, explain the uncertainty
    Abstain,
    /// Withhold the answer, request human review
    Escalate,
}

impl fmt::Display for RoutingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::WithVerification => write!(f, "with_verification"),
            Self::WithCitations => write!(f, "with_citations"),
            Self::Abstain => write!(f, "abstain"),
            Self::Escalate => write!(f, "escalate"),
        }
    }
}

/// Result of one calibration-gate routing call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingResult {
    /// Selected action
    pub action: RoutingAction,

    /// Candidate to present (content rewritten for non-direct actions)
    pub candidate: Candidate,

    /// Confidence score the routing was based on
    pub original_score: f64,

    /// Confidence level derived from the score
    pub confidence_level: ConfidenceLevel,

    /// Why this action was selected
    pub reasoning: String,

    /// Additional metadata
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl MapConvert for RoutingResult {}

/// Answer-or-abstain decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Answer,
    Abstain,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Answer => write!(f, "answer"),
            Self::Abstain => write!(f, "abstain"),
        }
    }
}

/// Result of a selective-generation decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionResult {
    /// The decision taken
    pub decision: Decision,

    /// Candidate to present (content replaced on abstention)
    pub candidate: Candidate,

    /// Confidence score the decision was based on
    pub confidence: f64,

    /// Expected value of answering
    pub ev_answer: f64,

    /// Expected value of abstaining (always 0.0 under the EV rule)
    pub ev_abstain: f64,

    /// Why this decision was taken
    pub reasoning: String,

    /// Additional metadata
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl MapConvert for DecisionResult {}
