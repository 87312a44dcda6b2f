//! Calibration gate: confidence-banded answer routing.
//!
//! Maps a candidate's confidence score to a presentation action. High
//! confidence passes through untouched; medium and low bands get the
//! configured action, which may annotate or replace the candidate content.
//!
//! Telemetry carries scores, levels, and durations only. Candidate content
//! never enters a telemetry event.

use crate::models::{
    Candidate, ConfidenceLevel, GateConfig, Metadata, Result, RoutingAction, RoutingResult,
};
use crate::models::estimate::validate_unit;
use std::time::Instant;
use tracing::{debug, info};

/// Annotation appended when an answer needs verification.
const VERIFICATION_NOTE: &str =
    "\n\nNote: confidence in this answer is moderate. Please verify independently before relying on it.";

/// Annotation appended when an answer needs supporting citations.
const CITATIONS_NOTE: &str =
    "\n\nNote: confidence in this answer is moderate. Supporting sources should be checked before relying on it.";

/// Replacement content for an abstained answer.
const ABSTAIN_TEMPLATE: &str =
    "I'm not confident enough in my answer to share it. The confidence score for this response fell below the reliability threshold.";

/// Replacement content for an escalated answer.
const ESCALATE_TEMPLATE: &str =
    "This response needs human review before it can be shared. It has been flagged for escalation due to low confidence.";

/// One routing decision, stripped to what telemetry may carry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteEvent {
    pub action: RoutingAction,
    pub confidence_level: ConfidenceLevel,
    pub score: f64,
    pub duration_ms: u64,
}

/// Sink for per-route telemetry events.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: &RouteEvent);
}

/// Telemetry sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn record(&self, _event: &RouteEvent) {}
}

/// Telemetry sink emitting structured log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record(&self, event: &RouteEvent) {
        info!(
            action = %event.action,
            level = %event.confidence_level,
            score = event.score,
            duration_ms = event.duration_ms,
            "Routed candidate"
        );
    }
}

/// Routes candidates by confidence band.
pub struct CalibrationGate {
    config: GateConfig,
    telemetry: Box<dyn TelemetrySink>,
}

impl CalibrationGate {
    /// Create a gate with tracing-backed telemetry; config is validated here.
    pub fn new(config: GateConfig) -> Result<Self> {
        Self::with_telemetry(config, Box::new(TracingSink))
    }

    /// Create a gate with a custom telemetry sink.
    pub fn with_telemetry(config: GateConfig, telemetry: Box<dyn TelemetrySink>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, telemetry })
    }

    /// Band a score using the configured thresholds (not the fixed global
    /// bands, which only apply to default thresholds).
    fn band(&self, score: f64) -> ConfidenceLevel {
        if score >= self.config.high_threshold {
            ConfidenceLevel::High
        } else if score >= self.config.low_threshold {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    /// Rewrite candidate content for the selected action.
    fn apply_action(action: RoutingAction, candidate: &Candidate) -> Candidate {
        match action {
            RoutingAction::Direct => candidate.clone(),
            RoutingAction::WithVerification => {
                candidate.with_replaced_content(format!("{}{}", candidate.content, VERIFICATION_NOTE))
            }
            RoutingAction::WithCitations => {
                candidate.with_replaced_content(format!("{}{}", candidate.content, CITATIONS_NOTE))
            }
            RoutingAction::Abstain => candidate.with_replaced_content(ABSTAIN_TEMPLATE),
            RoutingAction::Escalate => candidate.with_replaced_content(ESCALATE_TEMPLATE),
        }
    }

    /// Route a candidate by its confidence score.
    pub fn route(&self, candidate: &Candidate, score: f64) -> Result<RoutingResult> {
        validate_unit("routing score", score)?;
        let started = Instant::now();

        let level = self.band(score);
        let action = match level {
            ConfidenceLevel::High => RoutingAction::Direct,
            ConfidenceLevel::Medium => self.config.medium_action,
            ConfidenceLevel::Low => self.config.low_action,
        };

        let routed = Self::apply_action(action, candidate);
        let reasoning = format!(
            "score {score:.3} is in the {level} band (thresholds: high {}, low {}), action {action}",
            self.config.high_threshold, self.config.low_threshold
        );

        debug!(score, level = %level, action = %action, "Gate decision");
        if self.config.emit_telemetry {
            self.telemetry.record(&RouteEvent {
                action,
                confidence_level: level,
                score,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }

        Ok(RoutingResult {
            action,
            candidate: routed,
            original_score: score,
            confidence_level: level,
            reasoning,
            metadata: Metadata::new(),
        })
    }

    /// Pre-flight check: would this score route below the given threshold?
    pub fn should_route(&self, score: f64, threshold: f64) -> Result<bool> {
        validate_unit("routing score", score)?;
        validate_unit("routing threshold", threshold)?;
        Ok(score < threshold)
    }
}
