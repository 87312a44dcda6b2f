//! Aleatoric/epistemic uncertainty classification.
//!
//! Pattern-matches the query against two marker lists: aleatoric markers
//! (subjectivity, preference, inherent ambiguity) and epistemic markers
//! (future speculation, out-of-scope knowledge). The dominant category, if
//! any clears the match floor, drives a suggested downstream action.
//!
//! All patterns compile at construction; a bad pattern is a config error,
//! never a runtime surprise. Matching runs on a blocking thread under a
//! timeout since queries are untrusted text.

use crate::models::{
    Context, Metadata, PhronesisError, Result, SuggestedAction, UncertaintyConfig,
    UncertaintyKind, UncertaintyResult,
};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Context key selecting a domain extension for one call.
pub const DOMAIN_KEY: &str = "domain";

/// Epistemic classifications at or above this confidence suggest abstention
/// rather than a source pointer.
const EPISTEMIC_ABSTAIN_CONFIDENCE: f64 = 0.7;

/// Compiled pattern lists for one domain (or the base set).
struct PatternSet {
    aleatoric: Vec<Regex>,
    epistemic: Vec<Regex>,
}

fn compile(kind: &str, patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| {
                PhronesisError::InvalidConfig(format!("bad {kind} pattern '{p}': {e}"))
            })
        })
        .collect()
}

struct Inner {
    config: UncertaintyConfig,
    base: PatternSet,
    domains: HashMap<String, PatternSet>,
}

impl Inner {
    /// Count how many patterns match, over base plus the selected domain
    /// extension.
    fn score(&self, query: &str, domain: Option<&str>) -> (CategoryScore, CategoryScore) {
        let extension = domain.and_then(|d| self.domains.get(d));

        let aleatoric = count_matches(
            query,
            &self.base.aleatoric,
            extension.map(|e| e.aleatoric.as_slice()),
        );
        let epistemic = count_matches(
            query,
            &self.base.epistemic,
            extension.map(|e| e.epistemic.as_slice()),
        );

        (
            CategoryScore::derive(aleatoric.0, aleatoric.1, self.config.aleatoric_multiplier),
            CategoryScore::derive(epistemic.0, epistemic.1, self.config.epistemic_multiplier),
        )
    }
}

fn count_matches(query: &str, base: &[Regex], extension: Option<&[Regex]>) -> (usize, usize) {
    let mut matched = 0usize;
    let mut total = 0usize;
    for pattern in base.iter().chain(extension.unwrap_or_default()) {
        total += 1;
        if pattern.is_match(query) {
            matched += 1;
        }
    }
    (matched, total)
}

#[derive(Debug, Clone, Copy)]
struct CategoryScore {
    matches: usize,
    score: f64,
}

impl CategoryScore {
    fn derive(matches: usize, total: usize, multiplier: f64) -> Self {
        let score = if total == 0 {
            0.0
        } else {
            (matches as f64 / total as f64 * multiplier).min(1.0)
        };
        Self { matches, score }
    }
}

/// Query-level uncertainty classifier.
pub struct UncertaintyQuantifier {
    inner: Arc<Inner>,
}

impl UncertaintyQuantifier {
    /// Create a quantifier; config validates and all patterns compile here.
    pub fn new(config: UncertaintyConfig) -> Result<Self> {
        config.validate()?;

        let base = PatternSet {
            aleatoric: compile("aleatoric", &config.aleatoric_patterns)?,
            epistemic: compile("epistemic", &config.epistemic_patterns)?,
        };

        let mut domains = HashMap::new();
        for (name, patterns) in &config.domain_extensions {
            domains.insert(
                name.clone(),
                PatternSet {
                    aleatoric: compile("aleatoric", &patterns.aleatoric)?,
                    epistemic: compile("epistemic", &patterns.epistemic)?,
                },
            );
        }

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                base,
                domains,
            }),
        })
    }

    /// Classify a query's dominant uncertainty category.
    ///
    /// The optional `domain` context key extends the base pattern lists with
    /// the matching per-domain markers.
    pub async fn classify(&self, query: &str, context: &Context) -> Result<UncertaintyResult> {
        if query.trim().is_empty() {
            return Err(PhronesisError::InvalidInput("empty query".to_string()));
        }

        let inner = Arc::clone(&self.inner);
        let lowered = query.to_lowercase();
        let domain = context
            .get(DOMAIN_KEY)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let timeout = self.inner.config.timeout();
        let (aleatoric, epistemic) = tokio::time::timeout(
            timeout,
            tokio::task::spawn_blocking(move || inner.score(&lowered, domain.as_deref())),
        )
        .await
        .map_err(|_| PhronesisError::Timeout(timeout))?
        .map_err(|e| PhronesisError::Internal(format!("pattern matching task: {e}")))?;

        let min_matches = self.inner.config.min_matches;
        let aleatoric_qualifies = aleatoric.matches >= min_matches;
        let epistemic_qualifies = epistemic.matches >= min_matches;

        // Dominant category by score; an exact tie counts as aleatoric since
        // irreducible ambiguity caps what more knowledge could fix.
        let (kind, confidence, reasoning) = match (aleatoric_qualifies, epistemic_qualifies) {
            (false, false) => (
                UncertaintyKind::None,
                1.0 - aleatoric.score.max(epistemic.score),
                "no uncertainty markers cleared the match floor".to_string(),
            ),
            (true, false) => (
                UncertaintyKind::Aleatoric,
                aleatoric.score,
                format!(
                    "{} aleatoric marker(s) matched; question looks inherently subjective or ambiguous",
                    aleatoric.matches
                ),
            ),
            (false, true) => (
                UncertaintyKind::Epistemic,
                epistemic.score,
                format!(
                    "{} epistemic marker(s) matched; question asks for unavailable knowledge",
                    epistemic.matches
                ),
            ),
            (true, true) => {
                if epistemic.score > aleatoric.score {
                    (
                        UncertaintyKind::Epistemic,
                        epistemic.score,
                        format!(
                            "both categories matched; epistemic dominates ({:.3} vs {:.3})",
                            epistemic.score, aleatoric.score
                        ),
                    )
                } else {
                    (
                        UncertaintyKind::Aleatoric,
                        aleatoric.score,
                        format!(
                            "both categories matched; aleatoric dominates ({:.3} vs {:.3})",
                            aleatoric.score, epistemic.score
                        ),
                    )
                }
            }
        };

        let suggested_action = recommend_action(kind, confidence);
        debug!(
            kind = %kind,
            confidence,
            action = ?suggested_action,
            "Uncertainty classification"
        );

        let mut metadata = Metadata::new();
        metadata.insert("aleatoric_score".to_string(), aleatoric.score.into());
        metadata.insert("epistemic_score".to_string(), epistemic.score.into());
        metadata.insert("aleatoric_matches".to_string(), aleatoric.matches.into());
        metadata.insert("epistemic_matches".to_string(), epistemic.matches.into());

        Ok(UncertaintyResult {
            uncertainty_type: kind,
            confidence: confidence.clamp(0.0, 1.0),
            reasoning,
            suggested_action,
            metadata,
        })
    }
}

/// Map a classification to a downstream action.
pub fn recommend_action(kind: UncertaintyKind, confidence: f64) -> SuggestedAction {
    match kind {
        UncertaintyKind::Aleatoric => SuggestedAction::ProvideOptions,
        UncertaintyKind::Epistemic => {
            if confidence >= EPISTEMIC_ABSTAIN_CONFIDENCE {
                SuggestedAction::Abstain
            } else {
                SuggestedAction::SuggestSource
            }
        }
        UncertaintyKind::None => SuggestedAction::AnswerDirectly,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DomainPatterns;

    fn quantifier() -> UncertaintyQuantifier {
        UncertaintyQuantifier::new(UncertaintyConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_subjective_query_is_aleatoric() {
        let result = quantifier()
            .classify("What is the best programming language?", &Context::new())
            .await
            .unwrap();
        assert_eq!(result.uncertainty_type, UncertaintyKind::Aleatoric);
        assert_eq!(result.suggested_action, SuggestedAction::ProvideOptions);
        assert!(result.confidence > 0.0);
    }

    #[tokio::test]
    async fn test_future_query_is_epistemic() {
        let result = quantifier()
            .classify(
                "Predict who will win the next election. What does the forecast say about the future?",
                &Context::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.uncertainty_type, UncertaintyKind::Epistemic);
        assert!(matches!(
            result.suggested_action,
            SuggestedAction::Abstain | SuggestedAction::SuggestSource
        ));
    }

    #[tokio::test]
    async fn test_factual_query_is_none() {
        let result = quantifier()
            .classify("What is the boiling point of water at sea level?", &Context::new())
            .await
            .unwrap();
        assert_eq!(result.uncertainty_type, UncertaintyKind::None);
        assert_eq!(result.suggested_action, SuggestedAction::AnswerDirectly);
    }

    #[tokio::test]
    async fn test_matching_is_case_insensitive() {
        let result = quantifier()
            .classify("WHAT IS THE BEST LAPTOP?", &Context::new())
            .await
            .unwrap();
        assert_eq!(result.uncertainty_type, UncertaintyKind::Aleatoric);
    }

    #[tokio::test]
    async fn test_domain_extension_applies() {
        let mut config = UncertaintyConfig::default();
        config.domain_extensions.insert(
            "medical".to_string(),
            DomainPatterns {
                aleatoric: vec![r"\btreatment preference\b".to_string()],
                epistemic: vec![r"\blong-term effects\b".to_string()],
            },
        );
        let q = UncertaintyQuantifier::new(config).unwrap();

        let mut ctx = Context::new();
        ctx.insert(DOMAIN_KEY.to_string(), "medical".into());
        let result = q
            .classify("What are the long-term effects of this drug?", &ctx)
            .await
            .unwrap();
        assert_eq!(result.uncertainty_type, UncertaintyKind::Epistemic);

        // Without the domain key the extension pattern is not consulted.
        let result = q
            .classify("What are the long-term effects of this drug?", &Context::new())
            .await
            .unwrap();
        assert_eq!(result.uncertainty_type, UncertaintyKind::None);
    }

    #[tokio::test]
    async fn test_min_matches_floor() {
        let mut config = UncertaintyConfig::default();
        config.min_matches = 3;
        let q = UncertaintyQuantifier::new(config).unwrap();

        // Only one aleatoric marker; below the floor.
        let result = q
            .classify("What is the best laptop?", &Context::new())
            .await
            .unwrap();
        assert_eq!(result.uncertainty_type, UncertaintyKind::None);
    }

    #[tokio::test]
    async fn test_bad_pattern_rejected_at_construction() {
        let mut config = UncertaintyConfig::default();
        config.aleatoric_patterns.push("(unclosed".to_string());
        assert!(matches!(
            UncertaintyQuantifier::new(config),
            Err(PhronesisError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        assert!(quantifier().classify("   ", &Context::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_scores_recorded_in_metadata() {
        let result = quantifier()
            .classify("Which is better, and what do you think?", &Context::new())
            .await
            .unwrap();
        assert!(result.metadata["aleatoric_matches"].as_u64().unwrap() >= 2);
        assert!(result.metadata["aleatoric_score"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn test_recommend_action_bands() {
        assert_eq!(
            recommend_action(UncertaintyKind::Aleatoric, 0.9),
            SuggestedAction::ProvideOptions
        );
        assert_eq!(
            recommend_action(UncertaintyKind::Epistemic, 0.9),
            SuggestedAction::Abstain
        );
        assert_eq!(
            recommend_action(UncertaintyKind::Epistemic, 0.5),
            SuggestedAction::SuggestSource
        );
        assert_eq!(
            recommend_action(UncertaintyKind::None, 0.1),
            SuggestedAction::AnswerDirectly
        );
    }
}
