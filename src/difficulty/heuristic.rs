//! Heuristic feature-weighted difficulty estimator.
//!
//! Extracts four normalized features (length, lexical complexity, domain
//! keywords, question type), combines them with configured weights, and
//! derives confidence from how much the features agree with each other.
//!
//! Feature extraction runs on untrusted text, so it is wrapped in a blocking
//! task under a timeout.

use crate::difficulty::DifficultyEstimator;
use crate::models::{
    Context, DifficultyEstimate, DifficultyLevel, HeuristicConfig, PhronesisError, Result,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

const MATH_KEYWORDS: &[&str] = &[
    "integral", "derivative", "matrix", "theorem", "proof", "equation", "polynomial",
    "probability", "vector", "eigenvalue", "calculus", "algebra", "geometry", "modulo",
    "logarithm", "convergence",
];

const CODE_KEYWORDS: &[&str] = &[
    "function", "compile", "debug", "algorithm", "recursion", "runtime", "async",
    "thread", "pointer", "stack", "queue", "regex", "parse", "refactor", "api",
    "database", "bug",
];

const REASONING_KEYWORDS: &[&str] = &[
    "implies", "contradiction", "premise", "deduce", "infer", "syllogism", "paradox",
    "tradeoff", "constraint", "optimize", "strategy", "causality",
];

const CREATIVE_KEYWORDS: &[&str] = &[
    "story", "poem", "lyrics", "brainstorm", "imagine", "fictional", "character",
    "metaphor", "slogan", "rhyme",
];

const COMPLEX_INTERROGATIVES: &[&str] = &[
    "why", "how", "explain", "prove", "derive", "compare", "analyze", "evaluate",
    "justify", "design",
];

const SIMPLE_INTERROGATIVES: &[&str] = &[
    "what", "when", "who", "where", "which", "is", "are", "was", "were", "did", "does",
];

/// Heuristic difficulty estimator. Cheap, deterministic, no model calls.
pub struct HeuristicEstimator {
    config: HeuristicConfig,
}

impl HeuristicEstimator {
    /// Create an estimator; the config is validated here, not on first use.
    pub fn new(config: HeuristicConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Estimator with default configuration.
    pub fn with_defaults() -> Self {
        Self {
            config: HeuristicConfig::default(),
        }
    }
}

/// Extracted feature scores, each in [0, 1].
#[derive(Debug, Clone, Copy)]
struct Features {
    length: f64,
    complexity: f64,
    domain: f64,
    question_type: f64,
}

impl Features {
    fn as_map(&self) -> HashMap<String, f64> {
        HashMap::from([
            ("length".to_string(), self.length),
            ("complexity".to_string(), self.complexity),
            ("domain".to_string(), self.domain),
            ("question_type".to_string(), self.question_type),
        ])
    }

    fn variance(&self) -> f64 {
        let values = [self.length, self.complexity, self.domain, self.question_type];
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
    }
}

fn length_feature(query: &str) -> f64 {
    // Bucketed by character count; long queries tend to carry more
    // constraints and context.
    match query.chars().count() {
        0..=49 => 0.1,
        50..=149 => 0.3,
        150..=399 => 0.5,
        400..=999 => 0.7,
        _ => 0.9,
    }
}

fn complexity_feature(query: &str) -> f64 {
    let chars = query.chars().count().max(1) as f64;
    let words: Vec<&str> = query.split_whitespace().collect();

    let avg_word_len = if words.is_empty() {
        0.0
    } else {
        words.iter().map(|w| w.chars().count()).sum::<usize>() as f64 / words.len() as f64
    };
    let word_len_score = ((avg_word_len - 3.0) / 7.0).clamp(0.0, 1.0);

    let special = query
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
        .count() as f64;
    let special_score = (special / chars * 10.0).clamp(0.0, 1.0);

    let digits = query.chars().filter(|c| c.is_ascii_digit()).count() as f64;
    let digit_score = (digits / chars * 10.0).clamp(0.0, 1.0);

    (word_len_score * 0.5 + special_score * 0.25 + digit_score * 0.25).clamp(0.0, 1.0)
}

fn domain_feature(words: &[String]) -> f64 {
    // Per-list hit counts; three hits saturate a list. Lists carry
    // different base difficulties: formal domains score higher than
    // creative ones.
    let lists: [(&[&str], f64); 4] = [
        (MATH_KEYWORDS, 0.9),
        (CODE_KEYWORDS, 0.85),
        (REASONING_KEYWORDS, 0.7),
        (CREATIVE_KEYWORDS, 0.4),
    ];

    let mut best: f64 = 0.0;
    for (list, base) in lists {
        let hits = words.iter().filter(|w| list.contains(&w.as_str())).count();
        if hits > 0 {
            let saturation = (hits as f64 / 3.0).min(1.0);
            best = best.max(base * saturation);
        }
    }
    best
}

fn question_type_feature(words: &[String]) -> f64 {
    let has_complex = words
        .iter()
        .any(|w| COMPLEX_INTERROGATIVES.contains(&w.as_str()));
    let has_simple = words
        .iter()
        .any(|w| SIMPLE_INTERROGATIVES.contains(&w.as_str()));

    if has_complex {
        0.8
    } else if has_simple {
        0.2
    } else {
        0.5
    }
}

/// Map feature variance to confidence: features that agree are a stronger
/// signal than features that scatter.
fn variance_confidence(variance: f64) -> f64 {
    if variance < 0.01 {
        0.9
    } else if variance < 0.03 {
        0.75
    } else if variance < 0.06 {
        0.6
    } else {
        0.45
    }
}

fn extract_features(query: &str) -> Features {
    let words: Vec<String> = query
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();

    Features {
        length: length_feature(query),
        complexity: complexity_feature(query),
        domain: domain_feature(&words),
        question_type: question_type_feature(&words),
    }
}

#[async_trait]
impl DifficultyEstimator for HeuristicEstimator {
    async fn estimate(&self, query: &str, _context: &Context) -> Result<DifficultyEstimate> {
        if query.trim().is_empty() {
            return Err(PhronesisError::InvalidInput("empty query".to_string()));
        }
        let char_count = query.chars().count();
        if char_count > self.config.max_query_chars {
            return Err(PhronesisError::InvalidInput(format!(
                "query length {char_count} exceeds cap {}",
                self.config.max_query_chars
            )));
        }

        let owned = query.to_string();
        let extraction = tokio::task::spawn_blocking(move || extract_features(&owned));
        let features = tokio::time::timeout(self.config.timeout(), extraction)
            .await
            .map_err(|_| PhronesisError::Timeout(self.config.timeout()))?
            .map_err(|e| PhronesisError::Internal(format!("feature extraction failed: {e}")))?;

        let score = (features.length * self.config.length_weight
            + features.complexity * self.config.complexity_weight
            + features.domain * self.config.domain_weight
            + features.question_type * self.config.question_type_weight)
            .clamp(0.0, 1.0);

        let confidence = variance_confidence(features.variance());
        let level = DifficultyLevel::from_score(score);

        debug!(
            score = score,
            confidence = confidence,
            level = %level,
            "Heuristic difficulty estimate"
        );

        Ok(DifficultyEstimate::new(level, score, confidence)?
            .with_features(features.as_map()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Context;

    fn estimate(query: &str) -> Result<DifficultyEstimate> {
        tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(HeuristicEstimator::with_defaults().estimate(query, &Context::new()))
    }

    #[test]
    fn test_simple_factual_query_is_easy() {
        let e = estimate("What is the capital of France?").unwrap();
        assert_eq!(e.level, DifficultyLevel::Easy);
        assert!(e.score < 0.35);
    }

    #[test]
    fn test_technical_query_scores_higher() {
        let easy = estimate("Who wrote Hamlet?").unwrap();
        let hard = estimate(
            "Prove that the eigenvalue decomposition of a symmetric matrix yields \
             orthogonal eigenvectors, and derive the convergence rate of the power \
             iteration algorithm for the dominant eigenvalue.",
        )
        .unwrap();
        assert!(hard.score > easy.score);
    }

    #[test]
    fn test_outputs_clamped() {
        let e = estimate(
            "Explain how to derive and prove the integral theorem for matrix calculus \
             with eigenvalue constraints and analyze the proof strategy.",
        )
        .unwrap();
        assert!((0.0..=1.0).contains(&e.score));
        assert!((0.0..=1.0).contains(&e.confidence));
        assert_eq!(e.features.len(), 4);
        for value in e.features.values() {
            assert!((0.0..=1.0).contains(value));
        }
    }

    #[test]
    fn test_oversized_query_rejected() {
        let huge = "x".repeat(50_001);
        assert!(matches!(
            estimate(&huge),
            Err(PhronesisError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_empty_query_rejected() {
        assert!(estimate("   ").is_err());
    }

    #[test]
    fn test_variance_confidence_bands() {
        assert!((variance_confidence(0.005) - 0.9).abs() < 1e-9);
        assert!((variance_confidence(0.02) - 0.75).abs() < 1e-9);
        assert!((variance_confidence(0.05) - 0.6).abs() < 1e-9);
        assert!((variance_confidence(0.2) - 0.45).abs() < 1e-9);
    }

    #[test]
    fn test_batch_default_is_sequential() {
        let estimator = HeuristicEstimator::with_defaults();
        let queries = vec![
            "What is 2 + 2?".to_string(),
            "Explain why the halting problem is undecidable.".to_string(),
        ];
        let estimates = tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(estimator.estimate_batch(&queries, &Context::new()))
            .unwrap();
        assert_eq!(estimates.len(), 2);
    }
}
