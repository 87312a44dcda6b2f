//! Majority-vote aggregation over extracted answers.

use crate::generate::{AggregateOutcome, Aggregator};
use crate::models::{Candidate, PhronesisError, Result};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

fn answer_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)<answer>(.*?)</answer>").expect("static pattern")
    })
}

fn answer_section_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)##\s*Answer\s*\n(.*?)(?:\n##|$)").expect("static pattern")
    })
}

/// Extract the answer span from candidate content.
///
/// Tries `<answer>` tags, then a `## Answer` section, then falls back to the
/// last non-empty paragraph (capped at 500 characters).
pub fn extract_answer(content: &str) -> String {
    if let Some(captures) = answer_tag_pattern().captures(content) {
        if let Some(m) = captures.get(1) {
            return m.as_str().trim().to_string();
        }
    }

    if let Some(captures) = answer_section_pattern().captures(content) {
        if let Some(m) = captures.get(1) {
            return m.as_str().trim().to_string();
        }
    }

    content
        .split("\n\n")
        .filter(|p| !p.trim().is_empty())
        .last()
        .map(|p| p.trim().chars().take(500).collect())
        .unwrap_or_default()
}

/// Normalize an answer for vote counting: lowercase, collapse whitespace,
/// strip trailing sentence punctuation.
pub fn normalize_answer(answer: &str) -> String {
    let lowered = answer.trim().to_lowercase();
    let collapsed: String = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(['.', '!', '?', ',', ';', ':'])
        .to_string()
}

/// Aggregator selecting the candidate whose answer the most candidates agree
/// with.
#[derive(Debug, Clone, Default)]
pub struct MajorityVoteAggregator;

impl MajorityVoteAggregator {
    pub fn new() -> Self {
        Self
    }
}

impl Aggregator for MajorityVoteAggregator {
    fn aggregate(&self, candidates: &[Candidate]) -> Result<AggregateOutcome> {
        if candidates.is_empty() {
            return Err(PhronesisError::InvalidInput(
                "cannot aggregate an empty candidate list".to_string(),
            ));
        }

        let mut votes: HashMap<String, usize> = HashMap::new();
        let mut keyed: Vec<(String, &Candidate)> = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let key = normalize_answer(&extract_answer(&candidate.content));
            *votes.entry(key.clone()).or_insert(0) += 1;
            keyed.push((key, candidate));
        }

        // Modal answer; ties break on the lexically smallest key so the
        // outcome never depends on iteration or arrival order.
        let (winner_key, winner_votes) = votes
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(k, v)| (k.clone(), *v))
            .ok_or_else(|| PhronesisError::Internal("vote map empty".to_string()))?;

        // Best member of the winning group: highest score, then smallest id.
        let best = keyed
            .iter()
            .filter(|(key, _)| *key == winner_key)
            .map(|(_, c)| *c)
            .max_by(|a, b| {
                let sa = a.score.unwrap_or(0.0);
                let sb = b.score.unwrap_or(0.0);
                sa.partial_cmp(&sb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.id.cmp(&a.id))
            })
            .ok_or_else(|| PhronesisError::Internal("winning group empty".to_string()))?
            .clone();

        let agreement = winner_votes as f64 / candidates.len() as f64;

        Ok(AggregateOutcome {
            best,
            vote_distribution: votes,
            agreement,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(content: &str) -> Candidate {
        Candidate::new(content)
    }

    #[test]
    fn test_extract_answer_tags() {
        assert_eq!(
            extract_answer("reasoning...\n<answer>42</answer>\ntrailing"),
            "42"
        );
    }

    #[test]
    fn test_extract_answer_section() {
        assert_eq!(
            extract_answer("## Reasoning\nstuff\n\n## Answer\nParis\n## Notes\nmore"),
            "Paris"
        );
    }

    #[test]
    fn test_extract_answer_fallback_last_paragraph() {
        assert_eq!(extract_answer("first paragraph\n\nthe answer"), "the answer");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_answer("  The   Answer.  "), "the answer");
        assert_eq!(normalize_answer("42!"), "42");
        assert_eq!(normalize_answer("Paris"), normalize_answer("paris."));
    }

    #[test]
    fn test_majority_wins() {
        let candidates = vec![
            candidate("<answer>Paris</answer>"),
            candidate("<answer>paris.</answer>"),
            candidate("<answer>Lyon</answer>"),
        ];
        let outcome = MajorityVoteAggregator::new().aggregate(&candidates).unwrap();
        assert_eq!(normalize_answer(&extract_answer(&outcome.best.content)), "paris");
        assert_eq!(outcome.vote_distribution["paris"], 2);
        assert!((outcome.agreement - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_order_independence() {
        let a = candidate("<answer>alpha</answer>");
        let b = candidate("<answer>beta</answer>");
        let c = candidate("<answer>alpha</answer>");

        let forward = MajorityVoteAggregator::new()
            .aggregate(&[a.clone(), b.clone(), c.clone()])
            .unwrap();
        let reversed = MajorityVoteAggregator::new()
            .aggregate(&[c, b, a])
            .unwrap();
        assert_eq!(forward.vote_distribution, reversed.vote_distribution);
        assert!((forward.agreement - reversed.agreement).abs() < 1e-12);
        assert_eq!(
            extract_answer(&forward.best.content),
            extract_answer(&reversed.best.content)
        );
    }

    #[test]
    fn test_best_prefers_higher_score() {
        let low = candidate("<answer>same</answer>");
        let high = candidate("<answer>same</answer>").with_score(0.9).unwrap();
        let outcome = MajorityVoteAggregator::new()
            .aggregate(&[low, high.clone()])
            .unwrap();
        assert_eq!(outcome.best.id, high.id);
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(MajorityVoteAggregator::new().aggregate(&[]).is_err());
    }

    #[test]
    fn test_unanimous_agreement() {
        let candidates: Vec<Candidate> =
            (0..3).map(|_| candidate("<answer>yes</answer>")).collect();
        let outcome = MajorityVoteAggregator::new().aggregate(&candidates).unwrap();
        assert!((outcome.agreement - 1.0).abs() < 1e-12);
    }
}
