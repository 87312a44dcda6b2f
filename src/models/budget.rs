//! Compute budget value type.
//!
//! K_i: `cost` is computed deterministically at construction and never
//! drifts from the budget's knobs. The cost model is abstract units, not
//! dollars: one candidate generation costs 1.0, verification half that per
//! candidate, search iterations 0.01 each, refinement passes 1.0 each.

use crate::models::{MapConvert, Metadata, PhronesisError, Result};
use serde::{Deserialize, Serialize};

/// Resource allowance for answering one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeBudget {
    /// Number of candidates to sample (> 0)
    pub num_candidates: u32,

    /// Whether to run a verifier pass over candidates
    pub use_verifier: bool,

    /// Whether to run retrieval/search
    pub use_search: bool,

    /// Number of refinement passes (>= 0)
    pub max_refinements: u32,

    /// Search iterations, when search is enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_iterations: Option<u32>,

    /// Verifier acceptance threshold, when the verifier is enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifier_threshold: Option<f64>,

    /// Total cost of this budget in abstract compute units
    pub cost: f64,

    /// Additional metadata
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl ComputeBudget {
    /// Construct a budget, computing its cost.
    ///
    /// B_i falsified on: zero candidates, out-of-range verifier threshold.
    pub fn new(
        num_candidates: u32,
        use_verifier: bool,
        use_search: bool,
        max_refinements: u32,
        search_iterations: Option<u32>,
        verifier_threshold: Option<f64>,
    ) -> Result<Self> {
        if num_candidates == 0 {
            return Err(PhronesisError::InvalidConfig(
                "budget must allow at least one candidate".to_string(),
            ));
        }
        if let Some(t) = verifier_threshold {
            if !t.is_finite() || !(0.0..=1.0).contains(&t) {
                return Err(PhronesisError::InvalidConfig(format!(
                    "verifier threshold must be in [0, 1], got {t}"
                )));
            }
        }

        let n = f64::from(num_candidates);
        let mut cost = n;
        if use_verifier {
            cost += n * 0.5;
        }
        if use_search {
            cost += f64::from(search_iterations.unwrap_or(0)) * 0.01;
        }
        cost += f64::from(max_refinements);

        Ok(Self {
            num_candidates,
            use_verifier,
            use_search,
            max_refinements,
            search_iterations,
            verifier_threshold,
            cost,
            metadata: Metadata::new(),
        })
    }

    /// Canonical preset for easy queries: 3 candidates, nothing else. Cost 3.0.
    pub fn easy() -> Self {
        Self::new(3, false, false, 0, None, None).expect("easy preset is valid")
    }

    /// Canonical preset for medium queries: 5 candidates, verifier, one
    /// refinement. Cost 8.5.
    pub fn medium() -> Self {
        Self::new(5, true, false, 1, None, Some(0.7)).expect("medium preset is valid")
    }

    /// Canonical preset for hard queries: 10 candidates, verifier, search
    /// with 50 iterations, two refinements. Cost 17.5.
    pub fn hard() -> Self {
        Self::new(10, true, true, 2, Some(50), Some(0.7)).expect("hard preset is valid")
    }
}

impl MapConvert for ComputeBudget {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_costs() {
        assert!((ComputeBudget::easy().cost - 3.0).abs() < 1e-9);
        assert!((ComputeBudget::medium().cost - 8.5).abs() < 1e-9);
        assert!((ComputeBudget::hard().cost - 17.5).abs() < 1e-9);
    }

    #[test]
    fn test_cost_formula() {
        // n*1.0 + verifier n*0.5 + search iters*0.01 + refinements*1.0
        let b = ComputeBudget::new(4, true, true, 3, Some(200), None).unwrap();
        assert!((b.cost - (4.0 + 2.0 + 2.0 + 3.0)).abs() < 1e-9);

        // Search enabled without iterations contributes nothing.
        let b = ComputeBudget::new(2, false, true, 0, None, None).unwrap();
        assert!((b.cost - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_construction_rejects_invalid() {
        assert!(ComputeBudget::new(0, false, false, 0, None, None).is_err());
        assert!(ComputeBudget::new(3, true, false, 0, None, Some(1.5)).is_err());
    }

    #[test]
    fn test_map_round_trip() {
        let b = ComputeBudget::hard();
        let map = b.to_map().unwrap();
        let back = ComputeBudget::from_map(map.clone()).unwrap();
        assert_eq!(back.num_candidates, 10);
        assert_eq!(back.to_map().unwrap(), map);
    }
}
