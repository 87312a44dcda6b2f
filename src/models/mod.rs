//! Shared value types, configuration, and error taxonomy.

pub mod budget;
pub mod candidate;
pub mod config;
pub mod decision;
pub mod error;
pub mod estimate;

pub use budget::ComputeBudget;
pub use candidate::{Candidate, LOGPROBS_KEY};
pub use config::{
    ClassifierConfig, ClientConfig, CombineStrategy, ControllerConfig, DomainPatterns,
    EnsembleConfig, GateConfig, HeuristicConfig, PipelineConfig, ProbAggregation,
    SelectiveConfig, TokenProbConfig, UncertaintyConfig,
};
pub use decision::{Decision, DecisionResult, RoutingAction, RoutingResult};
pub use error::{PhronesisError, Result};
pub use estimate::{
    ConfidenceEstimate, ConfidenceLevel, DifficultyEstimate, DifficultyLevel, SuggestedAction,
    UncertaintyKind, UncertaintyResult,
};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Free-form metadata attached to value types.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Per-call context passed into estimators and generators.
pub type Context = serde_json::Map<String, serde_json::Value>;

/// Symmetric map serialization for result types.
///
/// `from_map` validates enum-like string fields against their whitelists via
/// serde and returns a typed error on mismatch; it never constructs an
/// invalid value or silently coerces an unknown variant.
pub trait MapConvert: Serialize + DeserializeOwned {
    /// Serialize to a JSON map value.
    fn to_map(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self)
            .map_err(|e| PhronesisError::Internal(format!("serializing to map: {e}")))
    }

    /// Deserialize from a JSON map value.
    fn from_map(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| PhronesisError::InvalidInput(format!("invalid map: {e}")))
    }
}
