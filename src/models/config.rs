//! Configuration models for phronesis.
//!
//! All I^R (resolvable ignorance) is parameterized here. Every config struct
//! validates at construction/load time — a bad threshold or weight set is
//! rejected before any component runs, never on first use.

use crate::models::{PhronesisError, Result, RoutingAction};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Heuristic difficulty estimator configuration.
///
/// Feature weights must sum to 1.0 (±0.01 tolerance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicConfig {
    /// Weight for the query-length feature
    #[serde(default = "default_length_weight")]
    pub length_weight: f64,

    /// Weight for the lexical-complexity feature
    #[serde(default = "default_complexity_weight")]
    pub complexity_weight: f64,

    /// Weight for the domain-keyword feature
    #[serde(default = "default_domain_weight")]
    pub domain_weight: f64,

    /// Weight for the question-type feature
    #[serde(default = "default_question_type_weight")]
    pub question_type_weight: f64,

    /// Hard cap on query length in characters
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,

    /// Feature-extraction timeout in seconds (ceiling 30)
    #[serde(default = "default_estimator_timeout")]
    pub timeout_secs: u64,
}

fn default_length_weight() -> f64 {
    0.25
}

fn default_complexity_weight() -> f64 {
    0.25
}

fn default_domain_weight() -> f64 {
    0.3
}

fn default_question_type_weight() -> f64 {
    0.2
}

fn default_max_query_chars() -> usize {
    50_000
}

fn default_estimator_timeout() -> u64 {
    5
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            length_weight: default_length_weight(),
            complexity_weight: default_complexity_weight(),
            domain_weight: default_domain_weight(),
            question_type_weight: default_question_type_weight(),
            max_query_chars: default_max_query_chars(),
            timeout_secs: default_estimator_timeout(),
        }
    }
}

impl HeuristicConfig {
    /// Validate weights, cap, and timeout.
    pub fn validate(&self) -> Result<()> {
        let weights = [
            self.length_weight,
            self.complexity_weight,
            self.domain_weight,
            self.question_type_weight,
        ];
        for w in weights {
            if !w.is_finite() || !(0.0..=1.0).contains(&w) {
                return Err(PhronesisError::InvalidConfig(format!(
                    "feature weight must be in [0, 1], got {w}"
                )));
            }
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 0.01 {
            return Err(PhronesisError::InvalidConfig(format!(
                "feature weights must sum to 1.0 (±0.01), got {sum:.4}"
            )));
        }
        if self.max_query_chars == 0 {
            return Err(PhronesisError::InvalidConfig(
                "max_query_chars must be positive".to_string(),
            ));
        }
        if self.timeout_secs == 0 || self.timeout_secs > 30 {
            return Err(PhronesisError::InvalidConfig(format!(
                "heuristic timeout must be in 1..=30 seconds, got {}",
                self.timeout_secs
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Model-based difficulty classifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Queries are truncated to this many characters before prompting
    #[serde(default = "default_classifier_query_chars")]
    pub max_query_chars: usize,

    /// Model responses larger than this are rejected
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,

    /// Per-call timeout in seconds
    #[serde(default = "default_estimator_timeout")]
    pub timeout_secs: u64,
}

fn default_classifier_query_chars() -> usize {
    10_000
}

fn default_max_response_bytes() -> usize {
    50_000
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_query_chars: default_classifier_query_chars(),
            max_response_bytes: default_max_response_bytes(),
            timeout_secs: default_estimator_timeout(),
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_query_chars == 0 || self.max_response_bytes == 0 {
            return Err(PhronesisError::InvalidConfig(
                "classifier size caps must be positive".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(PhronesisError::InvalidConfig(
                "classifier timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Adaptive self-consistency controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Minimum candidates before consensus is checked
    #[serde(default = "default_min_candidates")]
    pub min_candidates: usize,

    /// Hard cap on total candidates per run
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    /// Candidates generated per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Agreement fraction that triggers early stopping
    #[serde(default = "default_early_stop")]
    pub early_stop_threshold: f64,

    /// Overall run timeout in seconds (ceiling 300)
    #[serde(default = "default_run_timeout")]
    pub timeout_secs: u64,
}

fn default_min_candidates() -> usize {
    3
}

fn default_max_candidates() -> usize {
    20
}

fn default_batch_size() -> usize {
    3
}

fn default_early_stop() -> f64 {
    0.8
}

fn default_run_timeout() -> u64 {
    30
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            min_candidates: default_min_candidates(),
            max_candidates: default_max_candidates(),
            batch_size: default_batch_size(),
            early_stop_threshold: default_early_stop(),
            timeout_secs: default_run_timeout(),
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_candidates == 0 || self.batch_size == 0 {
            return Err(PhronesisError::InvalidConfig(
                "min_candidates and batch_size must be positive".to_string(),
            ));
        }
        if self.max_candidates < self.min_candidates {
            return Err(PhronesisError::InvalidConfig(format!(
                "max_candidates ({}) must be >= min_candidates ({})",
                self.max_candidates, self.min_candidates
            )));
        }
        if !self.early_stop_threshold.is_finite()
            || !(0.0..=1.0).contains(&self.early_stop_threshold)
            || self.early_stop_threshold == 0.0
        {
            return Err(PhronesisError::InvalidConfig(format!(
                "early_stop_threshold must be in (0, 1], got {}",
                self.early_stop_threshold
            )));
        }
        if self.timeout_secs == 0 || self.timeout_secs > 300 {
            return Err(PhronesisError::InvalidConfig(format!(
                "controller timeout must be in 1..=300 seconds, got {}",
                self.timeout_secs
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Calibration gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Scores at or above this route Direct
    #[serde(default = "default_high_threshold")]
    pub high_threshold: f64,

    /// Scores below this route to `low_action`
    #[serde(default = "default_low_threshold")]
    pub low_threshold: f64,

    /// Action for medium-confidence candidates
    #[serde(default = "default_medium_action")]
    pub medium_action: RoutingAction,

    /// Action for low-confidence candidates
    #[serde(default = "default_low_action")]
    pub low_action: RoutingAction,

    /// Emit one telemetry event per route call
    #[serde(default = "default_true")]
    pub emit_telemetry: bool,
}

fn default_high_threshold() -> f64 {
    0.7
}

fn default_low_threshold() -> f64 {
    0.4
}

fn default_medium_action() -> RoutingAction {
    RoutingAction::WithVerification
}

fn default_low_action() -> RoutingAction {
    RoutingAction::Abstain
}

fn default_true() -> bool {
    true
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            high_threshold: default_high_threshold(),
            low_threshold: default_low_threshold(),
            medium_action: default_medium_action(),
            low_action: default_low_action(),
            emit_telemetry: default_true(),
        }
    }
}

impl GateConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, t) in [
            ("high_threshold", self.high_threshold),
            ("low_threshold", self.low_threshold),
        ] {
            if !t.is_finite() || !(0.0..=1.0).contains(&t) {
                return Err(PhronesisError::InvalidConfig(format!(
                    "{name} must be in [0, 1], got {t}"
                )));
            }
        }
        if self.high_threshold <= self.low_threshold {
            return Err(PhronesisError::InvalidConfig(format!(
                "high_threshold ({}) must be greater than low_threshold ({})",
                self.high_threshold, self.low_threshold
            )));
        }
        Ok(())
    }
}

/// Selective-generation (answer-or-abstain) configuration.
///
/// Domain presets are just different reward/penalty pairs; there is no
/// special-cased logic per domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectiveConfig {
    /// Reward for a correct answer
    #[serde(default = "default_reward")]
    pub reward: f64,

    /// Penalty for an incorrect answer
    #[serde(default = "default_reward")]
    pub penalty: f64,

    /// Use expected-value decision rule (otherwise threshold rule)
    #[serde(default = "default_true")]
    pub use_ev: bool,

    /// Confidence threshold for the threshold rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f64>,
}

fn default_reward() -> f64 {
    1.0
}

impl Default for SelectiveConfig {
    fn default() -> Self {
        Self {
            reward: default_reward(),
            penalty: default_reward(),
            use_ev: true,
            confidence_threshold: None,
        }
    }
}

impl SelectiveConfig {
    /// High-penalty preset for safety-critical domains.
    pub fn high_stakes() -> Self {
        Self {
            reward: 1.0,
            penalty: 10.0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, v) in [("reward", self.reward), ("penalty", self.penalty)] {
            if !v.is_finite() || v < 0.0 {
                return Err(PhronesisError::InvalidConfig(format!(
                    "{name} must be finite and non-negative, got {v}"
                )));
            }
        }
        if let Some(t) = self.confidence_threshold {
            if !t.is_finite() || !(0.0..=1.0).contains(&t) {
                return Err(PhronesisError::InvalidConfig(format!(
                    "confidence_threshold must be in [0, 1], got {t}"
                )));
            }
        }
        if !self.use_ev && self.confidence_threshold.is_none() {
            return Err(PhronesisError::InvalidConfig(
                "threshold mode requires confidence_threshold".to_string(),
            ));
        }
        Ok(())
    }
}

/// Aggregation rule for token probabilities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbAggregation {
    /// Product of token probabilities (most conservative)
    #[default]
    Product,
    /// Arithmetic mean of token probabilities
    Mean,
    /// Minimum token probability
    Min,
}

impl ProbAggregation {
    /// Parse against the explicit whitelist.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "product" => Ok(Self::Product),
            "mean" => Ok(Self::Mean),
            "min" => Ok(Self::Min),
            other => Err(PhronesisError::InvalidInput(format!(
                "unknown aggregation '{other}' (expected product|mean|min)"
            ))),
        }
    }
}

/// Token-probability confidence estimator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenProbConfig {
    /// Floor applied to each token probability to avoid zero-collapse
    #[serde(default = "default_min_prob")]
    pub min_token_prob: f64,

    /// Default aggregation (overridable per call via context)
    #[serde(default)]
    pub aggregation: ProbAggregation,
}

fn default_min_prob() -> f64 {
    0.01
}

impl Default for TokenProbConfig {
    fn default() -> Self {
        Self {
            min_token_prob: default_min_prob(),
            aggregation: ProbAggregation::default(),
        }
    }
}

impl TokenProbConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.min_token_prob.is_finite() || !(0.0..1.0).contains(&self.min_token_prob) {
            return Err(PhronesisError::InvalidConfig(format!(
                "min_token_prob must be in [0, 1), got {}",
                self.min_token_prob
            )));
        }
        Ok(())
    }
}

/// Strategy for combining ensemble member scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineStrategy {
    /// Weighted mean over surviving members (falls back to mean without weights)
    #[default]
    WeightedMean,
    /// Unweighted mean
    Mean,
    /// Majority vote over derived confidence bands, scored at band midpoints
    Voting,
}

/// Ensemble confidence estimator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// Combination strategy
    #[serde(default)]
    pub strategy: CombineStrategy,

    /// Per-member weights; length must match the member count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
}

impl EnsembleConfig {
    /// Validate against the number of ensemble members.
    pub fn validate(&self, member_count: usize) -> Result<()> {
        if member_count == 0 {
            return Err(PhronesisError::InvalidConfig(
                "ensemble needs at least one estimator".to_string(),
            ));
        }
        if let Some(weights) = &self.weights {
            if weights.len() != member_count {
                return Err(PhronesisError::InvalidConfig(format!(
                    "ensemble has {member_count} members but {} weights",
                    weights.len()
                )));
            }
            if weights.iter().any(|w| !w.is_finite() || *w <= 0.0) {
                return Err(PhronesisError::InvalidConfig(
                    "ensemble weights must be finite and positive".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Per-domain keyword extensions for the uncertainty quantifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainPatterns {
    #[serde(default)]
    pub aleatoric: Vec<String>,

    #[serde(default)]
    pub epistemic: Vec<String>,
}

/// Uncertainty quantifier configuration.
///
/// The category multipliers are empirically chosen defaults, not fixed law;
/// tune them per deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UncertaintyConfig {
    /// Subjectivity/ambiguity/preference markers
    #[serde(default = "default_aleatoric_patterns")]
    pub aleatoric_patterns: Vec<String>,

    /// Future-speculation/out-of-domain markers
    #[serde(default = "default_epistemic_patterns")]
    pub epistemic_patterns: Vec<String>,

    /// Minimum matches for a category to qualify
    #[serde(default = "default_min_matches")]
    pub min_matches: usize,

    /// Score multiplier for aleatoric matches
    #[serde(default = "default_multiplier")]
    pub aleatoric_multiplier: f64,

    /// Score multiplier for epistemic matches
    #[serde(default = "default_multiplier")]
    pub epistemic_multiplier: f64,

    /// Pattern-matching timeout in seconds (runs on untrusted text)
    #[serde(default = "default_estimator_timeout")]
    pub timeout_secs: u64,

    /// Per-domain keyword extensions, keyed by domain label
    #[serde(default)]
    pub domain_extensions: HashMap<String, DomainPatterns>,
}

fn default_aleatoric_patterns() -> Vec<String> {
    [
        r"\bbest\b",
        r"\bfavorite\b",
        r"\bshould (i|we|you)\b",
        r"\bbetter\b",
        r"\bworth it\b",
        r"\b(your|my) opinion\b",
        r"\bprefer(red|ence)?\b",
        r"\bdo you think\b",
        r"\bsubjective(ly)?\b",
        r"\bdepends\b",
        r"\bmost beautiful\b",
        r"\boverrated\b",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_epistemic_patterns() -> Vec<String> {
    [
        r"\bwill .{0,40}\b(happen|be|win|become)\b",
        r"\bpredict(ion)?\b",
        r"\bforecast\b",
        r"\bin (20[3-9]\d|21\d\d)\b",
        r"\bnext (year|decade|century)\b",
        r"\bfuture\b",
        r"\bcurrent(ly)? (price|value|standing)\b",
        r"\bas of (today|now)\b",
        r"\blatest\b",
        r"\bunknowable\b",
        r"\bnobody knows\b",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_min_matches() -> usize {
    1
}

fn default_multiplier() -> f64 {
    3.0
}

impl Default for UncertaintyConfig {
    fn default() -> Self {
        Self {
            aleatoric_patterns: default_aleatoric_patterns(),
            epistemic_patterns: default_epistemic_patterns(),
            min_matches: default_min_matches(),
            aleatoric_multiplier: default_multiplier(),
            epistemic_multiplier: default_multiplier(),
            timeout_secs: default_estimator_timeout(),
            domain_extensions: HashMap::new(),
        }
    }
}

impl UncertaintyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.aleatoric_patterns.is_empty() || self.epistemic_patterns.is_empty() {
            return Err(PhronesisError::InvalidConfig(
                "both pattern lists must be non-empty".to_string(),
            ));
        }
        if self.min_matches == 0 {
            return Err(PhronesisError::InvalidConfig(
                "min_matches must be positive".to_string(),
            ));
        }
        for (name, m) in [
            ("aleatoric_multiplier", self.aleatoric_multiplier),
            ("epistemic_multiplier", self.epistemic_multiplier),
        ] {
            if !m.is_finite() || m <= 0.0 {
                return Err(PhronesisError::InvalidConfig(format!(
                    "{name} must be finite and positive, got {m}"
                )));
            }
        }
        if self.timeout_secs == 0 {
            return Err(PhronesisError::InvalidConfig(
                "uncertainty timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Language-model client configuration (OpenAI-compatible endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// API key (can also be set via the env var below)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL for the chat-completions API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model id to use for classification/estimation calls
    #[serde(default = "default_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_client_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries on failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Max tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default)]
    pub temperature: f64,
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_client_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_tokens() -> u32 {
    1024
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_client_timeout(),
            max_retries: default_max_retries(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
        }
    }
}

impl ClientConfig {
    /// Resolve the API key from config or environment.
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = &self.api_key {
            return Ok(expand_env_vars(key));
        }
        std::env::var(&self.api_key_env).map_err(|_| {
            PhronesisError::InvalidConfig(format!(
                "missing API key: set {} or api_key in config",
                self.api_key_env
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() || self.model.is_empty() {
            return Err(PhronesisError::InvalidConfig(
                "client base_url and model must be set".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(PhronesisError::InvalidConfig(
                "client timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Whole-pipeline configuration, loadable from one TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub heuristic: HeuristicConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub controller: ControllerConfig,

    #[serde(default)]
    pub gate: GateConfig,

    #[serde(default)]
    pub selective: SelectiveConfig,

    #[serde(default)]
    pub uncertainty: UncertaintyConfig,

    #[serde(default)]
    pub token_prob: TokenProbConfig,

    #[serde(default)]
    pub ensemble: EnsembleConfig,

    /// Global compute-budget limit for one accounting window
    #[serde(default)]
    pub global_budget_limit: Option<f64>,
}

impl PipelineConfig {
    /// Load configuration from a TOML file.
    ///
    /// B_i(file exists, parses, validates) → Result
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PhronesisError::io(format!("reading config {}", path.display()), e))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| PhronesisError::InvalidConfig(format!("parsing config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.client.validate()?;
        self.heuristic.validate()?;
        self.classifier.validate()?;
        self.controller.validate()?;
        self.gate.validate()?;
        self.selective.validate()?;
        self.uncertainty.validate()?;
        self.token_prob.validate()?;
        if let Some(limit) = self.global_budget_limit {
            if !limit.is_finite() || limit <= 0.0 {
                return Err(PhronesisError::InvalidConfig(format!(
                    "global_budget_limit must be finite and positive, got {limit}"
                )));
            }
        }
        Ok(())
    }
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax. Unset variables leave the placeholder
/// unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static pattern");

    for cap in re.captures_iter(s) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}
