//! Compute budgeter: maps difficulty to a resource budget and enforces a
//! global spend limit.
//!
//! Epistemic foundation:
//! - K_i: `used_budget` equals the exact sum of allocated costs
//! - K_i: An allocation that would exceed the global limit fails without
//!   mutating state
//! - I^R: Presets and the global limit are caller-configurable
//!
//! The budgeter is an immutable value: every operation returns a new state,
//! so a failed or abandoned sequence can be discarded. There is no internal
//! locking; a caller sharing one budgeter across concurrent tasks must
//! serialize `allocate`/`track_usage` itself (one mutex-guarded owner).

use crate::models::{
    ComputeBudget, DifficultyEstimate, DifficultyLevel, PhronesisError, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Outcome of a pre-flight budget check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetCheck {
    WithinLimit,
    WouldExceedLimit,
}

/// Remaining budget under the global limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemainingBudget {
    /// No global limit configured
    Infinite,
    /// Amount left before the limit
    Amount(f64),
}

/// Usage accounting snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageStats {
    pub used_budget: f64,
    pub allocation_count: u64,
    /// None means no global limit (infinite remaining)
    pub remaining_budget: Option<f64>,
    pub average_cost: f64,
}

/// Budget allocator with per-level presets and a global spend limit.
#[derive(Debug, Clone)]
pub struct Budgeter {
    easy: ComputeBudget,
    medium: ComputeBudget,
    hard: ComputeBudget,
    global_limit: Option<f64>,
    used_budget: f64,
    allocation_count: u64,
    custom: HashMap<String, ComputeBudget>,
}

impl Budgeter {
    /// Budgeter with canonical presets and no global limit.
    pub fn new() -> Self {
        Self {
            easy: ComputeBudget::easy(),
            medium: ComputeBudget::medium(),
            hard: ComputeBudget::hard(),
            global_limit: None,
            used_budget: 0.0,
            allocation_count: 0,
            custom: HashMap::new(),
        }
    }

    /// Budgeter with a global spend limit.
    pub fn with_limit(limit: f64) -> Result<Self> {
        if !limit.is_finite() || limit <= 0.0 {
            return Err(PhronesisError::InvalidConfig(format!(
                "global limit must be finite and positive, got {limit}"
            )));
        }
        let mut budgeter = Self::new();
        budgeter.global_limit = Some(limit);
        Ok(budgeter)
    }

    /// Replace a per-level preset.
    pub fn with_preset(mut self, level: DifficultyLevel, budget: ComputeBudget) -> Self {
        match level {
            DifficultyLevel::Easy => self.easy = budget,
            DifficultyLevel::Medium => self.medium = budget,
            DifficultyLevel::Hard => self.hard = budget,
        }
        self
    }

    /// Register a labeled custom allocation.
    pub fn with_custom(mut self, label: impl Into<String>, budget: ComputeBudget) -> Self {
        self.custom.insert(label.into(), budget);
        self
    }

    pub fn used_budget(&self) -> f64 {
        self.used_budget
    }

    pub fn allocation_count(&self) -> u64 {
        self.allocation_count
    }

    pub fn global_limit(&self) -> Option<f64> {
        self.global_limit
    }

    fn preset(&self, level: DifficultyLevel) -> &ComputeBudget {
        match level {
            DifficultyLevel::Easy => &self.easy,
            DifficultyLevel::Medium => &self.medium,
            DifficultyLevel::Hard => &self.hard,
        }
    }

    /// Check whether a cost would fit under the global limit.
    pub fn check_budget(&self, cost: f64) -> BudgetCheck {
        match self.global_limit {
            Some(limit) if self.used_budget + cost > limit => BudgetCheck::WouldExceedLimit,
            _ => BudgetCheck::WithinLimit,
        }
    }

    /// Remaining budget before the global limit.
    pub fn remaining_budget(&self) -> RemainingBudget {
        match self.global_limit {
            None => RemainingBudget::Infinite,
            Some(limit) => RemainingBudget::Amount((limit - self.used_budget).max(0.0)),
        }
    }

    /// True once the global limit has been fully spent.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.global_limit, Some(limit) if self.used_budget >= limit)
    }

    fn charge(&self, budget: ComputeBudget) -> Result<(ComputeBudget, Self)> {
        if self.check_budget(budget.cost) == BudgetCheck::WouldExceedLimit {
            // Checked above; limit must be present.
            let limit = self.global_limit.unwrap_or(f64::INFINITY);
            return Err(PhronesisError::BudgetExhausted {
                requested: budget.cost,
                limit,
                used: self.used_budget,
            });
        }

        let mut next = self.clone();
        next.used_budget += budget.cost;
        next.allocation_count += 1;

        debug!(
            cost = budget.cost,
            used = next.used_budget,
            allocations = next.allocation_count,
            "Budget allocated"
        );
        Ok((budget, next))
    }

    /// Allocate a budget for an estimated difficulty.
    ///
    /// Returns the budget and the new budgeter state; on `BudgetExhausted`
    /// the current state is untouched.
    pub fn allocate(&self, estimate: &DifficultyEstimate) -> Result<(ComputeBudget, Self)> {
        self.allocate_for_level(estimate.level)
    }

    /// Allocate the preset for a level.
    pub fn allocate_for_level(&self, level: DifficultyLevel) -> Result<(ComputeBudget, Self)> {
        self.charge(self.preset(level).clone())
    }

    /// Allocate a previously registered labeled budget.
    pub fn allocate_labeled(&self, label: &str) -> Result<(ComputeBudget, Self)> {
        let budget = self.custom.get(label).cloned().ok_or_else(|| {
            PhronesisError::InvalidInput(format!("no custom allocation labeled '{label}'"))
        })?;
        self.charge(budget)
    }

    /// Allocate a one-off custom budget.
    pub fn allocate_custom(&self, budget: ComputeBudget) -> Result<(ComputeBudget, Self)> {
        self.charge(budget)
    }

    /// Record additional spend (e.g. actual usage exceeding the allocation).
    ///
    /// Rejects negative or non-finite cost. Does not count as an allocation.
    pub fn track_usage(&self, cost: f64) -> Result<Self> {
        if !cost.is_finite() || cost < 0.0 {
            return Err(PhronesisError::InvalidInput(format!(
                "tracked cost must be finite and non-negative, got {cost}"
            )));
        }
        let mut next = self.clone();
        next.used_budget += cost;
        Ok(next)
    }

    /// Reset accounting, keeping presets, custom allocations, and the limit.
    pub fn reset(&self) -> Self {
        let mut next = self.clone();
        next.used_budget = 0.0;
        next.allocation_count = 0;
        next
    }

    /// Usage accounting snapshot.
    pub fn usage_stats(&self) -> UsageStats {
        let remaining = match self.remaining_budget() {
            RemainingBudget::Infinite => None,
            RemainingBudget::Amount(a) => Some(a),
        };
        let average_cost = if self.allocation_count > 0 {
            self.used_budget / self.allocation_count as f64
        } else {
            0.0
        };
        UsageStats {
            used_budget: self.used_budget,
            allocation_count: self.allocation_count,
            remaining_budget: remaining,
            average_cost,
        }
    }
}

impl Default for Budgeter {
    fn default() -> Self {
        Self::new()
    }
}
