//! Process-wide usage aggregation and budget enforcement.

use std::sync::{Arc, Mutex};

use crate::config::RlmConfig;
use crate::error::{BudgetExceededError, BudgetKind, Result, RlmError};
use crate::types::UsageRecord;

/// Aggregates usage across every agent of one invocation.
///
/// All mutation is serialized behind a mutex so totals stay monotone when
/// agents record usage from interleaved tasks. Getters return snapshots.
#[derive(Debug, Default)]
pub struct UsageTracker {
    totals: Mutex<UsageRecord>,
}

/// A tracker shared by a whole run tree.
pub type SharedUsageTracker = Arc<UsageTracker>;

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one response's usage into the totals.
    pub fn add(&self, usage: &UsageRecord) {
        *self.totals.lock().unwrap() += *usage;
    }

    /// Snapshot of the cumulative usage.
    pub fn total(&self) -> UsageRecord {
        *self.totals.lock().unwrap()
    }

    pub fn total_prompt_tokens(&self) -> u64 {
        self.total().prompt_tokens
    }

    pub fn total_completion_tokens(&self) -> u64 {
        self.total().completion_tokens
    }

    pub fn total_cost(&self) -> f64 {
        self.total().cost
    }

    /// Fail if any global ceiling has been crossed.
    ///
    /// Checks run after each response is recorded, so totals may overshoot a
    /// ceiling by at most one call's worth. Providers that never report cost
    /// leave the cost total at zero, making that ceiling advisory.
    pub fn check_budgets(&self, cfg: &RlmConfig) -> Result<()> {
        let totals = self.total();

        if totals.cost > cfg.max_money_spent {
            return Err(RlmError::BudgetExceeded(BudgetExceededError {
                which: BudgetKind::Cost,
                limit: cfg.max_money_spent,
                actual: totals.cost,
            }));
        }

        if totals.prompt_tokens > cfg.max_prompt_tokens {
            return Err(RlmError::BudgetExceeded(BudgetExceededError {
                which: BudgetKind::PromptTokens,
                limit: cfg.max_prompt_tokens as f64,
                actual: totals.prompt_tokens as f64,
            }));
        }

        if totals.completion_tokens > cfg.max_completion_tokens {
            return Err(RlmError::BudgetExceeded(BudgetExceededError {
                which: BudgetKind::CompletionTokens,
                limit: cfg.max_completion_tokens as f64,
                actual: totals.completion_tokens as f64,
            }));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tracker_is_zero() {
        let tracker = UsageTracker::new();
        assert_eq!(tracker.total(), UsageRecord::default());
        assert_eq!(tracker.total_cost(), 0.0);
    }

    #[test]
    fn test_add_accumulates() {
        let tracker = UsageTracker::new();
        tracker.add(&UsageRecord::tokens(100, 50).with_cost(0.01));
        tracker.add(&UsageRecord::tokens(200, 25).with_cost(0.02));

        assert_eq!(tracker.total_prompt_tokens(), 300);
        assert_eq!(tracker.total_completion_tokens(), 75);
        assert!((tracker.total_cost() - 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_cost_budget_exceeded() {
        let cfg = RlmConfig::new().with_max_money_spent(0.001);
        let tracker = UsageTracker::new();
        tracker.add(&UsageRecord::tokens(10, 10).with_cost(0.01));

        match tracker.check_budgets(&cfg) {
            Err(RlmError::BudgetExceeded(e)) => assert_eq!(e.which, BudgetKind::Cost),
            other => panic!("expected cost budget error, got {:?}", other),
        }
    }

    #[test]
    fn test_prompt_token_budget_exceeded() {
        let cfg = RlmConfig {
            max_prompt_tokens: 100,
            ..Default::default()
        };
        let tracker = UsageTracker::new();
        tracker.add(&UsageRecord::tokens(150, 10));

        match tracker.check_budgets(&cfg) {
            Err(RlmError::BudgetExceeded(e)) => assert_eq!(e.which, BudgetKind::PromptTokens),
            other => panic!("expected prompt token budget error, got {:?}", other),
        }
    }

    #[test]
    fn test_exactly_at_limit_passes() {
        // Ceilings are exclusive: spending the whole budget is allowed,
        // crossing it is not.
        let cfg = RlmConfig {
            max_completion_tokens: 30,
            ..Default::default()
        };
        let tracker = UsageTracker::new();
        tracker.add(&UsageRecord::tokens(0, 30));
        assert!(tracker.check_budgets(&cfg).is_ok());

        tracker.add(&UsageRecord::tokens(0, 1));
        assert!(tracker.check_budgets(&cfg).is_err());
    }

    #[test]
    fn test_missing_cost_is_advisory() {
        let cfg = RlmConfig::new().with_max_money_spent(0.0);
        let tracker = UsageTracker::new();
        tracker.add(&UsageRecord::tokens(1000, 1000));
        assert!(tracker.check_budgets(&cfg).is_ok());
    }
}
