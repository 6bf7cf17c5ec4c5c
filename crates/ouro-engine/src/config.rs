//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RlmError};

/// Static configuration for one engine invocation.
///
/// A passive record: the host assembles it (defaults merged with overrides)
/// and hands it to the engine. Validation is limited to non-negative bounds
/// and non-empty model ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RlmConfig {
    /// Model used by the root agent.
    pub primary_model: String,
    /// Model used by all descendant agents.
    pub sub_model: String,
    /// Maximum depth at which an agent may exist (root = 0).
    pub max_depth: u32,
    /// Maximum LLM calls per agent before `CallLimitExceeded`.
    pub max_calls_per_subagent: u32,
    /// Character cap applied to execution output before it enters the
    /// transcript. The log always keeps the full output.
    pub truncate_len: usize,
    /// Global cost ceiling in account currency.
    pub max_money_spent: f64,
    /// Global completion-token ceiling.
    pub max_completion_tokens: u64,
    /// Global prompt-token ceiling.
    pub max_prompt_tokens: u64,
}

impl Default for RlmConfig {
    fn default() -> Self {
        Self {
            primary_model: "gpt-4o".to_string(),
            sub_model: "gpt-4o-mini".to_string(),
            max_depth: 1,
            max_calls_per_subagent: 20,
            truncate_len: 4096,
            max_money_spent: 10.0,
            max_completion_tokens: 500_000,
            max_prompt_tokens: 5_000_000,
        }
    }
}

impl RlmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_primary_model(mut self, model: impl Into<String>) -> Self {
        self.primary_model = model.into();
        self
    }

    pub fn with_sub_model(mut self, model: impl Into<String>) -> Self {
        self.sub_model = model.into();
        self
    }

    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_max_calls_per_subagent(mut self, calls: u32) -> Self {
        self.max_calls_per_subagent = calls;
        self
    }

    pub fn with_truncate_len(mut self, len: usize) -> Self {
        self.truncate_len = len;
        self
    }

    pub fn with_max_money_spent(mut self, ceiling: f64) -> Self {
        self.max_money_spent = ceiling;
        self
    }

    /// Check the record for values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.primary_model.is_empty() {
            return Err(RlmError::Config("primary_model cannot be empty".to_string()));
        }
        if self.sub_model.is_empty() {
            return Err(RlmError::Config("sub_model cannot be empty".to_string()));
        }
        if self.max_calls_per_subagent == 0 {
            return Err(RlmError::Config(
                "max_calls_per_subagent must be at least 1".to_string(),
            ));
        }
        if self.max_money_spent < 0.0 {
            return Err(RlmError::Config(
                "max_money_spent cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}
