//! Core types shared across the engine.

use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// The role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in the transcript sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Token counts and cost of one or more LLM responses.
///
/// Additive: field-wise sum with the all-zeros record as identity. Providers
/// that omit `cost` contribute zero to the total.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageRecord {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cached_tokens: u64,
    pub reasoning_tokens: u64,
    pub cost: f64,
}

impl UsageRecord {
    /// A usage record with only prompt/completion counts populated.
    pub fn tokens(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            ..Default::default()
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }
}

impl Add for UsageRecord {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            prompt_tokens: self.prompt_tokens + rhs.prompt_tokens,
            completion_tokens: self.completion_tokens + rhs.completion_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
            cached_tokens: self.cached_tokens + rhs.cached_tokens,
            reasoning_tokens: self.reasoning_tokens + rhs.reasoning_tokens,
            cost: self.cost + rhs.cost,
        }
    }
}

impl AddAssign for UsageRecord {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// One model response as consumed by the agent loop.
#[derive(Debug, Clone)]
pub struct Completion {
    /// The assistant text.
    pub content: String,
    /// Optional reasoning trace, if the provider exposes one.
    pub reasoning: Option<String>,
    /// Usage of this single call.
    pub usage: UsageRecord,
}

impl Completion {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            reasoning: None,
            usage: UsageRecord::tokens(10, 20),
        }
    }

    pub fn with_usage(mut self, usage: UsageRecord) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}
