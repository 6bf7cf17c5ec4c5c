//! Error types for the engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, RlmError>;

/// Errors that can terminate an agent or fail an invocation.
#[derive(Debug, Error)]
pub enum RlmError {
    /// Network/HTTP failure while talking to the model endpoint.
    #[error("transport error: {0}")]
    Transport(String),

    /// The model returned no usable content.
    #[error("empty response from model")]
    EmptyResponse,

    /// A global usage ceiling was crossed.
    #[error("budget exceeded: {0}")]
    BudgetExceeded(BudgetExceededError),

    /// The agent made its maximum number of LLM calls without finishing.
    #[error("call limit exceeded after {steps} steps")]
    CallLimitExceeded { steps: u32 },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Event log write failure.
    #[error("log error: {0}")]
    Log(#[from] ouro_trace::WriteError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Details about which budget ceiling was crossed.
#[derive(Debug, Clone)]
pub struct BudgetExceededError {
    /// Which ceiling was crossed.
    pub which: BudgetKind,
    /// The configured ceiling.
    pub limit: f64,
    /// The observed total.
    pub actual: f64,
}

impl std::fmt::Display for BudgetExceededError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} budget exceeded: {} > {}",
            self.which, self.actual, self.limit
        )
    }
}

/// The budget ceilings enforced by the usage tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetKind {
    /// Monetary cost across all calls.
    Cost,
    /// Prompt tokens across all calls.
    PromptTokens,
    /// Completion tokens across all calls.
    CompletionTokens,
}

impl From<reqwest::Error> for RlmError {
    fn from(e: reqwest::Error) -> Self {
        RlmError::Transport(e.to_string())
    }
}
