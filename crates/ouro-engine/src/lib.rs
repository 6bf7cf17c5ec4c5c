//! ouro-engine: recursive language model engine
//!
//! This crate implements an inference-time control loop in which a model
//! works through an arbitrarily long prompt by driving a persistent rhai
//! REPL, and may delegate sub-problems to recursively spawned child agents
//! whose answers come back as in-process values:
//!
//! - Agent loop with per-step event logging and transcript truncation
//! - Per-agent REPL sessions with `FINAL` and `llm_query` builtins
//! - Depth-bounded recursion over a shared usage/budget tracker
//! - OpenAI-compatible chat-completions client, plus a scripted mock

pub mod bridge;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod prompts;
pub mod repl;
pub mod types;
pub mod usage;

pub use bridge::{SubQueryHandle, SubQueryRequest};
pub use client::{LlmClient, MockClient, OpenAiClient, OpenAiConfig, SharedClient};
pub use config::RlmConfig;
pub use engine::{AgentLoop, EngineDeps, Rlm, RunOutcome};
pub use error::{BudgetExceededError, BudgetKind, Result, RlmError};
pub use prompts::NO_CODE_REMINDER;
pub use repl::{ExecOutcome, ReplSession};
pub use types::{ChatMessage, Completion, Role, UsageRecord};
pub use usage::{SharedUsageTracker, UsageTracker};

// The terminal-value type handed back by `run`; re-exported so embedders can
// down-cast results without naming the script engine directly.
pub use rhai::Dynamic;
