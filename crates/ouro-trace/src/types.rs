//! Event record types for the run log.
//!
//! One agent run emits a totally ordered stream of events; events from
//! concurrent runs may interleave freely in the file. Consumers reassociate
//! records by `run_id` (see [`crate::tree`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// ISO-8601 UTC timestamps with millisecond precision.
///
/// The log format fixes timestamp precision at milliseconds so that a
/// write/read round trip is lossless for parsed records.
pub mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// The four phase timestamps of a single step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTimestamps {
    #[serde(with = "iso_millis")]
    pub llm_call_start: DateTime<Utc>,
    #[serde(with = "iso_millis")]
    pub llm_call_end: DateTime<Utc>,
    #[serde(with = "iso_millis")]
    pub execution_start: DateTime<Utc>,
    #[serde(with = "iso_millis")]
    pub execution_end: DateTime<Utc>,
}

/// One line of the JSONL run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Record severity. Always `"info"` today; part of the stable contract.
    pub level: String,

    /// When the event was emitted.
    #[serde(with = "iso_millis")]
    pub time: DateTime<Utc>,

    /// The run this event belongs to.
    pub run_id: String,

    /// The spawning run, absent on the root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<String>,

    /// Distance from the root agent (root = 0).
    pub depth: u32,

    /// The event body, discriminated by `event_type`.
    #[serde(flatten)]
    pub event: EventPayload,
}

impl EventRecord {
    /// Create a record stamped with the current time.
    pub fn now(
        run_id: impl Into<String>,
        parent_run_id: Option<String>,
        depth: u32,
        event: EventPayload,
    ) -> Self {
        Self {
            level: "info".to_string(),
            time: Utc::now(),
            run_id: run_id.into(),
            parent_run_id,
            depth,
            event,
        }
    }
}

/// Event bodies, one per lifecycle point of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventPayload {
    /// A run has started.
    AgentStart,

    /// The model produced a code block on this step.
    CodeGenerated {
        step: u32,
        code: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reasoning: Option<String>,
        /// Token/cost usage of the LLM call, as reported by the client.
        usage: serde_json::Value,
        timestamps: StepTimestamps,
    },

    /// The step's code block was executed.
    ExecutionResult {
        step: u32,
        /// Full captured output; never truncated in the log.
        output: String,
        has_error: bool,
        timestamps: StepTimestamps,
    },

    /// The run's terminal value, present only on success.
    FinalResult { result: serde_json::Value },

    /// The run has ended, on every terminal path.
    AgentEnd,
}

impl EventPayload {
    /// The `event_type` discriminant as it appears on the wire.
    pub fn event_type(&self) -> &'static str {
        match self {
            EventPayload::AgentStart => "agent_start",
            EventPayload::CodeGenerated { .. } => "code_generated",
            EventPayload::ExecutionResult { .. } => "execution_result",
            EventPayload::FinalResult { .. } => "final_result",
            EventPayload::AgentEnd => "agent_end",
        }
    }
}
