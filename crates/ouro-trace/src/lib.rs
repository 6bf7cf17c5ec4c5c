//! Structured run-event logging for recursive agent runs.
//!
//! This crate defines the stable on-disk contract for one engine invocation:
//!
//! - **Types**: [`EventRecord`] with an `event_type`-tagged payload and
//!   millisecond-precision ISO-8601 timestamps
//! - **Writer**: [`EventLog`], an append-only JSONL file flushed per record
//! - **Tree**: [`RunTree`], post-hoc reconstruction of the parent/child run
//!   topology from a flat event stream
//!
//! The writer knows nothing about agents; the engine attaches domain data
//! (usage, code, output) as serializable payloads.

pub mod tree;
pub mod types;
pub mod writer;

pub use tree::{RunNode, RunTree, StepSummary};
pub use types::{EventPayload, EventRecord, StepTimestamps, iso_millis};
pub use writer::{EventLog, WriteError};
