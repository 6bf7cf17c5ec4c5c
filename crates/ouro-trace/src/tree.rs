//! Run-tree reconstruction from a flat event stream.
//!
//! Records are bucketed by `run_id` and linked through `parent_run_id`. A
//! parent id may appear on any record of a run, not necessarily the first
//! seen, so linkage is back-filled as records are folded in.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::types::{EventPayload, EventRecord, StepTimestamps};

/// Summary of one executed step of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSummary {
    pub index: u32,
    pub has_error: bool,
    pub timestamps: StepTimestamps,
}

/// One run reconstructed from the log.
#[derive(Debug, Clone)]
pub struct RunNode {
    pub run_id: String,
    pub parent_run_id: Option<String>,
    pub depth: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepSummary>,
    pub final_result: Option<serde_json::Value>,
    pub children: Vec<String>,
}

impl RunNode {
    fn new(run_id: String, depth: u32) -> Self {
        Self {
            run_id,
            parent_run_id: None,
            depth,
            started_at: None,
            ended_at: None,
            steps: Vec::new(),
            final_result: None,
            children: Vec::new(),
        }
    }

    /// Whether the run produced a terminal value.
    pub fn succeeded(&self) -> bool {
        self.final_result.is_some()
    }
}

/// The reconstructed tree of runs for one invocation.
#[derive(Debug, Default)]
pub struct RunTree {
    runs: BTreeMap<String, RunNode>,
    roots: Vec<String>,
}

impl RunTree {
    /// Fold a flat event stream into a tree.
    pub fn from_events(events: &[EventRecord]) -> Self {
        let mut runs: BTreeMap<String, RunNode> = BTreeMap::new();

        for record in events {
            let node = runs
                .entry(record.run_id.clone())
                .or_insert_with(|| RunNode::new(record.run_id.clone(), record.depth));

            // Back-fill the parent link from whichever record carries it.
            if node.parent_run_id.is_none() {
                node.parent_run_id = record.parent_run_id.clone();
            }

            match &record.event {
                EventPayload::AgentStart => node.started_at = Some(record.time),
                EventPayload::AgentEnd => node.ended_at = Some(record.time),
                EventPayload::ExecutionResult {
                    step,
                    has_error,
                    timestamps,
                    ..
                } => node.steps.push(StepSummary {
                    index: *step,
                    has_error: *has_error,
                    timestamps: timestamps.clone(),
                }),
                EventPayload::FinalResult { result } => {
                    node.final_result = Some(result.clone());
                }
                EventPayload::CodeGenerated { .. } => {}
            }
        }

        let ids: Vec<String> = runs.keys().cloned().collect();
        let mut roots = Vec::new();
        for id in ids {
            let parent = runs.get(&id).and_then(|n| n.parent_run_id.clone());
            match parent {
                Some(parent_id) => {
                    if let Some(parent_node) = runs.get_mut(&parent_id) {
                        parent_node.children.push(id);
                    }
                }
                None => roots.push(id),
            }
        }

        Self { runs, roots }
    }

    /// Look up one run by id.
    pub fn get(&self, run_id: &str) -> Option<&RunNode> {
        self.runs.get(run_id)
    }

    /// Ids of runs with no recorded parent.
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// All runs, in id order.
    pub fn runs(&self) -> impl Iterator<Item = &RunNode> {
        self.runs.values()
    }

    /// Number of runs in the tree.
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Render an indented textual view of the tree, roots first.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for root in &self.roots {
            self.render_node(root, 0, &mut out);
        }
        out
    }

    fn render_node(&self, run_id: &str, indent: usize, out: &mut String) {
        let Some(node) = self.runs.get(run_id) else {
            return;
        };
        let pad = "  ".repeat(indent);
        let status = match &node.final_result {
            Some(value) => format!("final={}", value),
            None => "aborted".to_string(),
        };
        let errors = node.steps.iter().filter(|s| s.has_error).count();
        out.push_str(&format!(
            "{}{} depth={} steps={} errors={} {}\n",
            pad,
            node.run_id,
            node.depth,
            node.steps.len(),
            errors,
            status
        ));
        for child in &node.children {
            self.render_node(child, indent + 1, out);
        }
    }
}
