//! End-to-end flows through the public embedding API.
//!
//! These tests drive `Rlm` with a scripted mock client and then verify the
//! written event log against the contracts consumers rely on: event order,
//! step numbering, parent/child timing containment, and shared budgets.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ouro_engine::{
    BudgetKind, Completion, MockClient, Rlm, RlmConfig, RlmError, UsageRecord,
};
use ouro_trace::{EventLog, EventPayload, EventRecord, RunTree};

fn fenced(code: &str) -> Completion {
    Completion::new(format!("```rhai\n{}\n```", code))
}

fn read_log(path: &Path) -> Vec<EventRecord> {
    EventLog::read(path).unwrap()
}

/// The single log file an invocation wrote into `dir`.
fn only_log_file(dir: &Path) -> PathBuf {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    assert_eq!(files.len(), 1, "expected exactly one log file");
    files.pop().unwrap()
}

#[tokio::test]
async fn test_trivial_final() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockClient::new(vec![fenced("FINAL(42);")]));
    let rlm = Rlm::new(client.clone(), RlmConfig::default()).with_log_dir(dir.path());

    let outcome = rlm.run("Just call FINAL(42).").await.unwrap();
    assert_eq!(outcome.results.as_int().unwrap(), 42);
    assert_eq!(client.request_count(), 1);

    let events = read_log(&outcome.log_file);
    let types: Vec<&str> = events.iter().map(|e| e.event.event_type()).collect();
    assert_eq!(
        types,
        vec![
            "agent_start",
            "code_generated",
            "execution_result",
            "final_result",
            "agent_end"
        ]
    );

    // Times are monotone from agent_start through agent_end.
    for pair in events.windows(2) {
        assert!(pair[0].time <= pair[1].time);
    }

    let final_result = events.iter().find_map(|e| match &e.event {
        EventPayload::FinalResult { result } => Some(result.clone()),
        _ => None,
    });
    assert_eq!(final_result, Some(serde_json::json!(42)));
}

#[tokio::test]
async fn test_two_step_compute() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockClient::new(vec![
        fenced("let x = 2 + 2;\nprint(x);"),
        fenced("FINAL(4);"),
    ]));
    let rlm = Rlm::new(client, RlmConfig::default()).with_log_dir(dir.path());

    let outcome = rlm.run("What is 2+2?").await.unwrap();
    assert_eq!(outcome.results.as_int().unwrap(), 4);

    let tree = RunTree::from_events(&read_log(&outcome.log_file));
    let root = tree.get(&tree.roots()[0]).unwrap();
    assert_eq!(root.steps.len(), 2);
    assert!(!root.steps[0].has_error);

    let events = read_log(&outcome.log_file);
    let step0_output = events
        .iter()
        .find_map(|e| match &e.event {
            EventPayload::ExecutionResult { step: 0, output, .. } => Some(output.clone()),
            _ => None,
        })
        .unwrap();
    assert!(step0_output.contains('4'));
}

#[tokio::test]
async fn test_recursion_topology_and_usage() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockClient::new(vec![
        fenced("let sub = llm_query(\"count letters in 'hello'\");\nFINAL(sub);")
            .with_usage(UsageRecord::tokens(100, 40).with_cost(0.002)),
        fenced("FINAL(5);").with_usage(UsageRecord::tokens(30, 10).with_cost(0.001)),
    ]));
    let cfg = RlmConfig::default().with_max_depth(1);
    let rlm = Rlm::new(client, cfg.clone()).with_log_dir(dir.path());

    let outcome = rlm.run("delegate").await.unwrap();
    assert_eq!(outcome.results.as_int().unwrap(), 5);

    // The shared tracker saw both agents' calls.
    assert_eq!(outcome.usage.prompt_tokens, 130);
    assert_eq!(outcome.usage.completion_tokens, 50);
    assert!((outcome.usage.cost - 0.003).abs() < 1e-9);

    let events = read_log(&outcome.log_file);
    let tree = RunTree::from_events(&events);
    assert_eq!(tree.len(), 2);

    // Depth invariant: nobody lives past the cap.
    for run in tree.runs() {
        assert!(run.depth <= cfg.max_depth);
    }

    let root = tree.get(&tree.roots()[0]).unwrap();
    let child = tree.get(&root.children[0]).unwrap();
    assert_eq!(child.depth, 1);
    assert_eq!(child.final_result, Some(serde_json::json!(5)));

    // Child lifetime is contained in the spawning step's execution window.
    let window = &root.steps[0].timestamps;
    assert!(window.execution_start <= child.started_at.unwrap());
    assert!(child.ended_at.unwrap() <= window.execution_end);

    // The logged per-step usage sums to the invocation total.
    let mut summed = UsageRecord::default();
    for event in &events {
        if let EventPayload::CodeGenerated { usage, .. } = &event.event {
            let step_usage: UsageRecord = serde_json::from_value(usage.clone()).unwrap();
            summed += step_usage;
        }
    }
    assert_eq!(summed, outcome.usage);
}

#[tokio::test]
async fn test_sibling_fanout_is_sequential() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockClient::new(vec![
        fenced(
            "let a = llm_query(\"first part\");\n\
             let b = llm_query(\"second part\");\n\
             FINAL(a + b);",
        ),
        fenced("FINAL(1);"),
        fenced("FINAL(2);"),
    ]));
    let rlm = Rlm::new(client, RlmConfig::default().with_max_depth(1)).with_log_dir(dir.path());

    let outcome = rlm.run("split the work").await.unwrap();
    assert_eq!(outcome.results.as_int().unwrap(), 3);

    let tree = RunTree::from_events(&read_log(&outcome.log_file));
    let root = tree.get(&tree.roots()[0]).unwrap();
    assert_eq!(root.children.len(), 2);

    // Children are keyed by id, so order them by start time.
    let mut children: Vec<_> = root
        .children
        .iter()
        .map(|id| tree.get(id).unwrap())
        .collect();
    children.sort_by_key(|c| c.started_at.unwrap());
    let (first, second) = (children[0], children[1]);
    assert!(first.ended_at.unwrap() <= second.started_at.unwrap());

    let window = &root.steps[0].timestamps;
    for child in [first, second] {
        assert!(window.execution_start <= child.started_at.unwrap());
        assert!(child.ended_at.unwrap() <= window.execution_end);
    }
}

#[tokio::test]
async fn test_shared_budget_aborts_child_then_parent() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockClient::new(vec![
        // Parent spawns a child, spending a little.
        fenced("let sub = llm_query(\"expensive question\");\nprint(sub);")
            .with_usage(UsageRecord::tokens(10, 10).with_cost(0.001)),
        // The child's one call blows the cost ceiling; it aborts before
        // executing anything.
        fenced("FINAL(\"unreachable\");").with_usage(UsageRecord::tokens(10, 10).with_cost(0.01)),
        // The parent recovers from the raised error, but its next call hits
        // the same shared ceiling.
        fenced("FINAL(\"also unreachable\");").with_usage(UsageRecord::tokens(1, 1)),
    ]));
    let cfg = RlmConfig::default()
        .with_max_depth(1)
        .with_max_money_spent(0.005);
    let rlm = Rlm::new(client, cfg).with_log_dir(dir.path());

    let err = rlm.run("q").await.unwrap_err();
    match err {
        RlmError::BudgetExceeded(e) => assert_eq!(e.which, BudgetKind::Cost),
        other => panic!("expected budget error, got {:?}", other),
    }

    let events = read_log(&only_log_file(dir.path()));
    let tree = RunTree::from_events(&events);
    assert_eq!(tree.len(), 2);

    // Both runs closed; neither produced a final result.
    for run in tree.runs() {
        assert!(run.ended_at.is_some());
        assert!(run.final_result.is_none());
    }

    // The parent saw the child's abort as an in-REPL error on its one step.
    let root = tree.get(&tree.roots()[0]).unwrap();
    assert_eq!(root.steps.len(), 1);
    assert!(root.steps[0].has_error);
}

#[tokio::test]
async fn test_call_limit_closes_run_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockClient::new(vec![
        fenced("print(\"one\");"),
        fenced("print(\"two\");"),
    ]));
    let cfg = RlmConfig::default().with_max_calls_per_subagent(2);
    let rlm = Rlm::new(client, cfg).with_log_dir(dir.path());

    let err = rlm.run("q").await.unwrap_err();
    assert!(matches!(err, RlmError::CallLimitExceeded { steps: 2 }));

    let events = read_log(&only_log_file(dir.path()));
    let code_steps: Vec<u32> = events
        .iter()
        .filter_map(|e| match &e.event {
            EventPayload::CodeGenerated { step, .. } => Some(*step),
            _ => None,
        })
        .collect();
    assert_eq!(code_steps, vec![0, 1]);
    assert_eq!(events.last().unwrap().event, EventPayload::AgentEnd);

    // Each step logged exactly one code_generated and one execution_result,
    // in that order.
    let per_step: Vec<&str> = events
        .iter()
        .filter(|e| {
            matches!(
                e.event,
                EventPayload::CodeGenerated { .. } | EventPayload::ExecutionResult { .. }
            )
        })
        .map(|e| e.event.event_type())
        .collect();
    assert_eq!(
        per_step,
        vec![
            "code_generated",
            "execution_result",
            "code_generated",
            "execution_result"
        ]
    );
}

#[tokio::test]
async fn test_final_unit_is_a_result() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockClient::new(vec![fenced("FINAL(());")]));
    let rlm = Rlm::new(client, RlmConfig::default()).with_log_dir(dir.path());

    let outcome = rlm.run("return nothing").await.unwrap();
    assert!(outcome.results.is_unit());

    // A unit FINAL still produces a final_result event.
    let events = read_log(&outcome.log_file);
    assert!(events
        .iter()
        .any(|e| matches!(e.event, EventPayload::FinalResult { .. })));
}

#[tokio::test]
async fn test_log_reparse_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockClient::new(vec![
        fenced("let sub = llm_query(\"part\");\nFINAL(sub);"),
        fenced("FINAL(\"leaf\");"),
    ]));
    let rlm = Rlm::new(client, RlmConfig::default().with_max_depth(1)).with_log_dir(dir.path());
    let outcome = rlm.run("q").await.unwrap();

    let first = read_log(&outcome.log_file);

    let copy_path = dir.path().join("copy.jsonl");
    let copy = EventLog::create(&copy_path).unwrap();
    for record in &first {
        copy.append(record).unwrap();
    }
    let second = EventLog::read(&copy_path).unwrap();

    assert_eq!(first, second);
}
