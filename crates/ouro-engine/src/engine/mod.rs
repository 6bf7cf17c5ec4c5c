//! The agent loop and the embedding entry point.
//!
//! An agent is one [`AgentLoop`] bound to one REPL session and one model id.
//! Each step calls the model with the accumulated transcript, executes the
//! last fenced `rhai` block of the reply, and feeds truncated output back as
//! the next user message, until the session's terminal slot is set or a
//! limit aborts the run.


use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use rhai::Dynamic;
use tokio::sync::mpsc;

use ouro_trace::{EventLog, EventPayload, EventRecord, StepTimestamps};

use crate::bridge::{SubQueryHandle, SubQueryRequest};
use crate::client::SharedClient;
use crate::config::RlmConfig;
use crate::error::{Result, RlmError};
use crate::prompts;
use crate::repl::{ExecOutcome, ReplSession};
use crate::types::{ChatMessage, UsageRecord};
use crate::usage::{SharedUsageTracker, UsageTracker};

/// Shared handles passed down the run tree.
///
/// Children receive clones of these instead of a reference to their parent;
/// the only parent linkage is the `parent_run_id` carried in log records.
#[derive(Clone)]
pub struct EngineDeps {
    pub client: SharedClient,
    pub tracker: SharedUsageTracker,
    pub log: Arc<EventLog>,
    /// Host-provided globals installed into every REPL session.
    pub bindings: Arc<Vec<(String, Dynamic)>>,
}

impl EngineDeps {
    pub fn new(client: SharedClient, tracker: SharedUsageTracker, log: Arc<EventLog>) -> Self {
        Self {
            client,
            tracker,
            log,
            bindings: Arc::new(Vec::new()),
        }
    }
}

/// One lifetime of an agent.
pub struct AgentLoop {
    run_id: String,
    parent_run_id: Option<String>,
    depth: u32,
    model: String,
    cfg: Arc<RlmConfig>,
    deps: EngineDeps,
    transcript: Vec<ChatMessage>,
    session: Option<ReplSession>,
    bridge_rx: mpsc::UnboundedReceiver<SubQueryRequest>,
    /// Log index of the next code-bearing turn; contiguous from 0.
    step: u32,
    /// LLM calls made, code-bearing or not; bounds the loop.
    calls: u32,
}

impl AgentLoop {
    /// Create the root agent for a user query.
    pub fn root(query: impl Into<String>, cfg: Arc<RlmConfig>, deps: EngineDeps) -> Self {
        Self::spawn(None, 0, query.into(), cfg, deps)
    }

    fn spawn(
        parent_run_id: Option<String>,
        depth: u32,
        query: String,
        cfg: Arc<RlmConfig>,
        deps: EngineDeps,
    ) -> Self {
        let run_id = uuid::Uuid::new_v4().to_string();
        let model = if depth == 0 {
            cfg.primary_model.clone()
        } else {
            cfg.sub_model.clone()
        };

        let (bridge, bridge_rx) = SubQueryHandle::channel(depth, cfg.max_depth);
        let mut session = ReplSession::new(bridge);
        session.install_binding("context", Dynamic::from(query.clone()));
        for (name, value) in deps.bindings.iter() {
            session.install_binding(name.clone(), value.clone());
        }

        let transcript = vec![
            ChatMessage::system(prompts::system_prompt(depth, cfg.max_depth, cfg.truncate_len)),
            ChatMessage::user(query),
        ];

        Self {
            run_id,
            parent_run_id,
            depth,
            model,
            cfg,
            deps,
            transcript,
            session: Some(session),
            bridge_rx,
            step: 0,
            calls: 0,
        }
    }

    /// The unique id of this run.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Drive the agent to a terminal state and return its `FINAL` value.
    ///
    /// `agent_start` and `agent_end` bracket every run, on success and on
    /// every abortive path alike.
    pub fn run(mut self) -> BoxFuture<'static, Result<Dynamic>> {
        Box::pin(async move {
            tracing::debug!(run_id = %self.run_id, depth = self.depth, model = %self.model, "agent started");
            self.emit(EventPayload::AgentStart)?;

            let result = self.drive().await;
            if let Err(error) = &result {
                tracing::warn!(run_id = %self.run_id, depth = self.depth, %error, "agent aborted");
            }

            self.emit(EventPayload::AgentEnd)?;
            result
        })
    }

    async fn drive(&mut self) -> Result<Dynamic> {
        loop {
            let llm_call_start = Utc::now();
            let completion = self
                .deps
                .client
                .generate(&self.transcript, &self.model)
                .await?;
            let llm_call_end = Utc::now();

            self.deps.tracker.add(&completion.usage);
            self.deps.tracker.check_budgets(&self.cfg)?;

            self.transcript
                .push(ChatMessage::assistant(completion.content.clone()));

            let Some(code) = extract_last_code_block(&completion.content) else {
                tracing::debug!(run_id = %self.run_id, call = self.calls, "no code block in reply");
                self.transcript
                    .push(ChatMessage::user(prompts::NO_CODE_REMINDER));
                self.record_call()?;
                continue;
            };

            let execution_start = Utc::now();
            let outcome = self.execute(code.clone()).await?;
            let execution_end = Utc::now();

            let timestamps = StepTimestamps {
                llm_call_start,
                llm_call_end,
                execution_start,
                execution_end,
            };

            self.emit(EventPayload::CodeGenerated {
                step: self.step,
                code,
                reasoning: completion.reasoning.clone(),
                usage: usage_to_json(&completion.usage),
                timestamps: timestamps.clone(),
            })?;
            self.emit(EventPayload::ExecutionResult {
                step: self.step,
                output: outcome.output.clone(),
                has_error: outcome.has_error,
                timestamps,
            })?;

            if let Some(value) = outcome.terminal {
                tracing::debug!(run_id = %self.run_id, step = self.step, "terminal value produced");
                self.emit(EventPayload::FinalResult {
                    result: dynamic_to_json(&value),
                })?;
                return Ok(value);
            }

            self.transcript.push(ChatMessage::user(truncate_output(
                &outcome.output,
                self.cfg.truncate_len,
            )));
            self.step += 1;
            self.record_call()?;
        }
    }

    /// Count one LLM call against the per-agent limit.
    ///
    /// Reminder turns without code count too; the logged step index does
    /// not, so step numbering stays contiguous from 0.
    fn record_call(&mut self) -> Result<()> {
        self.calls += 1;
        if self.calls >= self.cfg.max_calls_per_subagent {
            return Err(RlmError::CallLimitExceeded { steps: self.calls });
        }
        Ok(())
    }

    /// Run one snippet on a blocking thread while servicing sub-queries.
    ///
    /// `llm_query` parks the REPL thread until the child agent driven here
    /// completes, so a child's whole lifetime falls inside this step's
    /// execution window.
    async fn execute(&mut self, code: String) -> Result<ExecOutcome> {
        let mut session = self
            .session
            .take()
            .ok_or_else(|| RlmError::Internal("REPL session missing".to_string()))?;

        let mut task = tokio::task::spawn_blocking(move || {
            let outcome = session.execute(&code);
            (session, outcome)
        });

        let run_id = self.run_id.clone();
        let depth = self.depth;
        let cfg = self.cfg.clone();
        let deps = self.deps.clone();
        let bridge_rx = &mut self.bridge_rx;

        let (session, outcome) = loop {
            tokio::select! {
                joined = &mut task => {
                    break joined.map_err(|e| {
                        RlmError::Internal(format!("REPL execution task failed: {}", e))
                    })?;
                }
                Some(request) = bridge_rx.recv() => {
                    let child = AgentLoop::spawn(
                        Some(run_id.clone()),
                        depth + 1,
                        request.context,
                        cfg.clone(),
                        deps.clone(),
                    );
                    tracing::debug!(parent = %run_id, child = %child.run_id, "sub-agent spawned");
                    let reply = child.run().await.map_err(|e| e.to_string());
                    let _ = request.reply.send(reply);
                }
            }
        };

        self.session = Some(session);
        Ok(outcome)
    }

    fn emit(&self, event: EventPayload) -> Result<()> {
        self.deps.log.append(&EventRecord::now(
            self.run_id.clone(),
            self.parent_run_id.clone(),
            self.depth,
            event,
        ))?;
        Ok(())
    }
}

/// The embedding entry point: one `Rlm` value per configured host.
pub struct Rlm {
    client: SharedClient,
    cfg: Arc<RlmConfig>,
    log_dir: PathBuf,
    bindings: Vec<(String, Dynamic)>,
}

/// What a finished invocation hands back to the host.
#[derive(Debug)]
pub struct RunOutcome {
    /// The root agent's terminal value, live and untouched.
    pub results: Dynamic,
    /// Path of the JSONL event log for this invocation.
    pub log_file: PathBuf,
    /// Cumulative usage across the whole run tree.
    pub usage: UsageRecord,
}

impl Rlm {
    pub fn new(client: SharedClient, cfg: RlmConfig) -> Self {
        Self {
            client,
            cfg: Arc::new(cfg),
            log_dir: PathBuf::from(".ouro/runs"),
            bindings: Vec::new(),
        }
    }

    /// Build a client from environment credentials.
    pub fn from_env(cfg: RlmConfig) -> Result<Self> {
        let client = crate::client::OpenAiClient::from_env()?;
        Ok(Self::new(Arc::new(client), cfg))
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    /// Seed a global into every agent's REPL.
    pub fn with_binding(mut self, name: impl Into<String>, value: Dynamic) -> Self {
        self.bindings.push((name.into(), value));
        self
    }

    /// Run a root agent on `query`.
    pub async fn run(&self, query: &str) -> Result<RunOutcome> {
        self.run_with_prefix(query, None).await
    }

    /// Run a root agent, naming the log file with an optional prefix.
    pub async fn run_with_prefix(&self, query: &str, prefix: Option<&str>) -> Result<RunOutcome> {
        self.cfg.validate()?;

        let log_file = self.log_dir.join(log_file_name(prefix));
        let log = Arc::new(EventLog::create(&log_file)?);
        let tracker: SharedUsageTracker = Arc::new(UsageTracker::new());

        let mut deps = EngineDeps::new(self.client.clone(), tracker.clone(), log);
        deps.bindings = Arc::new(self.bindings.clone());

        tracing::debug!(log_file = %log_file.display(), "invocation started");
        let root = AgentLoop::root(query, self.cfg.clone(), deps);
        let results = root.run().await?;

        Ok(RunOutcome {
            results,
            log_file,
            usage: tracker.total(),
        })
    }
}

/// `{prefix_}{timestamp}_{short-uuid}.jsonl`
fn log_file_name(prefix: Option<&str>) -> String {
    let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S");
    let short = uuid::Uuid::new_v4().to_string();
    let prefix = prefix.map(|p| format!("{}_", p)).unwrap_or_default();
    format!("{}{}_{}.jsonl", prefix, stamp, &short[..8])
}

/// Extract the last fenced code block labelled as the REPL language.
///
/// Last block wins; earlier blocks are ignored. `repl` is accepted as a
/// label alias.
pub(crate) fn extract_last_code_block(content: &str) -> Option<String> {
    let re = regex::Regex::new(r"(?s)```(?:rhai|repl)[ \t]*\n(.*?)```").ok()?;
    re.captures_iter(content)
        .last()
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|code| !code.is_empty())
}

/// Cap output at `limit` characters, keeping a head and tail around an
/// elision marker. Applied only to the transcript; the log keeps everything.
pub(crate) fn truncate_output(output: &str, limit: usize) -> String {
    let total = output.chars().count();
    if total <= limit {
        return output.to_string();
    }
    let head_len = limit / 2;
    let tail_len = limit - head_len;
    let head: String = output.chars().take(head_len).collect();
    let tail: String = output.chars().skip(total - tail_len).collect();
    format!(
        "{}\n... [{} chars elided] ...\n{}",
        head,
        total - limit,
        tail
    )
}

fn usage_to_json(usage: &UsageRecord) -> serde_json::Value {
    serde_json::to_value(usage).unwrap_or(serde_json::Value::Null)
}

/// Convert a terminal value to JSON for the log, falling back to its
/// display form for types serde cannot represent.
fn dynamic_to_json(value: &Dynamic) -> serde_json::Value {
    rhai::serde::from_dynamic::<serde_json::Value>(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()))
}
