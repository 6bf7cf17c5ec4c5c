//! Per-agent REPL substrate.
//!
//! Each agent owns one `ReplSession`: a rhai engine plus a scope that
//! persists across every step of the run. `print`/`debug` output and any
//! evaluation error are captured into a single output string per execution.
//! `FINAL(value)` stores its argument in a terminal slot without disturbing
//! control flow; the loop inspects the slot after each execution.

use std::sync::{Arc, Mutex};

use rhai::{Dynamic, Engine, EvalAltResult, Scope};

use crate::bridge::SubQueryHandle;

/// Result of executing one snippet.
#[derive(Debug)]
pub struct ExecOutcome {
    /// Everything the snippet printed, plus a formatted error if it raised.
    pub output: String,
    /// Whether evaluation ended in an uncaught error.
    pub has_error: bool,
    /// The `FINAL` value, if this execution set one.
    pub terminal: Option<Dynamic>,
}

/// A persistent code-execution environment scoped to one agent.
pub struct ReplSession {
    engine: Engine,
    scope: Scope<'static>,
    sink: Arc<Mutex<String>>,
    terminal: Arc<Mutex<Option<Dynamic>>>,
}

impl ReplSession {
    /// Build a session with `FINAL` and `llm_query` installed.
    pub fn new(bridge: SubQueryHandle) -> Self {
        let mut engine = Engine::new();
        let sink = Arc::new(Mutex::new(String::new()));
        let terminal: Arc<Mutex<Option<Dynamic>>> = Arc::new(Mutex::new(None));

        {
            let sink = sink.clone();
            engine.on_print(move |text| {
                let mut buffer = sink.lock().unwrap();
                buffer.push_str(text);
                buffer.push('\n');
            });
        }
        {
            let sink = sink.clone();
            engine.on_debug(move |text, _source, pos| {
                let mut buffer = sink.lock().unwrap();
                buffer.push_str(&format!("[debug {}] {}", pos, text));
                buffer.push('\n');
            });
        }
        {
            let terminal = terminal.clone();
            engine.register_fn("FINAL", move |value: Dynamic| {
                *terminal.lock().unwrap() = Some(value);
            });
        }
        engine.register_fn(
            "llm_query",
            move |context: &str| -> Result<Dynamic, Box<EvalAltResult>> {
                bridge.query(context).map_err(|message| message.into())
            },
        );

        Self {
            engine,
            scope: Scope::new(),
            sink,
            terminal,
        }
    }

    /// Seed a global visible to every subsequent execution.
    pub fn install_binding(&mut self, name: impl Into<String>, value: Dynamic) {
        self.scope.push_dynamic(name.into(), value);
    }

    /// Host access to the engine, for registering extra tool functions.
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Run one snippet against the persistent scope.
    ///
    /// Variables the snippet defines survive into later executions. The
    /// terminal slot is drained on every call, so a `FINAL` from an earlier
    /// execution cannot leak into this one's outcome.
    pub fn execute(&mut self, source: &str) -> ExecOutcome {
        self.sink.lock().unwrap().clear();
        *self.terminal.lock().unwrap() = None;

        let result = self.engine.run_with_scope(&mut self.scope, source);

        let mut output = std::mem::take(&mut *self.sink.lock().unwrap());
        let has_error = result.is_err();
        if let Err(error) = result {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&format!("error: {}", error));
        }

        let terminal = self.terminal.lock().unwrap().take();
        ExecOutcome {
            output,
            has_error,
            terminal,
        }
    }
}
