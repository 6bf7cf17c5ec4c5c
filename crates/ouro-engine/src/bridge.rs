//! The recursion bridge between REPL code and the agent loop.
//!
//! `llm_query` runs on the blocking thread that executes REPL code. It hands
//! a sub-query to the async side over a channel and parks until the child
//! agent's terminal value comes back, so from the script's point of view it
//! is an ordinary blocking call that returns a value.

use rhai::Dynamic;
use tokio::sync::{mpsc, oneshot};

/// A pending sub-query raised from inside the REPL.
pub struct SubQueryRequest {
    /// The child agent's user query.
    pub context: String,
    /// Channel the child's terminal value (or error text) is returned on.
    pub reply: oneshot::Sender<std::result::Result<Dynamic, String>>,
}

/// The REPL-side handle installed as `llm_query`.
///
/// Depth gating happens here, before any child exists, so exceeding
/// `max_depth` surfaces as an exception at the offending call site instead
/// of removing the binding.
#[derive(Clone)]
pub struct SubQueryHandle {
    tx: mpsc::UnboundedSender<SubQueryRequest>,
    depth: u32,
    max_depth: u32,
}

impl SubQueryHandle {
    /// Create a handle for an agent at `depth` plus the loop-side receiver.
    pub fn channel(
        depth: u32,
        max_depth: u32,
    ) -> (Self, mpsc::UnboundedReceiver<SubQueryRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                depth,
                max_depth,
            },
            rx,
        )
    }

    /// Spawn a child agent and block until its terminal value is available.
    ///
    /// Must be called from a blocking context; the agent loop services the
    /// paired receiver while the REPL thread is parked here.
    pub fn query(&self, context: &str) -> std::result::Result<Dynamic, String> {
        let child_depth = self.depth + 1;
        if child_depth > self.max_depth {
            return Err(format!(
                "MaxDepthExceeded: llm_query would spawn a sub-agent at depth {} (max_depth = {})",
                child_depth, self.max_depth
            ));
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SubQueryRequest {
                context: context.to_string(),
                reply: reply_tx,
            })
            .map_err(|_| "llm_query bridge is closed".to_string())?;

        reply_rx
            .blocking_recv()
            .map_err(|_| "sub-agent ended without replying".to_string())?
    }
}
