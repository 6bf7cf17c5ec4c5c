//! LLM client trait and implementations.
//!
//! The engine depends only on `generate(messages, model) -> Completion`.
//! `OpenAiClient` speaks the OpenAI-compatible chat-completions schema;
//! `MockClient` returns scripted replies for deterministic tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RlmError};
use crate::types::{ChatMessage, Completion, UsageRecord};

/// Default timeout for a single completion request.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default OpenAI-compatible API base.
const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Trait for LLM transport providers.
///
/// The client does not retry; retry policy belongs to callers, and the agent
/// loop deliberately has none.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Execute one chat completion and return content, reasoning, and usage.
    async fn generate(&self, messages: &[ChatMessage], model: &str) -> Result<Completion>;

    /// Name of this client, for diagnostics.
    fn name(&self) -> &str;
}

/// A client that can be shared across the run tree.
pub type SharedClient = Arc<dyn LlmClient>;

/// Configuration for the OpenAI-compatible client.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key for bearer authentication.
    pub api_key: String,
    /// Base URL up to and including the version segment.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Read key and base URL from the environment.
    ///
    /// `OURO_API_KEY` takes precedence over `OPENAI_API_KEY`; a missing key
    /// is a fatal initialization error. `OURO_BASE_URL`/`OPENAI_BASE_URL`
    /// override the default endpoint.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OURO_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .map_err(|_| {
                RlmError::Config(
                    "no API key: set OURO_API_KEY or OPENAI_API_KEY".to_string(),
                )
            })?;
        let mut config = Self::new(api_key);
        if let Ok(url) = std::env::var("OURO_BASE_URL").or_else(|_| std::env::var("OPENAI_BASE_URL"))
        {
            config.base_url = url;
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiClient {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RlmError::Internal(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(OpenAiConfig::from_env()?)
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, messages: &[ChatMessage], model: &str) -> Result<Completion> {
        let request = WireRequest { model, messages };

        let response = self
            .client
            .post(self.completions_url())
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.config.api_key),
            )
            .header(header::CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RlmError::Transport(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(500).collect::<String>()
            )));
        }

        let parsed: WireResponse = response.json().await?;
        let choice = parsed.choices.into_iter().next().ok_or(RlmError::EmptyResponse)?;

        // A reasoning trace with no content is still an empty response.
        let content = choice.message.content.unwrap_or_default();
        if content.is_empty() {
            return Err(RlmError::EmptyResponse);
        }

        let usage = parsed.usage.map(WireUsage::into_record).unwrap_or_default();
        tracing::debug!(
            model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "completion received"
        );

        Ok(Completion {
            content,
            reasoning: choice.message.reasoning.filter(|r| !r.is_empty()),
            usage,
        })
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    content: Option<String>,
    /// Reasoning trace as exposed by OpenRouter-style providers.
    reasoning: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
    /// Monetary cost; most providers omit this.
    cost: Option<f64>,
    prompt_tokens_details: Option<PromptTokensDetails>,
    completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: u64,
}

#[derive(Deserialize)]
struct CompletionTokensDetails {
    #[serde(default)]
    reasoning_tokens: u64,
}

impl WireUsage {
    fn into_record(self) -> UsageRecord {
        UsageRecord {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: if self.total_tokens > 0 {
                self.total_tokens
            } else {
                self.prompt_tokens + self.completion_tokens
            },
            cached_tokens: self
                .prompt_tokens_details
                .map(|d| d.cached_tokens)
                .unwrap_or(0),
            reasoning_tokens: self
                .completion_tokens_details
                .map(|d| d.reasoning_tokens)
                .unwrap_or(0),
            cost: self.cost.unwrap_or(0.0),
        }
    }
}

/// A mock client for testing.
///
/// Replies are returned in order regardless of model id; requesting past the
/// end of the script is a transport error. Every request's transcript is
/// recorded for inspection.
#[derive(Default)]
pub struct MockClient {
    replies: Mutex<VecDeque<Result<Completion>>>,
    requests: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

impl MockClient {
    /// Create a mock with the given scripted replies.
    pub fn new(replies: Vec<Completion>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock whose replies are plain assistant texts.
    pub fn with_replies(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Completion::new(*t)).collect())
    }

    /// Queue an error reply after the scripted completions.
    pub fn push_error(&self, error: RlmError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    /// Queue another completion after the scripted replies.
    pub fn push_reply(&self, completion: Completion) {
        self.replies.lock().unwrap().push_back(Ok(completion));
    }

    /// Number of requests made so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// All recorded `(model, transcript)` pairs.
    pub fn requests(&self) -> Vec<(String, Vec<ChatMessage>)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for MockClient {
    async fn generate(&self, messages: &[ChatMessage], model: &str) -> Result<Completion> {
        self.requests
            .lock()
            .unwrap()
            .push((model.to_string(), messages.to_vec()));

        match self.replies.lock().unwrap().pop_front() {
            Some(reply) => reply,
            None => Err(RlmError::Transport(
                "MockClient: no more scripted replies".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[tokio::test]
    async fn test_mock_client_in_order() {
        let client = MockClient::with_replies(&["first", "second"]);

        let r1 = client
            .generate(&[ChatMessage::user("a")], "m")
            .await
            .unwrap();
        let r2 = client
            .generate(&[ChatMessage::user("b")], "m")
            .await
            .unwrap();

        assert_eq!(r1.content, "first");
        assert_eq!(r2.content, "second");
        assert_eq!(client.request_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_client_exhausted() {
        let client = MockClient::with_replies(&[]);
        let result = client.generate(&[ChatMessage::user("a")], "m").await;
        assert!(matches!(result, Err(RlmError::Transport(_))));
    }

    #[tokio::test]
    async fn test_mock_client_records_transcripts() {
        let client = MockClient::with_replies(&["ok"]);
        client
            .generate(
                &[ChatMessage::system("sys"), ChatMessage::user("query")],
                "model-x",
            )
            .await
            .unwrap();

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "model-x");
        assert_eq!(requests[0].1[0].role, Role::System);
        assert_eq!(requests[0].1[1].content, "query");
    }

    #[test]
    fn test_wire_usage_into_record() {
        let raw = r#"{
            "prompt_tokens": 120,
            "completion_tokens": 30,
            "total_tokens": 150,
            "cost": 0.0042,
            "prompt_tokens_details": {"cached_tokens": 100},
            "completion_tokens_details": {"reasoning_tokens": 12}
        }"#;
        let usage: WireUsage = serde_json::from_str(raw).unwrap();
        let record = usage.into_record();
        assert_eq!(record.prompt_tokens, 120);
        assert_eq!(record.total_tokens, 150);
        assert_eq!(record.cached_tokens, 100);
        assert_eq!(record.reasoning_tokens, 12);
        assert!((record.cost - 0.0042).abs() < 1e-9);
    }

    #[test]
    fn test_wire_usage_missing_cost_defaults_to_zero() {
        let usage: WireUsage =
            serde_json::from_str(r#"{"prompt_tokens": 5, "completion_tokens": 5}"#).unwrap();
        let record = usage.into_record();
        assert_eq!(record.cost, 0.0);
        assert_eq!(record.total_tokens, 10);
    }

    #[test]
    fn test_completions_url_trims_trailing_slash() {
        let client = OpenAiClient::new(
            OpenAiConfig::new("key").with_base_url("https://example.test/v1/"),
        )
        .unwrap();
        assert_eq!(
            client.completions_url(),
            "https://example.test/v1/chat/completions"
        );
    }
}
