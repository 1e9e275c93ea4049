use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, mpsc};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::io::sink::{ErrorSink, NoopSink, save_best_effort};

use super::budget::{BudgetConfig, BudgetManager, Reservation};
use super::error::{LlmError, Usage};
use super::retry::{Backoff, RetryConfig};
use super::salvage::salvage_json;

/// One chat message
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Plain completion: text plus token usage
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
}

/// Schema-constrained completion. `value` is the structured tool input when
/// the backend honored the schema; `raw_text` holds whatever text came back
/// alongside (or instead of) it.
#[derive(Debug, Clone)]
pub struct SchemaCompletion {
    pub value: Option<serde_json::Value>,
    pub raw_text: String,
    pub usage: Usage,
}

/// A named JSON schema the backend is forced to emit
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub schema: serde_json::Value,
}

/// A generative chat backend. Methods return `impl Future + Send` so callers
/// can drive them from spawned tasks regardless of the concrete backend.
pub trait ChatBackend: Send + Sync {
    /// Plain text generation
    fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> impl Future<Output = Result<Completion, LlmError>> + Send;

    /// Schema-constrained generation
    fn complete_with_schema(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tool: &ToolSpec,
    ) -> impl Future<Output = Result<SchemaCompletion, LlmError>> + Send;

    /// Open a streaming completion; deltas arrive on the returned channel.
    /// A mid-stream failure surfaces as an `Err` item and closes the channel.
    fn stream(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> impl Future<Output = Result<mpsc::Receiver<Result<String, LlmError>>, LlmError>> + Send;

    /// Token count for a prospective call; `None` when the backend cannot say
    fn count_tokens(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> impl Future<Output = Result<Option<u64>, LlmError>> + Send;
}

/// Configuration for the Anthropic API backend
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key (from ANTHROPIC_API_KEY env var)
    pub api_key: String,
    /// Model to use (e.g., "claude-sonnet-4-20250514")
    pub model: String,
    /// Temperature (0-1, lower = more deterministic)
    pub temperature: f64,
    /// Maximum tokens in response
    pub max_tokens: u32,
    /// API base URL, overridable for tests
    pub base_url: String,
}

impl AnthropicConfig {
    /// Create config from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY environment variable not set"))?;

        Ok(Self {
            api_key,
            model: "claude-sonnet-4-20250514".to_string(),
            temperature: 0.2,
            max_tokens: 8192,
            base_url: "https://api.anthropic.com".to_string(),
        })
    }

    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            temperature: 0.2,
            max_tokens: 8192,
            base_url: "https://api.anthropic.com".to_string(),
        }
    }
}

/// Anthropic Messages API backend
pub struct AnthropicBackend {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicBackend {
    pub fn new(config: AnthropicConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn request_body(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tool: Option<&ToolSpec>,
        stream: bool,
    ) -> AnthropicRequest {
        AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: Some(self.config.temperature),
            system: Some(system.to_string()),
            messages: messages.to_vec(),
            tools: tool.map(|t| {
                vec![Tool {
                    name: t.name.to_string(),
                    description: t.description.to_string(),
                    input_schema: t.schema.clone(),
                }]
            }),
            tool_choice: tool.map(|t| ToolChoice {
                choice_type: "tool".to_string(),
                name: t.name.to_string(),
            }),
            stream: if stream { Some(true) } else { None },
        }
    }

    async fn send(&self, body: &AnthropicRequest) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }
        Ok(response)
    }
}

impl ChatBackend for AnthropicBackend {
    fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> impl Future<Output = Result<Completion, LlmError>> + Send {
        let body = self.request_body(system, messages, None, false);
        async move {
            let response: AnthropicResponse = self.send(&body).await?.json().await?;
            let usage = response.usage();
            let text = response
                .content
                .iter()
                .filter(|c| c.content_type == "text")
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join("");
            if text.is_empty() {
                return Err(LlmError::EmptyResponse);
            }
            Ok(Completion { text, usage })
        }
    }

    fn complete_with_schema(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tool: &ToolSpec,
    ) -> impl Future<Output = Result<SchemaCompletion, LlmError>> + Send {
        let body = self.request_body(system, messages, Some(tool), false);
        let tool_name = tool.name;
        async move {
            let response: AnthropicResponse = self.send(&body).await?.json().await?;
            let usage = response.usage();

            let value = response
                .content
                .iter()
                .find(|c| c.content_type == "tool_use" && c.name.as_deref() == Some(tool_name))
                .and_then(|c| c.input.clone());
            let raw_text = response
                .content
                .iter()
                .filter(|c| c.content_type == "text")
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join("");

            Ok(SchemaCompletion {
                value,
                raw_text,
                usage,
            })
        }
    }

    fn stream(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> impl Future<Output = Result<mpsc::Receiver<Result<String, LlmError>>, LlmError>> + Send
    {
        let body = self.request_body(system, messages, None, true);
        async move {
            let mut response = self.send(&body).await?;
            let (tx, rx) = mpsc::channel(32);

            tokio::spawn(async move {
                let mut buffer = String::new();
                loop {
                    match response.chunk().await {
                        Ok(Some(bytes)) => {
                            buffer.push_str(&String::from_utf8_lossy(&bytes));
                            while let Some(pos) = buffer.find('\n') {
                                let line = buffer[..pos].trim().to_string();
                                buffer.drain(..=pos);
                                if let Some(delta) = parse_sse_delta(&line) {
                                    if tx.send(Ok(delta)).await.is_err() {
                                        return;
                                    }
                                }
                            }
                        }
                        Ok(None) => return,
                        Err(e) => {
                            let _ = tx.send(Err(LlmError::Transport(e))).await;
                            return;
                        }
                    }
                }
            });

            Ok(rx)
        }
    }

    fn count_tokens(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> impl Future<Output = Result<Option<u64>, LlmError>> + Send {
        let body = serde_json::json!({
            "model": self.config.model,
            "system": system,
            "messages": messages,
        });
        async move {
            let response = self
                .client
                .post(format!(
                    "{}/v1/messages/count_tokens",
                    self.config.base_url
                ))
                .header("x-api-key", &self.config.api_key)
                .header("anthropic-version", "2023-06-01")
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await?;

            if !response.status().is_success() {
                // Counting is advisory; an unsupported endpoint is not an error
                return Ok(None);
            }
            let counted: CountTokensResponse = response.json().await?;
            Ok(Some(counted.input_tokens))
        }
    }
}

/// Extract the text delta from one SSE line, if it carries one
fn parse_sse_delta(line: &str) -> Option<String> {
    let data = line.strip_prefix("data:")?.trim();
    let event: serde_json::Value = serde_json::from_str(data).ok()?;
    if event["type"] == "content_block_delta" && event["delta"]["type"] == "text_delta" {
        event["delta"]["text"].as_str().map(|s| s.to_string())
    } else {
        None
    }
}

/// Policy for schema-constrained calls whose output cannot be parsed even
/// after salvage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseErrorPolicy {
    /// Raise `LlmError::NonJson` carrying the raw text
    #[default]
    Fail,
    /// Return a default-valued object annotated with the raw text
    ReturnEmpty,
}

/// Call-path knobs for the client
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Bounded in-flight calls through this client
    pub max_concurrency: usize,
    /// Independent timeout raced against each backend invocation
    pub call_timeout: Duration,
    pub retry: RetryConfig,
    pub parse_error_policy: ParseErrorPolicy,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            call_timeout: Duration::from_secs(300),
            retry: RetryConfig::default(),
            parse_error_policy: ParseErrorPolicy::Fail,
        }
    }
}

/// Result of a schema-constrained call. `raw` is populated only when the
/// parse-error policy converted unusable output into a default value.
#[derive(Debug, Clone)]
pub struct ObjectResponse<T> {
    pub value: T,
    pub raw: Option<String>,
    pub usage: Usage,
}

/// Uniform call surface over a chat backend.
///
/// Every call path applies, in order: the concurrency semaphore, the budget
/// gate, a timeout racing the backend invocation, and retry with full-jitter
/// exponential backoff on retriable failures.
pub struct LlmClient<B> {
    backend: B,
    budget: BudgetManager,
    semaphore: Semaphore,
    config: LlmConfig,
    sink: Arc<dyn ErrorSink>,
    strict_tokens: bool,
}

impl<B: ChatBackend> LlmClient<B> {
    pub fn new(
        backend: B,
        budget_config: &BudgetConfig,
        config: LlmConfig,
    ) -> Result<Self, LlmError> {
        Self::with_sink(backend, budget_config, config, Arc::new(NoopSink))
    }

    pub fn with_sink(
        backend: B,
        budget_config: &BudgetConfig,
        config: LlmConfig,
        sink: Arc<dyn ErrorSink>,
    ) -> Result<Self, LlmError> {
        if config.max_concurrency == 0 {
            return Err(LlmError::Config(
                "max_concurrency must be positive".to_string(),
            ));
        }
        Ok(Self {
            backend,
            budget: BudgetManager::new(budget_config)?,
            semaphore: Semaphore::new(config.max_concurrency),
            strict_tokens: budget_config.strict_tokens,
            config,
            sink,
        })
    }

    /// Plain generation
    pub async fn generate(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<Completion, LlmError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| LlmError::Config("client semaphore closed".to_string()))?;
        let estimate = self.token_estimate(system, messages).await;

        let (completion, reservation) = self
            .call_with_retry(estimate, || self.backend.complete(system, messages))
            .await?;
        self.budget.after_call(reservation, &completion.usage).await;
        debug!(
            input_tokens = completion.usage.input_tokens,
            output_tokens = completion.usage.output_tokens,
            "generate complete"
        );
        Ok(completion)
    }

    /// Schema-constrained generation into `T`. Strict parse first, then
    /// salvage of the largest balanced JSON span; unusable output is routed
    /// to the error sink and handled per the parse-error policy.
    pub async fn generate_object<T>(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tool: &ToolSpec,
        hint: &str,
    ) -> Result<ObjectResponse<T>, LlmError>
    where
        T: DeserializeOwned + Default,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| LlmError::Config("client semaphore closed".to_string()))?;
        let estimate = self.token_estimate(system, messages).await;

        let (completion, reservation) = self
            .call_with_retry(estimate, || {
                self.backend.complete_with_schema(system, messages, tool)
            })
            .await?;
        let usage = completion.usage;
        self.budget.after_call(reservation, &usage).await;

        if let Some(value) = completion.value {
            match serde_json::from_value::<T>(value) {
                Ok(parsed) => {
                    return Ok(ObjectResponse {
                        value: parsed,
                        raw: None,
                        usage,
                    });
                }
                Err(e) => {
                    debug!("tool input did not match schema type: {}", e);
                }
            }
        }

        // The backend answered in prose, or the tool input failed to parse.
        // Try to salvage a balanced JSON span from the raw text.
        if let Some(salvaged) = salvage_json(&completion.raw_text) {
            if let Ok(parsed) = serde_json::from_value::<T>(salvaged) {
                debug!("salvage-parsed non-strict backend output");
                return Ok(ObjectResponse {
                    value: parsed,
                    raw: None,
                    usage,
                });
            }
        }

        save_best_effort(
            self.sink.as_ref(),
            "backend output failed schema parsing",
            &completion.raw_text,
            hint,
        );

        match self.config.parse_error_policy {
            ParseErrorPolicy::Fail => Err(LlmError::NonJson {
                raw: completion.raw_text,
                usage,
            }),
            ParseErrorPolicy::ReturnEmpty => {
                warn!("returning empty object for unparsable output ({})", hint);
                Ok(ObjectResponse {
                    value: T::default(),
                    raw: Some(completion.raw_text),
                    usage,
                })
            }
        }
    }

    /// Streaming generation. Retries apply only to opening the stream;
    /// mid-stream failures arrive as an `Err` item and are terminal.
    pub async fn stream(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<mpsc::Receiver<Result<String, LlmError>>, LlmError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| LlmError::Config("client semaphore closed".to_string()))?;
        let estimate = self.token_estimate(system, messages).await;

        // Stream usage is not reported back; only the request itself is
        // charged against the budget.
        let (rx, _reservation) = self
            .call_with_retry(estimate, || self.backend.stream(system, messages))
            .await?;
        Ok(rx)
    }

    /// Token count for a prospective call, when the backend supports it
    pub async fn count_tokens(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<Option<u64>, LlmError> {
        self.backend.count_tokens(system, messages).await
    }

    /// Estimate used for strict TPM pre-reservation; advisory, never fatal
    async fn token_estimate(&self, system: &str, messages: &[ChatMessage]) -> Option<u64> {
        if !self.strict_tokens {
            return None;
        }
        match self.backend.count_tokens(system, messages).await {
            Ok(estimate) => estimate,
            Err(e) => {
                debug!("token count unavailable: {}", e);
                None
            }
        }
    }

    /// Budget gate + timeout + retry around one backend operation. Returns
    /// the successful value together with the reservation of the winning
    /// attempt so the caller can reconcile actual usage.
    async fn call_with_retry<T, F, Fut>(
        &self,
        token_estimate: Option<u64>,
        mut call: F,
    ) -> Result<(T, Reservation), LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut backoff = Backoff::new(self.config.retry.clone());

        loop {
            let reservation = self.budget.before_call(token_estimate).await?;

            let error = match timeout(self.config.call_timeout, call()).await {
                Ok(Ok(value)) => return Ok((value, reservation)),
                Ok(Err(e)) => e,
                Err(_) => LlmError::Timeout(self.config.call_timeout),
            };

            if error.is_retriable() {
                if let Some(delay) = backoff.next_delay() {
                    warn!(
                        attempt = backoff.attempt(),
                        "retriable backend failure, backing off {:?}: {}", delay, error
                    );
                    sleep(delay).await;
                    continue;
                }
            }
            return Err(error);
        }
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct Tool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ToolChoice {
    #[serde(rename = "type")]
    choice_type: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<UsageBlock>,
}

impl AnthropicResponse {
    fn usage(&self) -> Usage {
        self.usage
            .as_ref()
            .map(|u| Usage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct UsageBlock {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CountTokensResponse {
    input_tokens: u64,
}
