use std::time::{Duration, Instant as StdInstant};

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{ContentGenerationError, LlmGenerator, LlmResponse};

/// OpenAI-compatible chat-completions client (spec §4.C), generalized
/// from the corpus's `LiteLlmClient` to this service's single-prompt
/// `generate` operation plus retry/backoff and metrics.
pub struct LlmClient {
    api_base: String,
    api_key: String,
    http_client: Client,
    max_retries: u32,
}

impl LlmClient {
    pub fn new(api_base: String, api_key: String, max_retries: u32) -> Self {
        Self {
            api_base,
            api_key,
            http_client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("failed to build LLM HTTP client"),
            max_retries,
        }
    }

    async fn call_once(&self, prompt: &str, model: &str) -> Result<RawCompletion, CallError> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![ChatMessage { role: "user".to_string(), content: prompt.to_string() }],
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| if e.is_timeout() || e.is_connect() { CallError::Transient(e.to_string()) } else { CallError::Permanent(e.to_string()) })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::Transient(format!("status {status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::Permanent(format!("status {status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CallError::Permanent(format!("invalid response JSON: {e}")))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CallError::Permanent("empty choices array".to_string()))?;

        Ok(RawCompletion {
            id: parsed.id,
            content: choice.message.content,
            reasoning_content: choice.message.reasoning_content,
            usage: parsed.usage,
        })
    }
}

#[async_trait]
impl LlmGenerator for LlmClient {
    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        operation_tag: &str,
    ) -> Result<LlmResponse, ContentGenerationError> {
        let started = StdInstant::now();
        let backoff = ExponentialBuilder::default()
            .with_jitter()
            .with_max_times(self.max_retries as usize);

        let outcome = (|| async { self.call_once(prompt, model).await })
            .retry(backoff)
            .when(|e: &CallError| matches!(e, CallError::Transient(_)))
            .await;

        let duration_ms = started.elapsed().as_millis() as u64;

        let raw = outcome.map_err(|e| {
            record_metrics(model, operation_tag, "failure", duration_ms, None);
            ContentGenerationError { operation: operation_tag.to_string(), message: e.to_string() }
        })?;

        let cleaned = super::clean_completion(&raw.content).map_err(|message| {
            record_metrics(model, operation_tag, "failure", duration_ms, Some(&raw.usage));
            ContentGenerationError { operation: operation_tag.to_string(), message }
        })?;

        record_metrics(model, operation_tag, "success", duration_ms, Some(&raw.usage));

        Ok(LlmResponse {
            content: cleaned,
            model: model.to_string(),
            response_id: raw.id,
            duration_ms,
            prompt_tokens: raw.usage.prompt_tokens,
            completion_tokens: raw.usage.completion_tokens,
            total_tokens: raw.usage.total_tokens,
            reasoning_tokens: raw.usage.reasoning_tokens,
            reasoning_content: raw.reasoning_content,
            raw_content: raw.content,
        })
    }
}

fn record_metrics(model: &str, operation: &str, status: &str, duration_ms: u64, usage: Option<&Usage>) {
    metrics::histogram!("llm_generate_duration_ms", "model" => model.to_string(), "status" => status.to_string(), "operation" => operation.to_string())
        .record(duration_ms as f64);
    metrics::counter!("llm_generate_requests_total", "model" => model.to_string(), "status" => status.to_string(), "operation" => operation.to_string())
        .increment(1);
    if status == "failure" {
        metrics::counter!("llm_generate_failures_total", "model" => model.to_string(), "operation" => operation.to_string()).increment(1);
    }
    if let Some(usage) = usage {
        metrics::counter!("llm_prompt_tokens_total", "model" => model.to_string(), "operation" => operation.to_string()).increment(usage.prompt_tokens as u64);
        metrics::counter!("llm_completion_tokens_total", "model" => model.to_string(), "operation" => operation.to_string()).increment(usage.completion_tokens as u64);
        if let Some(reasoning) = usage.reasoning_tokens {
            metrics::counter!("llm_reasoning_tokens_total", "model" => model.to_string(), "operation" => operation.to_string()).increment(reasoning as u64);
        }
    }
}

#[derive(Debug)]
enum CallError {
    Transient(String),
    Permanent(String),
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallError::Transient(m) | CallError::Permanent(m) => write!(f, "{m}"),
        }
    }
}

impl std::error::Error for CallError {}

struct RawCompletion {
    id: String,
    content: String,
    reasoning_content: Option<String>,
    usage: Usage,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    id: String,
    choices: Vec<ChatChoice>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
    #[serde(default)]
    reasoning_tokens: Option<u32>,
}
