// Zenith Agent Engine — OpenAI-Compatible Provider
// Handles: OpenAI, Groq, and any OpenAI-compatible REST API via base_url.
// Implements the AiProvider golden trait.

use crate::atoms::traits::{AiProvider, ChunkStream, ProviderError};
use crate::engine::http::{
    is_retryable_status, parse_retry_after, retry_delay, CircuitBreaker, MAX_RETRIES,
};
use crate::engine::providers::sse_chunk_stream;
use crate::engine::types::{
    truncate_utf8, Message, ProviderConfig, ProviderKind, StreamChunk, TokenUsage, ToolCallDelta,
    ToolDefinition,
};
use async_trait::async_trait;
use log::{error, info, warn};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::LazyLock;
use std::time::Duration;

/// Circuit breaker shared across all OpenAI-compatible requests.
static OPENAI_CIRCUIT: LazyLock<CircuitBreaker> = LazyLock::new(|| CircuitBreaker::new(5, 60));

// ── Struct ─────────────────────────────────────────────────────────────

pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    kind: ProviderKind,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| config.kind.default_base_url().to_string());
        OpenAiProvider {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            base_url,
            api_key: config.api_key.clone(),
            kind: config.kind,
        }
    }

    fn format_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| {
                let mut m = json!({
                    "role": msg.role,
                    "content": msg.content,
                });
                if let Some(tc) = &msg.tool_calls {
                    m["tool_calls"] = json!(tc);
                }
                if let Some(id) = &msg.tool_call_id {
                    m["tool_call_id"] = json!(id);
                }
                if let Some(name) = &msg.name {
                    m["name"] = json!(name);
                }
                m
            })
            .collect()
    }

    fn format_tools(tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": t.tool_type,
                    "function": {
                        "name": t.function.name,
                        "description": t.function.description,
                        "parameters": t.function.parameters,
                    }
                })
            })
            .collect()
    }

    /// Parse a single SSE data line from an OpenAI-compatible stream.
    fn parse_data_line(data: &str) -> Vec<StreamChunk> {
        let Ok(v) = serde_json::from_str::<Value>(data) else {
            return vec![];
        };

        let model = v["model"].as_str().map(|s| s.to_string());

        let Some(choice) = v["choices"].get(0) else {
            // usage-only final chunk (stream_options.include_usage)
            if let Some(usage) = Self::parse_usage(&v) {
                return vec![StreamChunk {
                    usage: Some(usage),
                    model,
                    ..Default::default()
                }];
            }
            return vec![];
        };

        let delta = &choice["delta"];
        let finish_reason = choice["finish_reason"].as_str().map(|s| s.to_string());
        let delta_text = delta["content"].as_str().map(|s| s.to_string());

        let mut tool_calls = Vec::new();
        if let Some(tcs) = delta["tool_calls"].as_array() {
            for tc in tcs {
                tool_calls.push(ToolCallDelta {
                    index: tc["index"].as_u64().unwrap_or(0) as usize,
                    id: tc["id"].as_str().map(|s| s.to_string()),
                    function_name: tc["function"]["name"].as_str().map(|s| s.to_string()),
                    arguments_delta: tc["function"]["arguments"].as_str().map(|s| s.to_string()),
                });
            }
        }

        vec![StreamChunk {
            delta_text,
            tool_calls,
            finish_reason,
            usage: Self::parse_usage(&v),
            model,
        }]
    }

    fn parse_usage(v: &Value) -> Option<TokenUsage> {
        let u = v.get("usage")?;
        let input = u["prompt_tokens"].as_u64().unwrap_or(0);
        let output = u["completion_tokens"].as_u64().unwrap_or(0);
        if input == 0 && output == 0 {
            return None;
        }
        Some(TokenUsage {
            input_tokens: input,
            output_tokens: output,
            total_tokens: u["total_tokens"].as_u64().unwrap_or(input + output),
        })
    }
}

// ── AiProvider implementation ──────────────────────────────────────────

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Open a chat completion stream. Transient errors are retried with
    /// backoff before the stream opens; once it is open, transport errors
    /// surface through the stream itself.
    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        model: &str,
        temperature: Option<f64>,
    ) -> Result<ChunkStream, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let mut body = json!({
            "model": model,
            "messages": Self::format_messages(messages),
            "stream": true,
            "stream_options": {"include_usage": true},
        });
        if !tools.is_empty() {
            body["tools"] = json!(Self::format_tools(tools));
        }
        if let Some(temp) = temperature {
            body["temperature"] = json!(temp);
        }

        info!("[engine] OpenAI-compatible request to {url} model={model}");

        if let Err(msg) = OPENAI_CIRCUIT.check() {
            return Err(ProviderError::Transport(msg));
        }

        let mut last_error = String::new();
        let mut last_status: u16 = 0;
        let mut retry_after: Option<u64> = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = retry_delay(attempt - 1, retry_after.take()).await;
                warn!(
                    "[engine] OpenAI retry {attempt}/{MAX_RETRIES} after {}ms",
                    delay.as_millis()
                );
            }

            let request = self
                .client
                .post(&url)
                .header("Content-Type", "application/json")
                .header("Authorization", format!("Bearer {}", self.api_key));

            let response = match request.json(&body).send().await {
                Ok(r) => r,
                Err(e) => {
                    OPENAI_CIRCUIT.record_failure();
                    last_error = format!("HTTP request failed: {e}");
                    last_status = 0;
                    if attempt < MAX_RETRIES {
                        continue;
                    }
                    return Err(ProviderError::Transport(last_error));
                }
            };

            if !response.status().is_success() {
                let status = response.status().as_u16();
                last_status = status;
                retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);
                let body_text = response.text().await.unwrap_or_default();
                last_error = format!("API error {status}: {}", truncate_utf8(&body_text, 200));
                error!(
                    "[engine] OpenAI error {status}: {}",
                    truncate_utf8(&body_text, 500)
                );

                OPENAI_CIRCUIT.record_failure();

                // Auth errors are never retried
                if status == 401 || status == 403 {
                    return Err(ProviderError::Auth(last_error));
                }
                if is_retryable_status(status) && attempt < MAX_RETRIES {
                    continue;
                }
                return if status == 429 {
                    Err(ProviderError::RateLimited {
                        message: last_error,
                        retry_after_secs: retry_after.take(),
                    })
                } else {
                    Err(ProviderError::Api {
                        status,
                        message: last_error,
                    })
                };
            }

            OPENAI_CIRCUIT.record_success();
            return Ok(sse_chunk_stream(response, Self::parse_data_line));
        }

        // All retries exhausted — classify the last error
        match last_status {
            0 => Err(ProviderError::Transport(last_error)),
            429 => Err(ProviderError::RateLimited {
                message: last_error,
                retry_after_secs: retry_after,
            }),
            s => Err(ProviderError::Api {
                status: s,
                message: last_error,
            }),
        }
    }
}
