// Zenith Agent Engine — Google Gemini Provider
// Implements the AiProvider golden trait over the streamGenerateContent
// SSE endpoint. Gemini ships whole functionCall parts rather than argument
// deltas, and rejects several JSON-Schema fields — both handled here.

use crate::atoms::traits::{AiProvider, ChunkStream, ProviderError};
use crate::engine::http::{
    is_retryable_status, parse_retry_after, retry_delay, CircuitBreaker, MAX_RETRIES,
};
use crate::engine::providers::sse_chunk_stream;
use crate::engine::types::{
    truncate_utf8, Message, ProviderConfig, ProviderKind, Role, StreamChunk, TokenUsage,
    ToolCallDelta, ToolDefinition,
};
use async_trait::async_trait;
use log::{error, info, warn};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::LazyLock;
use std::time::Duration;

/// Circuit breaker shared across all Gemini requests.
static GOOGLE_CIRCUIT: LazyLock<CircuitBreaker> = LazyLock::new(|| CircuitBreaker::new(5, 60));

// ── Struct ─────────────────────────────────────────────────────────────

pub struct GoogleProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GoogleProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| config.kind.default_base_url().to_string());
        GoogleProvider {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            base_url,
            api_key: config.api_key.clone(),
        }
    }

    fn format_messages(messages: &[Message]) -> (Option<Value>, Vec<Value>) {
        let mut system_instruction: Option<Value> = None;
        let mut contents: Vec<Value> = Vec::new();

        for msg in messages {
            if msg.role == Role::System {
                // Merge multiple system messages into one systemInstruction
                if let Some(existing) = &mut system_instruction {
                    let prev = existing["parts"][0]["text"].as_str().unwrap_or("").to_string();
                    existing["parts"][0]["text"] = json!(format!("{prev}\n\n{}", msg.content));
                } else {
                    system_instruction = Some(json!({"parts": [{"text": msg.content}]}));
                }
                continue;
            }

            if msg.role == Role::Tool {
                if let Some(tc_id) = &msg.tool_call_id {
                    let fn_name = msg.name.clone().unwrap_or_else(|| tc_id.clone());
                    contents.push(json!({
                        "role": "function",
                        "parts": [{
                            "functionResponse": {
                                "name": fn_name,
                                "response": { "result": msg.content }
                            }
                        }]
                    }));
                }
                continue;
            }

            let role = match msg.role {
                Role::Assistant => "model",
                _ => "user",
            };

            if msg.role == Role::Assistant {
                if let Some(tool_calls) = &msg.tool_calls {
                    let mut parts: Vec<Value> = Vec::new();
                    if !msg.content.is_empty() {
                        parts.push(json!({"text": msg.content}));
                    }
                    for tc in tool_calls {
                        let args: Value =
                            serde_json::from_str(&tc.function.arguments).unwrap_or(json!({}));
                        parts.push(json!({
                            "functionCall": {
                                "name": tc.function.name,
                                "args": args,
                            }
                        }));
                    }
                    contents.push(json!({"role": "model", "parts": parts}));
                    continue;
                }
            }

            contents.push(json!({
                "role": role,
                "parts": [{"text": msg.content}]
            }));
        }

        // Gemini requires strictly alternating user/model turns; merge
        // consecutive same-role entries (never function responses).
        let mut merged: Vec<Value> = Vec::new();
        for entry in contents {
            let entry_role = entry["role"].as_str().unwrap_or("").to_string();
            let can_merge = entry_role != "function"
                && merged
                    .last()
                    .and_then(|e| e["role"].as_str())
                    .map(|r| r == entry_role)
                    .unwrap_or(false);

            if can_merge {
                if let Some(last) = merged.last_mut() {
                    if let (Some(existing), Some(new_parts)) =
                        (last["parts"].as_array().cloned(), entry["parts"].as_array())
                    {
                        let mut combined = existing;
                        combined.extend(new_parts.iter().cloned());
                        last["parts"] = json!(combined);
                    }
                }
            } else {
                merged.push(entry);
            }
        }

        (system_instruction, merged)
    }

    /// Strip schema fields Gemini rejects: `additionalProperties`,
    /// `$schema`, `$ref`, empty `required` arrays, and empty `properties`
    /// maps on object types.
    fn sanitize_schema(val: &Value) -> Value {
        match val {
            Value::Object(map) => {
                let mut clean = serde_json::Map::new();
                for (k, v) in map {
                    if k == "additionalProperties" || k == "$schema" || k == "$ref" {
                        continue;
                    }
                    if k == "required" {
                        if let Value::Array(arr) = v {
                            if arr.is_empty() {
                                continue;
                            }
                        }
                    }
                    if k == "properties" {
                        if let Value::Object(props) = v {
                            if props.is_empty() {
                                continue;
                            }
                        }
                    }
                    clean.insert(k.clone(), Self::sanitize_schema(v));
                }
                // type:object with no properties left — drop the type and
                // let Gemini infer it
                if clean.get("type").and_then(|v| v.as_str()) == Some("object")
                    && !clean.contains_key("properties")
                {
                    clean.remove("type");
                }
                Value::Object(clean)
            }
            Value::Array(arr) => Value::Array(arr.iter().map(Self::sanitize_schema).collect()),
            other => other.clone(),
        }
    }

    fn format_tools(tools: &[ToolDefinition]) -> Value {
        let function_declarations: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.function.name,
                    "description": t.function.description,
                    "parameters": Self::sanitize_schema(&t.function.parameters),
                })
            })
            .collect();

        json!([{ "functionDeclarations": function_declarations }])
    }

    /// Parse one SSE data line of Gemini's streaming format. A single line
    /// can carry text, several functionCall parts, and usage metadata.
    fn parse_data_line(data: &str) -> Vec<StreamChunk> {
        let Ok(v) = serde_json::from_str::<Value>(data) else {
            return vec![];
        };

        let model = v["modelVersion"].as_str().map(|s| s.to_string());
        let mut chunks = Vec::new();
        let mut fc_index: usize = 0;

        if let Some(candidates) = v["candidates"].as_array() {
            for candidate in candidates {
                let content = &candidate["content"];
                let finish_reason = candidate["finishReason"].as_str().map(|s| s.to_string());

                // Blocked/empty responses (SAFETY, RECITATION, MAX_TOKENS…)
                // surface as a visible text chunk rather than dead air.
                if content.is_null() || content["parts"].is_null() {
                    if let Some(reason) = &finish_reason {
                        if reason != "STOP" {
                            warn!("[engine] Gemini: empty response with finishReason={reason}");
                            let msg = match reason.as_str() {
                                "SAFETY" => "My response was blocked by a safety filter. Try rephrasing your request.".to_string(),
                                "RECITATION" => "My response was blocked by a recitation filter. Try rephrasing.".to_string(),
                                "MAX_TOKENS" => "I ran out of output tokens. Try shortening the conversation.".to_string(),
                                other => format!("The model returned an empty response (reason: {other}). Please retry or rephrase."),
                            };
                            chunks.push(StreamChunk {
                                delta_text: Some(msg),
                                finish_reason: finish_reason.clone(),
                                model: model.clone(),
                                ..Default::default()
                            });
                        }
                    }
                    continue;
                }

                if let Some(parts) = content["parts"].as_array() {
                    for part in parts {
                        if let Some(text) = part["text"].as_str() {
                            chunks.push(StreamChunk {
                                delta_text: Some(text.to_string()),
                                finish_reason: finish_reason.clone(),
                                model: model.clone(),
                                ..Default::default()
                            });
                        }
                        if let Some(fc) = part.get("functionCall") {
                            let name = fc["name"].as_str().unwrap_or("").to_string();
                            let args = fc["args"].clone();
                            // Gemini ships whole calls; synthesize one
                            // delta per call with a locally minted ID.
                            chunks.push(StreamChunk {
                                tool_calls: vec![ToolCallDelta {
                                    index: fc_index,
                                    id: fc["id"].as_str().map(|s| s.to_string()),
                                    function_name: Some(name),
                                    arguments_delta: Some(args.to_string()),
                                }],
                                finish_reason: finish_reason.clone(),
                                model: model.clone(),
                                ..Default::default()
                            });
                            fc_index += 1;
                        }
                    }
                }
            }
        }

        if let Some(um) = v.get("usageMetadata") {
            let input = um["promptTokenCount"].as_u64().unwrap_or(0);
            let output = um["candidatesTokenCount"].as_u64().unwrap_or(0);
            if input > 0 || output > 0 {
                chunks.push(StreamChunk {
                    usage: Some(TokenUsage {
                        input_tokens: input,
                        output_tokens: output,
                        total_tokens: um["totalTokenCount"].as_u64().unwrap_or(input + output),
                    }),
                    model: model.clone(),
                    ..Default::default()
                });
            }
        }

        chunks
    }
}

// ── AiProvider trait implementation ────────────────────────────────────

#[async_trait]
impl AiProvider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        model: &str,
        temperature: Option<f64>,
    ) -> Result<ChunkStream, ProviderError> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url.trim_end_matches('/'),
            model,
            self.api_key
        );

        let (system_instruction, mut contents) = Self::format_messages(messages);

        // Gemini 400s on an empty contents array.
        if contents.is_empty() {
            contents.push(json!({"role": "user", "parts": [{"text": "Hello"}]}));
            warn!("[engine] Gemini: contents was empty after formatting, injected fallback");
        }

        let mut body = json!({ "contents": contents });
        if let Some(sys) = system_instruction {
            body["systemInstruction"] = sys;
        }
        if !tools.is_empty() {
            body["tools"] = Self::format_tools(tools);
        }
        if let Some(temp) = temperature {
            body["generationConfig"] = json!({"temperature": temp});
        }

        info!("[engine] Gemini request model={model}");

        if let Err(msg) = GOOGLE_CIRCUIT.check() {
            return Err(ProviderError::Transport(msg));
        }

        let mut last_error = String::new();
        let mut last_status: u16 = 0;
        let mut retry_after: Option<u64> = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = retry_delay(attempt - 1, retry_after.take()).await;
                warn!(
                    "[engine] Gemini retry {attempt}/{MAX_RETRIES} after {}ms",
                    delay.as_millis()
                );
            }

            let response = match self
                .client
                .post(&url)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    GOOGLE_CIRCUIT.record_failure();
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
                    "[engine] Gemini error {status}: {}",
                    truncate_utf8(&body_text, 500)
                );

                GOOGLE_CIRCUIT.record_failure();

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

            GOOGLE_CIRCUIT.record_success();
            return Ok(sse_chunk_stream(response, Self::parse_data_line));
        }

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
