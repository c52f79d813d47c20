// Zenith Agent Engine — Core types
// These are the data structures that flow through the entire engine.
// They are independent of any specific AI provider.

use crate::engine::console::LogLevel;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Model / Provider Config ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Google,
    Groq,
    OpenAI,
    Custom,
}

impl ProviderKind {
    pub fn default_base_url(&self) -> &str {
        match self {
            ProviderKind::Google => "https://generativelanguage.googleapis.com/v1beta",
            ProviderKind::Groq => "https://api.groq.com/openai/v1",
            ProviderKind::OpenAI => "https://api.openai.com/v1",
            ProviderKind::Custom => "",
        }
    }

    /// Sensible model to reach for when none is configured.
    pub fn default_model(&self) -> &str {
        match self {
            ProviderKind::Google => "gemini-2.0-flash",
            ProviderKind::Groq => "llama-3.3-70b-versatile",
            ProviderKind::OpenAI => "gpt-4-turbo",
            ProviderKind::Custom => "",
        }
    }
}

// ── Provider-facing messages ───────────────────────────────────────────

/// One entry of the role-tagged history sent to a provider. Distinct from
/// the UI-facing [`crate::engine::chat::ChatMessage`]: this is the wire
/// shape, including the tool-call plumbing for multi-round turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Message {
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    /// A tool-role message echoing a result back to the model, correlated
    /// by the same call ID the request carried.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Message {
            role: Role::Tool,
            content: output.into(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            name: Some(tool_name.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

// ── Tool Calling ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String, // JSON string
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

// ── Tool Execution Result ──────────────────────────────────────────────

/// Normalized outcome of one tool call. `payload` is the structured
/// `{status, message, ...}` object fed back to the model; `success`
/// mirrors its `status` field for cheap checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub payload: Value,
    pub success: bool,
}

impl ToolResult {
    /// The serialized payload as the model sees it, image field included.
    pub fn model_output(&self) -> String {
        self.payload.to_string()
    }

    /// Pretty-printed payload for humans. Screenshot data URIs are huge
    /// base64 blobs, so the `image` field is truncated before printing.
    pub fn display_output(&self) -> String {
        let mut v = self.payload.clone();
        if let Some(img) = v.get_mut("image") {
            if let Some(s) = img.as_str() {
                if s.len() > 64 {
                    *img = Value::String(format!(
                        "{}… [{} bytes truncated]",
                        truncate_utf8(s, 48),
                        s.len()
                    ));
                }
            }
        }
        serde_json::to_string_pretty(&v).unwrap_or_else(|_| v.to_string())
    }
}

// ── Streaming Events (engine → observers) ──────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EngineEvent {
    /// A text delta from the model's response stream
    #[serde(rename = "delta")]
    Delta {
        session_id: String,
        run_id: String,
        text: String,
    },
    /// The model requested a tool call — execution is starting
    #[serde(rename = "tool_call")]
    ToolCallEvent {
        session_id: String,
        run_id: String,
        tool_call: ToolCall,
    },
    /// A tool finished executing
    #[serde(rename = "tool_result")]
    ToolResultEvent {
        session_id: String,
        run_id: String,
        tool_call_id: String,
        payload: Value,
        success: bool,
    },
    /// The full assistant turn is complete
    #[serde(rename = "complete")]
    Complete {
        session_id: String,
        run_id: String,
        text: String,
        tool_calls_count: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },
    /// An error occurred during the run
    #[serde(rename = "error")]
    Error {
        session_id: String,
        run_id: String,
        message: String,
    },
    /// The run was cancelled by the user
    #[serde(rename = "aborted")]
    Aborted { session_id: String, run_id: String },
}

// ── Provider API response shapes ───────────────────────────────────────

/// Unified streaming chunk from any provider
#[derive(Debug, Clone, Default)]
pub struct StreamChunk {
    pub delta_text: Option<String>,
    pub tool_calls: Vec<ToolCallDelta>,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
    pub model: Option<String>,
}

/// Incremental slice of a tool call. Providers stream the ID and name once
/// and the arguments as JSON fragments keyed by the call's index.
#[derive(Debug, Clone)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub function_name: Option<String>,
    pub arguments_delta: Option<String>,
}

/// Token usage reported by the API (for metering).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

// ── Sandbox messaging contract ─────────────────────────────────────────

/// Cross-boundary messages published by sandboxed pages. The tag and
/// payload shape are the contract; delivery is a drained page-global
/// rather than browser postMessage, but the wire shape is identical.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SandboxMessage {
    #[serde(rename = "CONSOLE_LOG")]
    ConsoleLog {
        #[serde(rename = "logType")]
        log_type: LogLevel,
        message: String,
    },
    #[serde(rename = "TEST_RESULT")]
    TestResult {
        status: TestStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Success,
    Error,
}

// ── Engine Config ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub provider: ProviderConfig,
    pub system_prompt: Option<String>,
    pub max_tool_rounds: u32,
    pub temperature: Option<f64>,
    pub console_capacity: usize,
}

impl EngineConfig {
    pub fn new(provider: ProviderConfig) -> Self {
        EngineConfig {
            provider,
            system_prompt: None,
            max_tool_rounds: crate::atoms::constants::DEFAULT_MAX_TOOL_ROUNDS,
            temperature: None,
            console_capacity: crate::atoms::constants::MAX_CONSOLE_LOGS,
        }
    }
}

// ── Helpers ────────────────────────────────────────────────────────────

/// Truncate a string to at most `max_bytes`, backing off to the nearest
/// char boundary so multi-byte sequences are never split.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
