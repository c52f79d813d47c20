// ── Zenith Atoms: Provider Trait ───────────────────────────────────────────
// The golden trait every AI provider binding implements, plus the error
// taxonomy at that boundary. Concrete bindings live in engine/providers/.

use crate::atoms::error::EngineError;
use crate::engine::types::{Message, ProviderKind, StreamChunk, ToolDefinition};
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

// ── Provider error taxonomy ────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Connection-level failure: DNS, TLS, broken stream.
    #[error("Transport error: {0}")]
    Transport(String),

    /// 401/403 — never retried.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// 429 after retries were exhausted.
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },

    /// Any other non-success API status.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
}

impl From<ProviderError> for EngineError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Transport(msg) => EngineError::Transport(msg),
            other => EngineError::Provider {
                message: other.to_string(),
            },
        }
    }
}

// ── Streaming contract ─────────────────────────────────────────────────────

/// Live stream of unified chunks from a provider. Dropping the stream
/// cancels the underlying HTTP request, which is how cooperative abort
/// propagates to the transport.
pub type ChunkStream = BoxStream<'static, Result<StreamChunk, ProviderError>>;

/// The single capability the agent loop requires from any backend: given a
/// role-tagged history, a tool schema, and a model, produce an incremental
/// stream of text deltas and tool-call events.
#[async_trait]
pub trait AiProvider: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        model: &str,
        temperature: Option<f64>,
    ) -> Result<ChunkStream, ProviderError>;
}
