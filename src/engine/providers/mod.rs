// Zenith Agent Engine — AI Provider Registry
// AnyProvider wraps Box<dyn AiProvider> so adding a new provider never
// requires touching the agent loop — implement the trait and add an arm.

pub mod google;
pub mod openai;

pub use google::GoogleProvider;
pub use openai::OpenAiProvider;

use crate::atoms::traits::{AiProvider, ChunkStream, ProviderError};
use crate::engine::types::{Message, ProviderConfig, ProviderKind, StreamChunk, ToolDefinition};
use futures::StreamExt;
use std::collections::VecDeque;

// ── Provider factory ───────────────────────────────────────────────────

/// Type-erased AI provider. Callers hold `AnyProvider` and call
/// `.chat_stream()` without knowing which concrete backend is in use.
pub struct AnyProvider(Box<dyn AiProvider>);

impl AnyProvider {
    /// Construct the right concrete provider from a `ProviderConfig`.
    /// Groq and Custom speak the OpenAI wire format; only Google has its
    /// own.
    pub fn from_config(config: &ProviderConfig) -> Self {
        let provider: Box<dyn AiProvider> = match config.kind {
            ProviderKind::Google => Box::new(GoogleProvider::new(config)),
            // All OpenAI-compatible variants: OpenAI, Groq, Custom
            _ => Box::new(OpenAiProvider::new(config)),
        };
        AnyProvider(provider)
    }

    /// Wrap an arbitrary backend — the seam tests use for scripted
    /// providers.
    pub fn from_provider(provider: Box<dyn AiProvider>) -> Self {
        AnyProvider(provider)
    }

    pub async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        model: &str,
        temperature: Option<f64>,
    ) -> Result<ChunkStream, ProviderError> {
        self.0.chat_stream(messages, tools, model, temperature).await
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn kind(&self) -> ProviderKind {
        self.0.kind()
    }
}

// ── Shared SSE plumbing ────────────────────────────────────────────────

struct SseState {
    bytes: futures::stream::BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buffer: String,
    pending: VecDeque<StreamChunk>,
    done: bool,
}

/// Adapt a streaming HTTP response into a live chunk stream. Each `data:`
/// line is handed to the provider's parser, which may yield zero or more
/// chunks; `[DONE]` (OpenAI convention) or EOF ends the stream. Dropping
/// the returned stream drops the response and cancels the request.
pub(crate) fn sse_chunk_stream(
    response: reqwest::Response,
    parse_data_line: fn(&str) -> Vec<StreamChunk>,
) -> ChunkStream {
    let state = SseState {
        bytes: response.bytes_stream().map(|r| r.map(|b| b.to_vec())).boxed(),
        buffer: String::new(),
        pending: VecDeque::new(),
        done: false,
    };

    let stream = futures::stream::try_unfold(state, move |mut st| async move {
        loop {
            if let Some(chunk) = st.pending.pop_front() {
                return Ok(Some((chunk, st)));
            }
            if st.done {
                return Ok(None);
            }
            match st.bytes.next().await {
                Some(Ok(bytes)) => {
                    st.buffer.push_str(&String::from_utf8_lossy(&bytes));
                    while let Some(line_end) = st.buffer.find('\n') {
                        let line = st.buffer[..line_end].trim().to_string();
                        st.buffer.drain(..=line_end);
                        if let Some(data) = line.strip_prefix("data: ") {
                            if data == "[DONE]" {
                                st.done = true;
                                break;
                            }
                            st.pending.extend(parse_data_line(data));
                        }
                    }
                }
                Some(Err(e)) => {
                    return Err(ProviderError::Transport(format!("Stream read error: {e}")))
                }
                None => st.done = true,
            }
        }
    });

    Box::pin(stream)
}
