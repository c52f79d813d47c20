//! Zenith — an AI web-coding agent engine.
//!
//! A chat-driven loop in which an LLM edits an in-memory three-file web
//! project ({html, css, javascript}) through a fixed tool set, previews the
//! result on a sandboxed headless-browser surface, and reads back console
//! output and screenshots to check its own work.
//!
//! The interesting machinery:
//! - [`engine::agent_loop`] — the streaming protocol driver: text deltas
//!   accumulate into message parts, tool calls are correlated to results by
//!   stable IDs, and cancellation is cooperative at every suspension point.
//! - [`engine::project`] — the single-writer project store with whole-file
//!   replace and lenient search/replace patching.
//! - [`engine::sandbox`] — disposable browser surfaces for screenshots and
//!   hard-deadline test execution.
//! - [`engine::preview`] — the live preview tab whose console is forwarded
//!   into a bounded log buffer the agent can read.

pub mod atoms;
pub mod engine;

pub use atoms::error::{EngineError, EngineResult};
pub use atoms::traits::{AiProvider, ChunkStream, ProviderError};
pub use engine::agent_loop::{run_agent_turn, TurnOutcome};
pub use engine::chat::{ChatMessage, ChatSession, MessagePart, ToolInvocation};
pub use engine::console::{ConsoleLog, ConsoleLogBuffer, LogLevel};
pub use engine::project::{FileTarget, PatchOutcome, Project, ProjectStore};
pub use engine::providers::AnyProvider;
pub use engine::state::{AbortSignal, EngineState, RunState};
pub use engine::types::{EngineConfig, EngineEvent, ProviderConfig, ProviderKind};
