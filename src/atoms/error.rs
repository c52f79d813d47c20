// ── Zenith Atoms: Error Types ──────────────────────────────────────────────
// Single canonical error enum for the engine, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (I/O, sandbox, patch, transport…).
//   • The `#[from]` attribute wires std/external error conversions automatically.
//   • Tool-facing failures are never thrown across the tool boundary — the
//     executor serializes them into `{status:"error", message}` payloads, so
//     the Display strings below are exactly what the model reads.
//   • No variant carries secret material (API keys) in its message.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP / network failure (reqwest layer).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A tool named a file key outside {html, css, javascript}.
    #[error("Invalid target '{0}' — expected html, css, or javascript")]
    InvalidTarget(String),

    /// The patch search string was absent even after the lenient retry.
    #[error("Could not find search string in {0}")]
    PatchNotFound(String),

    /// Headless Chrome could not be launched, so nothing can be rendered.
    #[error("Rendering unavailable: {0}")]
    RenderingUnavailable(String),

    /// Rasterization of an otherwise healthy surface failed.
    #[error("Screenshot failed: {0}")]
    CaptureFailed(String),

    /// validate_functionality produced no result before the deadline.
    #[error("Test timed out after {0}s")]
    TestTimeout(u64),

    /// The test script threw; the message is what it threw.
    #[error("Test Failed: {0}")]
    TestScript(String),

    /// User-initiated cancellation. Not surfaced as an error in chat.
    #[error("Generation stopped by user")]
    Aborted,

    /// Network/model failure at the transport level.
    #[error("Transport error: {0}")]
    Transport(String),

    /// AI provider API-level failure (non-secret detail only).
    #[error("Provider error: {message}")]
    Provider { message: String },

    /// Tool dispatch failure (unknown tool, malformed arguments).
    #[error("Tool error: {tool}: {message}")]
    Tool { tool: String, message: String },

    /// Engine configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catch-all for errors that do not yet have a dedicated variant.
    /// Prefer adding a specific variant over using this in new code.
    #[error("{0}")]
    Other(String),
}

// ── Convenience constructors ───────────────────────────────────────────────

impl EngineError {
    /// Create a tool error with name and message.
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

// ── Bridge: String → EngineError ───────────────────────────────────────────
// Allows `?` on functions still returning `Result<T, String>` (headless
// Chrome helpers and the like) inside functions that return `EngineResult<T>`.

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        EngineError::Other(s)
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        EngineError::Other(s.to_string())
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All engine operations should return this type.
pub type EngineResult<T> = Result<T, EngineError>;

// ── Conversion: EngineError → String ───────────────────────────────────────

impl From<EngineError> for String {
    fn from(e: EngineError) -> Self {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_messages_match_contract() {
        // These Display strings cross into the model's context verbatim.
        assert_eq!(
            EngineError::TestTimeout(5).to_string(),
            "Test timed out after 5s"
        );
        assert_eq!(
            EngineError::TestScript("missing button".into()).to_string(),
            "Test Failed: missing button"
        );
        assert_eq!(
            EngineError::PatchNotFound("css".into()).to_string(),
            "Could not find search string in css"
        );
    }

    #[test]
    fn invalid_target_names_the_offender() {
        let msg = EngineError::InvalidTarget("markdown".into()).to_string();
        assert!(msg.contains("markdown"));
        assert!(msg.contains("html"));
    }
}
