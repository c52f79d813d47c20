// engine/state.rs — Shared engine state, run lifecycle, and abort signals.

use crate::engine::console::ConsoleLogBuffer;
use crate::engine::project::ProjectStore;
use crate::engine::sandbox::SandboxRuntime;
use crate::engine::tool_executor::ToolExecutor;
use crate::engine::types::EngineConfig;
use log::info;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

// ── Run state machine ──────────────────────────────────────────────────

/// Where the agent loop currently is. `Aborted` is transient: the loop
/// passes through it and settles back on `Idle` so a new turn can start
/// immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Sending,
    StreamingText,
    AwaitingTool,
    Aborted,
}

// ── Abort signal ───────────────────────────────────────────────────────

struct AbortInner {
    aborted: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation for one turn. The loop races `cancelled()`
/// against stream reads, and checks `is_aborted()` after tool execution so
/// a late result never lands on an aborted message. Store mutations
/// already applied are NOT rolled back.
#[derive(Clone)]
pub struct AbortSignal(Arc<AbortInner>);

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortSignal {
    pub fn new() -> Self {
        AbortSignal(Arc::new(AbortInner {
            aborted: AtomicBool::new(false),
            notify: Notify::new(),
        }))
    }

    /// Request cancellation. Idempotent.
    pub fn abort(&self) {
        self.0.aborted.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.0.aborted.load(Ordering::SeqCst)
    }

    /// Resolves once `abort` has been called. Immediate when it already was.
    pub async fn cancelled(&self) {
        if self.is_aborted() {
            return;
        }
        let notified = self.0.notify.notified();
        tokio::pin!(notified);
        // Register interest before the re-check so an abort between the
        // two cannot be missed.
        notified.as_mut().enable();
        if self.is_aborted() {
            return;
        }
        notified.await;
    }
}

// ── Engine state ───────────────────────────────────────────────────────

/// Everything a running engine owns: the single-writer project store, the
/// console buffer, the sandbox, configuration, and the registry of active
/// runs used to enforce at-most-one-turn-per-session.
pub struct EngineState {
    pub project: Arc<Mutex<ProjectStore>>,
    pub console: ConsoleLogBuffer,
    pub sandbox: SandboxRuntime,
    pub config: Mutex<EngineConfig>,
    active_runs: Mutex<HashMap<String, AbortSignal>>,
}

impl EngineState {
    pub fn new(config: EngineConfig) -> Self {
        let console = ConsoleLogBuffer::new(config.console_capacity);
        EngineState {
            project: Arc::new(Mutex::new(ProjectStore::new())),
            console,
            sandbox: SandboxRuntime::new(),
            config: Mutex::new(config),
            active_runs: Mutex::new(HashMap::new()),
        }
    }

    pub fn executor(&self) -> ToolExecutor {
        ToolExecutor::new(
            Arc::clone(&self.project),
            self.sandbox.clone(),
            self.console.clone(),
        )
    }

    /// Register a fresh turn for the session, implicitly aborting any
    /// previous in-flight turn — a new user message supersedes it.
    pub fn begin_turn(&self, session_id: &str) -> AbortSignal {
        let signal = AbortSignal::new();
        let previous = self
            .active_runs
            .lock()
            .insert(session_id.to_string(), signal.clone());
        if let Some(prev) = previous {
            if !prev.is_aborted() {
                info!("[engine] New turn supersedes in-flight run session={session_id}");
                prev.abort();
            }
        }
        signal
    }

    pub fn end_turn(&self, session_id: &str) {
        self.active_runs.lock().remove(session_id);
    }

    /// Abort the session's in-flight turn, if any. Returns whether one
    /// was running.
    pub fn abort(&self, session_id: &str) -> bool {
        match self.active_runs.lock().get(session_id) {
            Some(signal) => {
                signal.abort();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_resolves_after_abort() {
        let signal = AbortSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        signal.abort();
        handle.await.unwrap();
        assert!(signal.is_aborted());
    }

    #[tokio::test]
    async fn cancelled_is_immediate_when_already_aborted() {
        let signal = AbortSignal::new();
        signal.abort();
        signal.cancelled().await;
    }

    #[test]
    fn new_turn_supersedes_previous() {
        let state = EngineState::new(EngineConfig::new(crate::engine::types::ProviderConfig {
            kind: crate::engine::types::ProviderKind::Google,
            api_key: "test".into(),
            model: "gemini-2.0-flash".into(),
            base_url: None,
        }));
        let first = state.begin_turn("s1");
        assert!(!first.is_aborted());
        let second = state.begin_turn("s1");
        assert!(first.is_aborted());
        assert!(!second.is_aborted());
        assert!(state.abort("s1"));
        assert!(second.is_aborted());
        state.end_turn("s1");
        assert!(!state.abort("s1"));
    }
}
