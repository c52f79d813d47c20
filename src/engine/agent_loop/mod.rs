// Zenith Agent Engine — Agentic Loop
// The core orchestration: send history to the model, consume the event
// stream into message parts, execute requested tools, feed results back,
// and repeat until the model stops asking for tools. Supports cooperative
// cancellation at every suspension point.

use crate::atoms::error::EngineResult;
use crate::engine::chat::{ChatMessage, ChatSession, ToolInvocation};
use crate::engine::providers::AnyProvider;
use crate::engine::state::{AbortSignal, RunState};
use crate::engine::tool_executor::ToolExecutor;
use crate::engine::types::{
    EngineEvent, FunctionCall, Message, Role, TokenUsage, ToolCall, ToolDefinition,
};
use futures::StreamExt;
use log::{info, warn};
use std::collections::BTreeMap;
use tokio::sync::mpsc::UnboundedSender;

// ── Outcome ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Final assistant text (possibly partial when aborted).
    pub text: String,
    /// Tool calls executed across all rounds of the turn.
    pub tool_calls: usize,
    pub aborted: bool,
    /// Whether any tool call mutated the project this turn — callers use
    /// this to decide on a preview refresh.
    pub project_mutated: bool,
}

/// Accumulator for one streamed tool call, keyed by its stream index.
#[derive(Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

// ── The loop ───────────────────────────────────────────────────────────

/// Run a complete agent turn against the session: appends the user message
/// and an assistant placeholder, then drives the model↔tools protocol to
/// its terminal state. Returns the assembled outcome; transport errors are
/// folded into the message as a trailing `[Error: …]` note rather than
/// discarding partial output.
#[allow(clippy::too_many_arguments)]
pub async fn run_agent_turn(
    session: &mut ChatSession,
    provider: &AnyProvider,
    model: &str,
    system_prompt: &str,
    tools: &[ToolDefinition],
    user_text: &str,
    executor: &ToolExecutor,
    events: &UnboundedSender<EngineEvent>,
    abort: &AbortSignal,
    max_rounds: u32,
    temperature: Option<f64>,
) -> EngineResult<TurnOutcome> {
    let run_id = format!("run_{}", uuid::Uuid::new_v4());
    let session_id = session.id.clone();
    let start_revision = executor.project_revision();

    // ── 1. Append the user message and an empty assistant placeholder ──
    session.messages.push(ChatMessage::new(Role::User, user_text));
    let assistant_idx = session.messages.len();
    session.messages.push(ChatMessage::placeholder(Role::Assistant));
    session.set_state(RunState::Sending);

    // ── 2. Provider-facing history: the system instruction, then every
    // prior turn except system-role chat entries (those are never
    // replayed to the model as conversation).
    let mut working: Vec<Message> = Vec::with_capacity(session.messages.len() + 1);
    working.push(Message::system(system_prompt));
    for msg in &session.messages[..assistant_idx] {
        if msg.role == Role::System || msg.content.is_empty() {
            continue;
        }
        working.push(Message::text(msg.role, msg.content.clone()));
    }

    let mut round: u32 = 0;
    let mut tool_calls_total: usize = 0;
    let mut last_input_tokens: u64 = 0;
    let mut total_output_tokens: u64 = 0;

    loop {
        round += 1;
        if round > max_rounds {
            warn!("[engine] Max tool rounds ({max_rounds}) reached, stopping");
            if session.messages[assistant_idx].content.is_empty() {
                session.messages[assistant_idx].push_text_delta(&format!(
                    "I completed {max_rounds} tool-call rounds but ran out of steps before \
                     writing a final summary."
                ));
            }
            break;
        }
        info!("[engine] Agent round {round}/{max_rounds} session={session_id} run={run_id}");

        // ── 3. Open the model stream (cancellable) ─────────────────────
        session.set_state(RunState::Sending);
        let opened = tokio::select! {
            biased;
            _ = abort.cancelled() => None,
            result = provider.chat_stream(&working, tools, model, temperature) => Some(result),
        };
        let Some(opened) = opened else {
            return Ok(finish_aborted(
                session,
                assistant_idx,
                events,
                &run_id,
                tool_calls_total,
                executor.project_revision() != start_revision,
            ));
        };
        let mut stream = match opened {
            Ok(s) => s,
            Err(e) => {
                return Ok(finish_with_error(
                    session,
                    assistant_idx,
                    events,
                    &run_id,
                    &e.to_string(),
                    tool_calls_total,
                    executor.project_revision() != start_revision,
                ));
            }
        };

        // ── 4. Consume stream events in arrival order ──────────────────
        let mut pending_calls: BTreeMap<usize, PendingToolCall> = BTreeMap::new();
        let mut round_text = String::new();
        let mut aborted = false;
        let mut stream_error: Option<String> = None;

        loop {
            let item = tokio::select! {
                biased;
                _ = abort.cancelled() => {
                    aborted = true;
                    break;
                }
                item = stream.next() => item,
            };
            let Some(item) = item else { break };
            let chunk = match item {
                Ok(c) => c,
                Err(e) => {
                    stream_error = Some(e.to_string());
                    break;
                }
            };

            if let Some(delta) = &chunk.delta_text {
                session.set_state(RunState::StreamingText);
                round_text.push_str(delta);
                session.messages[assistant_idx].push_text_delta(delta);
                let _ = events.send(EngineEvent::Delta {
                    session_id: session_id.clone(),
                    run_id: run_id.clone(),
                    text: delta.clone(),
                });
            }

            for tc in &chunk.tool_calls {
                let entry = pending_calls.entry(tc.index).or_default();
                if let Some(id) = &tc.id {
                    entry.id = id.clone();
                }
                if let Some(name) = &tc.function_name {
                    entry.name = name.clone();
                }
                if let Some(fragment) = &tc.arguments_delta {
                    entry.arguments.push_str(fragment);
                }
            }

            if let Some(usage) = &chunk.usage {
                // Input tokens reflect the whole context each round — keep
                // only the last; output tokens are incremental — sum them.
                if usage.input_tokens > 0 {
                    last_input_tokens = usage.input_tokens;
                }
                total_output_tokens += usage.output_tokens;
            }
        }
        // Dropping the stream here releases the transport before any tool
        // work (and is the actual cancellation on the abort path).
        drop(stream);

        if aborted {
            return Ok(finish_aborted(
                session,
                assistant_idx,
                events,
                &run_id,
                tool_calls_total,
                executor.project_revision() != start_revision,
            ));
        }
        if let Some(reason) = stream_error {
            return Ok(finish_with_error(
                session,
                assistant_idx,
                events,
                &run_id,
                &reason,
                tool_calls_total,
                executor.project_revision() != start_revision,
            ));
        }

        // ── 5. No tool calls → the turn reached its terminal state ─────
        if pending_calls.is_empty() {
            break;
        }

        // ── 6. Materialize the batch with stable call IDs. The provider's
        // ID is used when present; otherwise one is minted locally and
        // reused for the entire call→result pair — correlation is by ID,
        // not position, because results can land out of order.
        let mut tool_calls: Vec<ToolCall> = Vec::with_capacity(pending_calls.len());
        for (_, pending) in pending_calls {
            let call_id = if pending.id.is_empty() {
                format!("call_{}", uuid::Uuid::new_v4())
            } else {
                pending.id
            };
            tool_calls.push(ToolCall {
                id: call_id,
                call_type: "function".into(),
                function: FunctionCall {
                    name: pending.name,
                    arguments: pending.arguments,
                },
            });
        }

        working.push(Message {
            role: Role::Assistant,
            content: round_text.clone(),
            tool_calls: Some(tool_calls.clone()),
            tool_call_id: None,
            name: None,
        });

        // ── 7. Execute sequentially, in emission order — later calls in
        // the batch must see earlier calls' store mutations.
        session.set_state(RunState::AwaitingTool);
        for call in &tool_calls {
            info!("[engine] Tool call: {} id={}", call.function.name, call.id);
            tool_calls_total += 1;

            let args_value = serde_json::from_str(&call.function.arguments)
                .unwrap_or_else(|_| serde_json::json!({}));
            session.messages[assistant_idx].push_tool_invocation(ToolInvocation {
                tool_call_id: call.id.clone(),
                tool_name: call.function.name.clone(),
                args: args_value,
                result: None,
            });
            let _ = events.send(EngineEvent::ToolCallEvent {
                session_id: session_id.clone(),
                run_id: run_id.clone(),
                tool_call: call.clone(),
            });

            let result = executor.execute_tool(call).await;

            // A result arriving after an abort is dropped — it must not be
            // appended to a message already marked aborted.
            if abort.is_aborted() {
                return Ok(finish_aborted(
                    session,
                    assistant_idx,
                    events,
                    &run_id,
                    tool_calls_total,
                    executor.project_revision() != start_revision,
                ));
            }

            info!(
                "[engine] Tool result: {} success={}",
                call.function.name, result.success
            );
            session.messages[assistant_idx]
                .attach_tool_result(&call.id, result.payload.clone());
            let _ = events.send(EngineEvent::ToolResultEvent {
                session_id: session_id.clone(),
                run_id: run_id.clone(),
                tool_call_id: call.id.clone(),
                payload: result.payload.clone(),
                success: result.success,
            });

            working.push(Message::tool_result(
                &call.id,
                &call.function.name,
                result.model_output(),
            ));
        }

        info!(
            "[engine] {} tool calls executed, feeding results back to model",
            tool_calls.len()
        );
        // Continue the loop — the model sees the results and either
        // responds with text or requests more tools.
    }

    // ── 8. Terminal state ──────────────────────────────────────────────
    let final_text = session.messages[assistant_idx].content.clone();
    let usage = (last_input_tokens > 0 || total_output_tokens > 0).then(|| TokenUsage {
        input_tokens: last_input_tokens,
        output_tokens: total_output_tokens,
        total_tokens: last_input_tokens + total_output_tokens,
    });
    let _ = events.send(EngineEvent::Complete {
        session_id,
        run_id,
        text: final_text.clone(),
        tool_calls_count: tool_calls_total,
        usage,
    });
    session.set_state(RunState::Idle);

    Ok(TurnOutcome {
        text: final_text,
        tool_calls: tool_calls_total,
        aborted: false,
        project_mutated: executor.project_revision() != start_revision,
    })
}

// ── Terminal helpers ───────────────────────────────────────────────────

/// Wind down an aborted turn: partial text and completed tool results stay
/// visible, the state machine passes through Aborted and settles on Idle
/// so the next turn can start immediately.
fn finish_aborted(
    session: &mut ChatSession,
    assistant_idx: usize,
    events: &UnboundedSender<EngineEvent>,
    run_id: &str,
    tool_calls: usize,
    project_mutated: bool,
) -> TurnOutcome {
    info!("[engine] Generation stopped by user run={run_id}");
    session.set_state(RunState::Aborted);
    let _ = events.send(EngineEvent::Aborted {
        session_id: session.id.clone(),
        run_id: run_id.to_string(),
    });
    session.set_state(RunState::Idle);
    TurnOutcome {
        text: session.messages[assistant_idx].content.clone(),
        tool_calls,
        aborted: true,
        project_mutated,
    }
}

/// Fold a transport/model failure into the assistant message as a trailing
/// note instead of discarding what already streamed.
fn finish_with_error(
    session: &mut ChatSession,
    assistant_idx: usize,
    events: &UnboundedSender<EngineEvent>,
    run_id: &str,
    reason: &str,
    tool_calls: usize,
    project_mutated: bool,
) -> TurnOutcome {
    warn!("[engine] Turn failed run={run_id}: {reason}");
    session.messages[assistant_idx].push_text_delta(&format!("\n\n[Error: {reason}]"));
    let _ = events.send(EngineEvent::Error {
        session_id: session.id.clone(),
        run_id: run_id.to_string(),
        message: reason.to_string(),
    });
    session.set_state(RunState::Idle);
    TurnOutcome {
        text: session.messages[assistant_idx].content.clone(),
        tool_calls,
        aborted: false,
        project_mutated,
    }
}
