// Zenith integration tests — single binary.
// Drives the real agent loop against a scripted provider so the streaming
// protocol, tool dispatch, and cancellation paths run end-to-end without a
// network. Browser-dependent scenarios are #[ignore]d; run them with
// `cargo test -- --ignored` where Chrome is installed.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use zenith::engine::agent_loop::run_agent_turn;
use zenith::engine::prompts::SYSTEM_INSTRUCTION;
use zenith::engine::types::{
    EngineConfig, Message, ProviderConfig, ProviderKind, StreamChunk, ToolCall, ToolCallDelta,
    ToolDefinition, FunctionCall,
};
use zenith::{
    AiProvider, AnyProvider, ChatSession, ChunkStream, ConsoleLog, ConsoleLogBuffer, EngineEvent,
    EngineState, LogLevel, MessagePart, ProviderError, RunState,
};

// ── Scripted provider ──────────────────────────────────────────────────

struct ScriptedTurn {
    items: Vec<Result<StreamChunk, ProviderError>>,
    hang_after: bool,
}

impl ScriptedTurn {
    fn chunks(chunks: Vec<StreamChunk>) -> Self {
        ScriptedTurn {
            items: chunks.into_iter().map(Ok).collect(),
            hang_after: false,
        }
    }
}

struct ScriptedProvider {
    turns: Mutex<VecDeque<ScriptedTurn>>,
}

impl ScriptedProvider {
    fn new(turns: Vec<ScriptedTurn>) -> AnyProvider {
        AnyProvider::from_provider(Box::new(ScriptedProvider {
            turns: Mutex::new(turns.into()),
        }))
    }
}

#[async_trait]
impl AiProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Custom
    }

    async fn chat_stream(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
        _model: &str,
        _temperature: Option<f64>,
    ) -> Result<ChunkStream, ProviderError> {
        let turn = self
            .turns
            .lock()
            .pop_front()
            .expect("scripted provider ran out of turns");
        let head = stream::iter(turn.items);
        if turn.hang_after {
            Ok(head.chain(stream::pending()).boxed())
        } else {
            Ok(head.boxed())
        }
    }
}

fn text_chunk(text: &str) -> StreamChunk {
    StreamChunk {
        delta_text: Some(text.to_string()),
        ..Default::default()
    }
}

fn tool_chunk(index: usize, id: Option<&str>, name: &str, args: &str) -> StreamChunk {
    StreamChunk {
        tool_calls: vec![ToolCallDelta {
            index,
            id: id.map(|s| s.to_string()),
            // continuation fragments carry no name, like real deltas
            function_name: (!name.is_empty()).then(|| name.to_string()),
            arguments_delta: Some(args.to_string()),
        }],
        ..Default::default()
    }
}

// ── Harness ────────────────────────────────────────────────────────────

fn test_state() -> EngineState {
    EngineState::new(EngineConfig::new(ProviderConfig {
        kind: ProviderKind::Custom,
        api_key: "test-key".into(),
        model: "scripted".into(),
        base_url: Some("http://localhost:0".into()),
    }))
}

struct TurnHarness {
    state: EngineState,
    session: ChatSession,
    events_rx: tokio::sync::mpsc::UnboundedReceiver<EngineEvent>,
    events_tx: tokio::sync::mpsc::UnboundedSender<EngineEvent>,
}

impl TurnHarness {
    fn new() -> Self {
        let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
        TurnHarness {
            state: test_state(),
            session: ChatSession::new(),
            events_rx,
            events_tx,
        }
    }

    async fn run(
        &mut self,
        provider: &AnyProvider,
        user_text: &str,
        abort: &zenith::AbortSignal,
    ) -> zenith::TurnOutcome {
        let executor = self.state.executor();
        run_agent_turn(
            &mut self.session,
            provider,
            "scripted",
            SYSTEM_INSTRUCTION,
            &ToolDefinition::builtins(),
            user_text,
            &executor,
            &self.events_tx,
            abort,
            12,
            None,
        )
        .await
        .expect("turn should not error")
    }

    fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn assistant(&self) -> &zenith::ChatMessage {
        self.session
            .messages
            .last()
            .expect("session has messages")
    }
}

// ── Scenario: "make the background blue" ───────────────────────────────

#[tokio::test]
async fn patch_scenario_applies_exactly_one_change() {
    let mut harness = TurnHarness::new();
    harness.state.project.lock().update_file(
        zenith::FileTarget::Css,
        "body { background: white; color: black; }".into(),
    );

    let provider = ScriptedProvider::new(vec![
        ScriptedTurn::chunks(vec![
            text_chunk("Sure — patching the stylesheet."),
            tool_chunk(
                0,
                Some("call_p1"),
                "patch_file",
                r#"{"target":"css","search_string":"background: white;","replacement_string":"background: blue;"}"#,
            ),
        ]),
        ScriptedTurn::chunks(vec![text_chunk("Done! The background is now blue.")]),
    ]);

    let abort = zenith::AbortSignal::new();
    let outcome = harness.run(&provider, "make the background blue", &abort).await;

    assert!(!outcome.aborted);
    assert!(outcome.project_mutated);
    assert_eq!(outcome.tool_calls, 1);

    let project = harness.state.project.lock().read_files();
    assert_eq!(project.css, "body { background: blue; color: black; }");

    // message structure: text part, tool invocation (completed), text part
    let msg = harness.assistant();
    assert_eq!(msg.parts.len(), 3);
    assert_eq!(msg.content, msg.concatenated_text());
    assert!(msg.content.ends_with("Done! The background is now blue."));
    match &msg.parts[1] {
        MessagePart::ToolInvocation { tool_invocation } => {
            assert_eq!(tool_invocation.tool_call_id, "call_p1");
            assert_eq!(tool_invocation.tool_name, "patch_file");
            let result = tool_invocation.result.as_ref().expect("result attached");
            assert_eq!(result["status"], "success");
        }
        other => panic!("expected tool invocation, got {other:?}"),
    }

    // event order: deltas, tool call, tool result, complete
    let events = harness.drain_events();
    assert!(matches!(events.last(), Some(EngineEvent::Complete { tool_calls_count: 1, .. })));
    assert_eq!(harness.session.state(), RunState::Idle);
}

// ── Stable fallback IDs ────────────────────────────────────────────────

#[tokio::test]
async fn missing_provider_id_gets_one_stable_fallback() {
    let mut harness = TurnHarness::new();
    let provider = ScriptedProvider::new(vec![
        ScriptedTurn::chunks(vec![tool_chunk(0, None, "read_files", "{}")]),
        ScriptedTurn::chunks(vec![text_chunk("Read them.")]),
    ]);

    let abort = zenith::AbortSignal::new();
    harness.run(&provider, "what's in the files?", &abort).await;

    let (invocation_id, has_result) = {
        let msg = harness.assistant();
        let invocation = msg.tool_invocations().next().expect("one invocation");
        (invocation.tool_call_id.clone(), invocation.result.is_some())
    };
    assert!(invocation_id.starts_with("call_"));
    // the generated ID was reused for the result side — it attached
    assert!(has_result);

    let events = harness.drain_events();
    let call_id = events.iter().find_map(|e| match e {
        EngineEvent::ToolCallEvent { tool_call, .. } => Some(tool_call.id.clone()),
        _ => None,
    });
    let result_id = events.iter().find_map(|e| match e {
        EngineEvent::ToolResultEvent { tool_call_id, .. } => Some(tool_call_id.clone()),
        _ => None,
    });
    assert_eq!(call_id, result_id);
    assert_eq!(call_id.as_deref(), Some(invocation_id.as_str()));
}

// ── Batched calls run sequentially and see earlier effects ─────────────

#[tokio::test]
async fn batched_tool_calls_execute_in_emission_order() {
    let mut harness = TurnHarness::new();
    harness
        .state
        .project
        .lock()
        .update_file(zenith::FileTarget::Css, "a { color: red; }".into());

    // The second patch only matches if the first one already applied.
    let provider = ScriptedProvider::new(vec![
        ScriptedTurn::chunks(vec![
            tool_chunk(
                0,
                Some("call_1"),
                "patch_file",
                r#"{"target":"css","search_string":"color: red;","replacement_string":"color: green;"}"#,
            ),
            tool_chunk(
                1,
                Some("call_2"),
                "patch_file",
                r#"{"target":"css","search_string":"color: green;","replacement_string":"color: blue;"}"#,
            ),
        ]),
        ScriptedTurn::chunks(vec![text_chunk("Recolored twice.")]),
    ]);

    let abort = zenith::AbortSignal::new();
    let outcome = harness.run(&provider, "recolor", &abort).await;

    assert_eq!(outcome.tool_calls, 2);
    let project = harness.state.project.lock().read_files();
    assert_eq!(project.css, "a { color: blue; }");

    let msg = harness.assistant();
    let results: Vec<(&str, &str)> = msg
        .tool_invocations()
        .map(|ti| {
            (
                ti.tool_call_id.as_str(),
                ti.result.as_ref().unwrap()["status"].as_str().unwrap(),
            )
        })
        .collect();
    assert_eq!(results, vec![("call_1", "success"), ("call_2", "success")]);
}

// ── Split argument deltas reassemble per call index ────────────────────

#[tokio::test]
async fn streamed_argument_fragments_reassemble() {
    let mut harness = TurnHarness::new();
    let provider = ScriptedProvider::new(vec![
        ScriptedTurn::chunks(vec![
            tool_chunk(0, Some("call_u"), "update_file", r#"{"target":"java"#),
            tool_chunk(0, None, "", r#"script","content":"const n = 7;"}"#),
        ]),
        ScriptedTurn::chunks(vec![text_chunk("Updated the script.")]),
    ]);

    let abort = zenith::AbortSignal::new();
    harness.run(&provider, "set n to 7", &abort).await;

    let project = harness.state.project.lock().read_files();
    assert_eq!(project.javascript, "const n = 7;");
}

// ── Cancellation ───────────────────────────────────────────────────────

#[tokio::test]
async fn abort_mid_stream_keeps_partial_text_and_resets_to_idle() {
    let mut harness = TurnHarness::new();
    let provider = ScriptedProvider::new(vec![ScriptedTurn {
        items: vec![Ok(text_chunk("Working on ")), Ok(text_chunk("it"))],
        hang_after: true,
    }]);

    let abort = zenith::AbortSignal::new();
    let trigger = abort.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.abort();
    });

    let outcome = harness.run(&provider, "build me a site", &abort).await;

    assert!(outcome.aborted);
    assert_eq!(outcome.text, "Working on it");
    assert_eq!(harness.assistant().content, "Working on it");
    assert_eq!(harness.session.state(), RunState::Idle);

    let events = harness.drain_events();
    assert!(matches!(events.last(), Some(EngineEvent::Aborted { .. })));
    assert!(!events.iter().any(|e| matches!(e, EngineEvent::Complete { .. })));
}

#[tokio::test]
async fn superseded_turn_aborts_before_touching_anything() {
    // A turn whose signal is already aborted (superseded by a newer user
    // message) winds down at its first suspension point: no tool runs, no
    // store mutation, and the placeholder stays empty.
    let mut harness = TurnHarness::new();
    let provider = ScriptedProvider::new(vec![ScriptedTurn::chunks(vec![tool_chunk(
        0,
        Some("call_1"),
        "update_file",
        r#"{"target":"css","content":"/* new */"}"#,
    )])]);

    let abort = zenith::AbortSignal::new();
    abort.abort();

    let outcome = harness.run(&provider, "restyle", &abort).await;
    assert!(outcome.aborted);
    assert!(!outcome.project_mutated);
    assert_eq!(outcome.tool_calls, 0);
    assert!(harness.assistant().parts.is_empty());
    assert_eq!(harness.session.state(), RunState::Idle);
}

// ── Transport failures fold into the message ───────────────────────────

#[tokio::test]
async fn stream_error_appends_trailing_note() {
    let mut harness = TurnHarness::new();
    let provider = ScriptedProvider::new(vec![ScriptedTurn {
        items: vec![
            Ok(text_chunk("Here is the plan")),
            Err(ProviderError::Transport("connection reset".into())),
        ],
        hang_after: false,
    }]);

    let abort = zenith::AbortSignal::new();
    let outcome = harness.run(&provider, "plan it", &abort).await;

    assert!(!outcome.aborted);
    assert_eq!(
        outcome.text,
        "Here is the plan\n\n[Error: Transport error: connection reset]"
    );
    assert_eq!(harness.assistant().content, harness.assistant().concatenated_text());
    assert_eq!(harness.session.state(), RunState::Idle);

    let events = harness.drain_events();
    assert!(events.iter().any(|e| matches!(e, EngineEvent::Error { .. })));
}

// ── Round cap ──────────────────────────────────────────────────────────

#[tokio::test]
async fn max_rounds_stops_a_tool_calling_loop() {
    let mut harness = TurnHarness::new();
    let looping_turn = || ScriptedTurn::chunks(vec![tool_chunk(0, None, "read_files", "{}")]);
    let provider = ScriptedProvider::new(vec![looping_turn(), looping_turn()]);

    let executor = harness.state.executor();
    let abort = zenith::AbortSignal::new();
    let outcome = run_agent_turn(
        &mut harness.session,
        &provider,
        "scripted",
        SYSTEM_INSTRUCTION,
        &ToolDefinition::builtins(),
        "loop forever",
        &executor,
        &harness.events_tx,
        &abort,
        2, // cap at two rounds
        None,
    )
    .await
    .unwrap();

    assert_eq!(outcome.tool_calls, 2);
    assert!(outcome.text.contains("ran out of steps"));
    assert_eq!(harness.session.state(), RunState::Idle);
}

// ── Executor normalization (no loop involved) ──────────────────────────

fn call(name: &str, args: &str) -> ToolCall {
    ToolCall {
        id: "call_t".into(),
        call_type: "function".into(),
        function: FunctionCall {
            name: name.into(),
            arguments: args.into(),
        },
    }
}

#[tokio::test]
async fn executor_normalizes_failures_into_error_payloads() {
    let state = test_state();
    let executor = state.executor();

    let unknown = executor.execute_tool(&call("launch_missiles", "{}")).await;
    assert!(!unknown.success);
    assert!(unknown.payload["message"].as_str().unwrap().contains("Unknown tool"));

    let bad_target = executor
        .execute_tool(&call("update_file", r#"{"target":"markdown","content":"x"}"#))
        .await;
    assert!(!bad_target.success);
    assert!(bad_target.payload["message"].as_str().unwrap().contains("markdown"));

    let not_found = executor
        .execute_tool(&call(
            "patch_file",
            r#"{"target":"html","search_string":"<article>","replacement_string":"<section>"}"#,
        ))
        .await;
    assert!(!not_found.success);
    assert_eq!(
        not_found.payload["message"],
        "Could not find search string in html"
    );
}

#[tokio::test]
async fn executor_read_follows_write_within_a_turn() {
    let state = test_state();
    let executor = state.executor();

    let update = executor
        .execute_tool(&call(
            "update_file",
            r#"{"target":"javascript","content":"let ready = true;"}"#,
        ))
        .await;
    assert!(update.success);
    assert_eq!(update.payload["message"], "Updated javascript");

    let read = executor.execute_tool(&call("read_files", "{}")).await;
    assert!(read.success);
    assert_eq!(read.payload["files"]["javascript"], "let ready = true;");
    // untouched fields come from the default project
    assert_eq!(read.payload["files"]["css"], "/* Styles */");
}

#[tokio::test]
async fn executor_reports_lenient_patches() {
    let state = test_state();
    state
        .project
        .lock()
        .update_file(zenith::FileTarget::Css, "h1 { font-size: 2rem; }".into());
    let executor = state.executor();

    let patched = executor
        .execute_tool(&call(
            "patch_file",
            r#"{"target":"css","search_string":"  h1 { font-size: 2rem; }\n","replacement_string":"h1 { font-size: 3rem; }"}"#,
        ))
        .await;
    assert!(patched.success);
    assert_eq!(patched.payload["message"], "Patched with lenient match");
}

#[tokio::test]
async fn console_logs_tool_formats_or_reports_none() {
    let state = test_state();
    let executor = state.executor();

    let empty = executor.execute_tool(&call("read_console_logs", "{}")).await;
    assert!(empty.success);
    assert_eq!(empty.payload["logs"], "No console logs found.");

    state.console.push(ConsoleLog::new(LogLevel::Log, "app started"));
    state
        .console
        .push(ConsoleLog::new(LogLevel::Error, "boom (Line: 4)"));
    let full = executor.execute_tool(&call("read_console_logs", "{}")).await;
    assert_eq!(full.payload["logs"], "[LOG] app started\n[ERROR] boom (Line: 4)");
}

// ── Console buffer bounds ──────────────────────────────────────────────

#[test]
fn console_buffer_evicts_oldest_first() {
    let buffer = ConsoleLogBuffer::new(100);
    for i in 0..130 {
        buffer.push(ConsoleLog::new(LogLevel::Info, format!("line {i}")));
    }
    let survivors = buffer.snapshot();
    assert_eq!(survivors.len(), 100);
    assert_eq!(survivors.first().unwrap().message, "line 30");
    assert_eq!(survivors.last().unwrap().message, "line 129");
}

// ── Browser-bound scenarios (need Chrome) ──────────────────────────────

mod browser {
    use super::*;
    use std::time::Instant;
    use zenith::engine::sandbox::SandboxRuntime;
    use zenith::Project;

    fn sample_project() -> Project {
        Project {
            html: "<!DOCTYPE html><html><head><title>s</title></head>\
                   <body><button id=\"go\">Go</button></body></html>"
                .into(),
            css: "button { background: blue; }".into(),
            javascript: "document.getElementById('go').addEventListener('click', () => {});"
                .into(),
        }
    }

    #[tokio::test]
    #[ignore = "requires Chrome"]
    async fn screenshot_returns_png_data_uri() {
        let runtime = SandboxRuntime::new();
        let capture = runtime.screenshot(&sample_project()).await.unwrap();
        assert!(capture.data_uri.starts_with("data:image/png;base64,"));
        assert_eq!((capture.width, capture.height), (1280, 800));
    }

    #[tokio::test]
    #[ignore = "requires Chrome"]
    async fn validate_passes_a_clean_script() {
        let runtime = SandboxRuntime::new();
        runtime
            .validate(
                &sample_project(),
                "const b = document.querySelector('button'); if (!b) throw new Error('Button missing'); b.click();",
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore = "requires Chrome"]
    async fn validate_surfaces_thrown_errors() {
        let runtime = SandboxRuntime::new();
        let err = runtime
            .validate(&sample_project(), "throw new Error('missing button')")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Test Failed: missing button");
    }

    #[tokio::test]
    #[ignore = "requires Chrome"]
    async fn validate_times_out_at_or_after_five_seconds() {
        let runtime = SandboxRuntime::new();
        let started = Instant::now();
        let err = runtime
            .validate(&sample_project(), "while (true) {}")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Test timed out after 5s");
        assert!(started.elapsed() >= Duration::from_secs(5));
    }
}
