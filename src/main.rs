// Zenith CLI — terminal chat front-end for the agent engine.
// Streams deltas and tool activity to the terminal; Ctrl-C aborts the
// in-flight turn without losing partial output.

use clap::{Parser, ValueEnum};
use log::warn;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use zenith::engine::export::write_project_files;
use zenith::engine::preview::PreviewSurface;
use zenith::engine::prompts::SYSTEM_INSTRUCTION;
use zenith::engine::types::ToolDefinition;
use zenith::{
    run_agent_turn, AnyProvider, ChatSession, EngineConfig, EngineEvent, EngineResult,
    EngineState, ProviderConfig, ProviderKind,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProviderArg {
    Google,
    Groq,
    Openai,
    Custom,
}

impl From<ProviderArg> for ProviderKind {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Google => ProviderKind::Google,
            ProviderArg::Groq => ProviderKind::Groq,
            ProviderArg::Openai => ProviderKind::OpenAI,
            ProviderArg::Custom => ProviderKind::Custom,
        }
    }
}

#[derive(Parser)]
#[command(name = "zenith", version, about = "Zenith — AI web-coding agent")]
struct Cli {
    /// Provider backend
    #[arg(long, value_enum, default_value_t = ProviderArg::Google)]
    provider: ProviderArg,

    /// Model ID (defaults to the provider's standard model)
    #[arg(long)]
    model: Option<String>,

    /// API key
    #[arg(long, env = "ZENITH_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Override the provider base URL (required for --provider custom)
    #[arg(long)]
    base_url: Option<String>,

    /// Sampling temperature
    #[arg(long)]
    temperature: Option<f64>,

    /// Maximum tool-call rounds per turn
    #[arg(long, default_value_t = 12)]
    max_tool_rounds: u32,

    /// Disable the live preview surface (chat works without Chrome, but
    /// read_console_logs will stay empty)
    #[arg(long)]
    no_preview: bool,

    /// Directory to export the project into on :quit
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Override the built-in system instruction
    #[arg(long, env = "ZENITH_SYSTEM_PROMPT", hide_env_values = true)]
    system_prompt: Option<String>,
}

#[tokio::main]
async fn main() -> EngineResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let kind: ProviderKind = cli.provider.into();
    if kind == ProviderKind::Custom && cli.base_url.is_none() {
        eprintln!("error: --provider custom requires --base-url");
        std::process::exit(2);
    }
    let model = cli
        .model
        .clone()
        .unwrap_or_else(|| kind.default_model().to_string());

    let provider_config = ProviderConfig {
        kind,
        api_key: cli.api_key.clone(),
        model: model.clone(),
        base_url: cli.base_url.clone(),
    };
    let mut config = EngineConfig::new(provider_config.clone());
    config.max_tool_rounds = cli.max_tool_rounds;
    config.temperature = cli.temperature;
    config.system_prompt = cli.system_prompt.clone();

    let state = EngineState::new(config);
    let provider = AnyProvider::from_config(&provider_config);
    let executor = state.executor();
    let tools = ToolDefinition::builtins();
    let mut session = ChatSession::new();

    // Event printer: deltas inline, tool activity as one-liners.
    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel::<EngineEvent>();
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                EngineEvent::Delta { text, .. } => {
                    print!("{text}");
                    std::io::stdout().flush().ok();
                }
                EngineEvent::ToolCallEvent { tool_call, .. } => {
                    println!("\n  ⚙ {}({})", tool_call.function.name, tool_call.function.arguments);
                }
                EngineEvent::ToolResultEvent { payload, success, .. } => {
                    let mark = if success { "✓" } else { "✗" };
                    let message = payload["message"].as_str().unwrap_or("done");
                    println!("  {mark} {message}");
                }
                EngineEvent::Error { message, .. } => println!("\n  [Error: {message}]"),
                EngineEvent::Aborted { .. } => println!("\n  (stopped)"),
                EngineEvent::Complete { .. } => {}
            }
        }
    });

    // Live preview: console interception only works while this is up.
    let preview = if cli.no_preview {
        None
    } else {
        let surface = PreviewSurface::new(state.sandbox.clone(), state.console.clone());
        let pump = surface.spawn_pump();
        Some((surface, pump))
    };

    println!("{}\n", session.messages[0].content);
    println!("Commands: :files  :logs  :export <dir>  :quit   (Ctrl-C stops a running turn)\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        std::io::stdout().flush().ok();
        let Ok(Some(line)) = lines.next_line().await else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            ":quit" | ":q" => break,
            ":files" => {
                let project = state.project.lock().read_files();
                println!(
                    "index.html: {} bytes\nstyles.css: {} bytes\nscript.js: {} bytes",
                    project.html.len(),
                    project.css.len(),
                    project.javascript.len()
                );
                continue;
            }
            ":logs" => {
                println!("{}", state.console.format_for_model());
                continue;
            }
            _ => {}
        }
        if let Some(dir) = input.strip_prefix(":export ") {
            let project = state.project.lock().read_files();
            match write_project_files(&project, Path::new(dir.trim())) {
                Ok(()) => println!("exported to {dir}"),
                Err(e) => eprintln!("export failed: {e}"),
            }
            continue;
        }

        // ── Run one turn, racing Ctrl-C against it ─────────────────────
        let abort = state.begin_turn(&session.id);
        let (temperature, max_rounds, system_prompt) = {
            let config = state.config.lock();
            (
                config.temperature,
                config.max_tool_rounds,
                config
                    .system_prompt
                    .clone()
                    .unwrap_or_else(|| SYSTEM_INSTRUCTION.to_string()),
            )
        };
        let outcome = {
            let turn = run_agent_turn(
                &mut session,
                &provider,
                &model,
                &system_prompt,
                &tools,
                input,
                &executor,
                &events_tx,
                &abort,
                max_rounds,
                temperature,
            );
            tokio::pin!(turn);
            loop {
                tokio::select! {
                    result = &mut turn => break result,
                    _ = tokio::signal::ctrl_c() => abort.abort(),
                }
            }
        };
        state.end_turn(&session.id);
        println!();

        match outcome {
            Ok(outcome) => {
                if outcome.project_mutated {
                    if let Some((surface, _)) = &preview {
                        let project = state.project.lock().read_files();
                        if let Err(e) = surface.refresh(&project).await {
                            warn!("[preview] refresh failed: {e}");
                        }
                    }
                }
            }
            Err(e) => eprintln!("turn failed: {e}"),
        }
    }

    if let Some(dir) = &cli.export_dir {
        let project = state.project.lock().read_files();
        write_project_files(&project, dir)?;
        println!("exported to {}", dir.display());
    }
    if let Some((surface, pump)) = preview {
        pump.abort();
        surface.close();
    }
    Ok(())
}
