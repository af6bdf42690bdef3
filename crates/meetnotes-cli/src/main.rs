//! CLI for the meeting-notes question watcher.
//!
//! Subcommands:
//!  - `watch`  : watch a notes directory and propose a question after every
//!               real change to a note, until Ctrl-C.
//!  - `window` : parse one note and print the context window that would be
//!               sent, without calling the generation service.
//!
//! Every option falls back to an environment variable where one is listed in
//! `--help`; the API key is only read from `OPENAI_TOKEN` / `OPENAI_API_KEY`.
//!
//! Usage examples:
//!  meetnotes-questions watch --root ~/notes --pattern '2023*.txt'
//!  meetnotes-questions window ~/notes/standup.txt --json

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use meetnotes::config::{
    DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_PATTERN, DEFAULT_ROOT, DEFAULT_SYSTEM_PROMPT,
    DEFAULT_TOKEN_BUDGET,
};
use meetnotes::{
    build_context_window, parse_conversation_with_stats, CharEstimateTokenizer, DispatchSummary,
    Dispatcher, Generated, GeneratorConfig, Message, OpenAiGenerator, RawNote, Tokenizer, WatchConfig,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

mod watcher;

#[derive(Parser)]
#[command(
    name = "meetnotes-questions",
    about = "Propose follow-up questions while you take meeting notes",
    version
)]
struct Cli {
    /// Log level used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info", env = "MEETNOTES_LOG")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a notes directory and generate questions as notes change.
    Watch(WatchArgs),

    /// Print the context window for a single note file.
    Window(WindowArgs),
}

/// Options shared by both subcommands.
#[derive(Args, Debug)]
struct WindowOptions {
    /// Maximum tokens for the system prompt plus kept turns.
    #[arg(long, default_value_t = DEFAULT_TOKEN_BUDGET, env = "MEETNOTES_TOKEN_BUDGET")]
    token_budget: usize,

    /// System prompt placed first in every window.
    #[arg(long, default_value = DEFAULT_SYSTEM_PROMPT, env = "MEETNOTES_SYSTEM_PROMPT", hide_default_value = true)]
    system_prompt: String,

    /// HuggingFace tokenizer.json for exact token counts.
    #[cfg(feature = "hf-tokenizer")]
    #[arg(long, value_name = "PATH", env = "MEETNOTES_TOKENIZER")]
    tokenizer: Option<PathBuf>,

    /// Count with the OpenAI BPE encoding of this model (e.g. gpt-3.5-turbo).
    #[cfg(feature = "tiktoken")]
    #[arg(long, value_name = "MODEL", env = "MEETNOTES_TOKENIZER_MODEL")]
    tokenizer_model: Option<String>,
}

#[derive(Args, Debug)]
struct WatchArgs {
    /// Directory containing the notes (a leading `~` is expanded).
    #[arg(long, value_name = "DIR", default_value = DEFAULT_ROOT, env = "MEETNOTES_ROOT")]
    root: PathBuf,

    /// File-name glob selecting note files.
    #[arg(long, default_value = DEFAULT_PATTERN, env = "MEETNOTES_PATTERN")]
    pattern: String,

    /// Also watch subdirectories.
    #[arg(long)]
    recursive: bool,

    /// Do not append questions to `<note>.log`.
    #[arg(long)]
    no_transcript: bool,

    /// Chat model used for generation.
    #[arg(long, default_value = DEFAULT_MODEL, env = "MEETNOTES_MODEL")]
    model: String,

    /// OpenAI-compatible API base URL.
    #[arg(long, default_value = DEFAULT_BASE_URL, env = "OPENAI_BASE_URL")]
    base_url: String,

    #[command(flatten)]
    window: WindowOptions,
}

#[derive(Args, Debug)]
struct WindowArgs {
    /// Note file to parse.
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Print the window as pretty JSON.
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    window: WindowOptions,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Watch(args) => run_watch(args),
        Commands::Window(args) => run_window(args),
    }
}

/// Install the stderr subscriber. `RUST_LOG` wins over `level`.
fn init_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();
    let _ = subscriber.try_init();
}

fn build_tokenizer(options: &WindowOptions) -> Result<Box<dyn Tokenizer>> {
    #[cfg(feature = "hf-tokenizer")]
    {
        if let Some(path) = &options.tokenizer {
            let tokenizer = meetnotes::HfTokenizer::from_file(path)
                .with_context(|| format!("loading tokenizer {}", path.display()))?;
            return Ok(Box::new(tokenizer));
        }
    }
    #[cfg(feature = "tiktoken")]
    {
        if let Some(model) = &options.tokenizer_model {
            let tokenizer = meetnotes::BpeTokenizer::for_model(model)
                .with_context(|| format!("loading BPE encoding for {model}"))?;
            return Ok(Box::new(tokenizer));
        }
    }
    #[cfg(not(any(feature = "hf-tokenizer", feature = "tiktoken")))]
    let _ = options;

    Ok(Box::new(CharEstimateTokenizer::default()))
}

fn run_watch(args: WatchArgs) -> Result<()> {
    let config = WatchConfig {
        root: args.root,
        pattern: args.pattern,
        recursive: args.recursive,
        token_budget: args.window.token_budget,
        system_prompt: args.window.system_prompt.clone(),
        transcript: !args.no_transcript,
    };
    let root = config.resolve_root().context("resolving watch root")?;

    let generator_config = GeneratorConfig {
        model: args.model,
        base_url: args.base_url,
        ..GeneratorConfig::default()
    }
    .with_env_api_key();
    let generator =
        OpenAiGenerator::new(&generator_config).context("configuring question generator")?;

    let tokenizer = build_tokenizer(&args.window)?;
    let dispatcher = Dispatcher::new(&config, tokenizer, Arc::new(generator))
        .context("configuring dispatcher")?;

    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    runtime.block_on(watch_loop(root, config, dispatcher))
}

async fn watch_loop(root: PathBuf, config: WatchConfig, dispatcher: Dispatcher) -> Result<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let fs_watcher = watcher::spawn_watcher(&root, config.recursive, tx)?;
    info!(
        root = %root.display(),
        pattern = %config.pattern,
        token_budget = config.token_budget,
        "watching for note changes (Ctrl-C to stop)"
    );

    let worker = tokio::spawn(dispatcher.run(rx, shutdown_rx, print_question));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("shutting down (Ctrl-C again to exit immediately)");
    let _ = shutdown_tx.send(true);
    drop(fs_watcher);

    let interrupted = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let Some(summary) = finish_worker(worker, interrupted).await? else {
        warn!("interrupted, abandoning the event in flight");
        return Ok(());
    };
    println!(
        "Processed {} events: {} questions, {} unchanged, {} ignored, {} failed",
        summary.processed, summary.generated, summary.unchanged, summary.ignored, summary.failed
    );
    Ok(())
}

/// Wait for the worker to drain, unless `interrupted` resolves first, in which
/// case the worker is aborted and `None` is returned.
async fn finish_worker(
    mut worker: JoinHandle<DispatchSummary>,
    interrupted: impl Future<Output = ()>,
) -> Result<Option<DispatchSummary>> {
    tokio::select! {
        joined = &mut worker => Ok(Some(joined.context("dispatcher task failed")?)),
        () = interrupted => {
            worker.abort();
            Ok(None)
        }
    }
}

fn print_question(generated: &Generated) {
    println!("--- {}", generated.path.display());
    println!("{}", generated.question);
}

fn run_window(args: WindowArgs) -> Result<()> {
    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let note = RawNote::new(args.file.clone(), bytes);
    let text = note
        .decode()
        .with_context(|| format!("{} is not valid UTF-8", args.file.display()))?;

    let (conversation, stats) = parse_conversation_with_stats(text);
    let tokenizer = build_tokenizer(&args.window)?;
    let system = Message::system(args.window.system_prompt.clone());
    let window = build_context_window(
        &conversation,
        &system,
        args.window.token_budget,
        &*tokenizer,
    )
    .context("building context window")?;

    if args.json {
        let out = serde_json::json!({
            "file": args.file.display().to_string(),
            "token_budget": args.window.token_budget,
            "token_count": window.token_count,
            "turns": conversation.len(),
            "dropped_turns": window.dropped,
            "dropped_segments": stats.dropped(),
            "messages": window.messages(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for message in window.messages() {
            println!("[{}] {}", message.role.as_str(), message.content);
        }
        println!(
            "Window: {} tokens (budget {}), kept {} of {} turns, {} malformed segments",
            window.token_count,
            args.window.token_budget,
            window.turns().len(),
            conversation.len(),
            stats.dropped()
        );
    }
    Ok(())
}
