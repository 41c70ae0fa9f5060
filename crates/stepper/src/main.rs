use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use stepper_engine::cli::{self, OutputHandlers, ReplOptions};
use stepper_engine::config::{ConfigLoader, StepperConfig};
use stepper_engine::{
    ActivityObserver, BroadcastChannel, FileStore, Interpreter, JsonlLogSink, LogSink,
    PauseBridge, RecipeStore, TracingLogSink,
};
use stepper_r::{RemotePage, RemoteServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stepper", version, about = "Step-by-step page automation")]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    /// Config file (defaults to $STEPPER_CONFIG, ./stepper.yaml, then ~/.stepper/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Mode {
    /// Drive a page in the browser extension over WebSocket
    Remote {
        /// WebSocket port (overrides config)
        #[arg(long)]
        port: Option<u16>,

        /// Script to execute as one run (non-interactive mode)
        #[arg(long)]
        file: Option<PathBuf>,

        /// Append the execution log of every run to this JSONL file
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
    /// Parse a script without running it
    Check { file: PathBuf },
    /// List the command grammar
    Verbs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only results.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ConfigLoader::load_from(path)
            .await
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ConfigLoader::load_default().await?,
    };

    match args.mode {
        Mode::Remote {
            port,
            file,
            log_file,
        } => run_remote(config, port, file, log_file).await,
        Mode::Check { file } => check(&file).await,
        Mode::Verbs => {
            for rule in stepper_parser::grammar() {
                println!("{:<16} {}", rule.verb, rule.pattern.as_str());
            }
            Ok(())
        }
    }
}

async fn check(file: &PathBuf) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let commands = stepper_parser::parse_script(&content)
        .with_context(|| format!("in {}", file.display()))?;
    for command in &commands {
        println!("{}", serde_json::to_string(command)?);
    }
    eprintln!("{} commands OK", commands.len());
    Ok(())
}

async fn run_remote(
    mut config: StepperConfig,
    port: Option<u16>,
    file: Option<PathBuf>,
    log_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.remote.port = port;
    }

    let server = RemoteServer::new(config.remote.port);
    let handle = server
        .start()
        .await
        .with_context(|| format!("starting remote server on port {}", config.remote.port))?;
    println!(
        "Please connect the browser extension to ws://{}",
        handle.local_addr
    );

    let channel = BroadcastChannel::new(config.bridge.channel_capacity);
    let page = Arc::new(RemotePage::attach(handle, channel.clone(), &config.remote));
    let observer = ActivityObserver::new(config.observer.clone());
    let bridge = PauseBridge::spawn(channel, &config.bridge);

    let store_path = config.storage.resolved_path();
    info!(path = %store_path.display(), "Recipe store");
    let recipes = RecipeStore::new(Arc::new(FileStore::new(store_path)));

    let sink: Arc<dyn LogSink> = match log_file {
        Some(path) => Arc::new(JsonlLogSink::new(path)),
        None => Arc::new(TracingLogSink),
    };

    let interpreter = Interpreter::new(
        page,
        observer,
        bridge,
        recipes,
        sink,
        config.interpreter.clone(),
    );

    let output = OutputHandlers {
        out: |msg| println!("{}", msg),
        err: |msg| eprintln!("{}", msg),
    };

    if let Some(path) = file {
        cli::run_file(&interpreter, output, &path)
            .await
            .map_err(|e| anyhow::anyhow!("executing {}: {}", path.display(), e))?;
    } else {
        let repl_options = ReplOptions {
            banner_lines: &[
                "Enter commands (e.g., 'navto example.com', 'click #submit', 'showtoast \"Continue?\"').",
                "Type 'exit' or 'quit' to close.",
            ],
            prompt: "> ",
            exit_commands: &["exit", "quit"],
            handle_ctrl_c: true,
            ctrl_c_message: Some("Interrupted"),
        };
        cli::run_repl(&interpreter, output, repl_options)
            .await
            .map_err(|e| anyhow::anyhow!("session failed: {}", e))?;
    }
    Ok(())
}
