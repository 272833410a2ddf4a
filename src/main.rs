use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use chatview::config::{self, Config, LlmConfig};
use chatview::llm::{CancelToken, GeminiClient, LlmClient, Unavailable};
use chatview::transcript::{self, Sender};
use chatview::viewer::{self, Session};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CHATVIEW_BUILD_GIT_HASH"),
    " ",
    env!("CHATVIEW_BUILD_PROFILE"),
    ")"
);

#[derive(Parser)]
#[command(
    name = "chatview",
    about = "Terminal chat client for Gemini with a virtualized transcript",
    version,
    long_version = LONG_VERSION
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Transcript file (defaults to $XDG_DATA_HOME/chatview/chatMessages.json)
    transcript: Option<PathBuf>,

    /// Transcript file, for subcommands
    #[arg(short, long, global = true)]
    file: Option<PathBuf>,

    /// Model name (e.g. gemini-2.5-flash)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Rows assumed for a message before it has been rendered
    #[arg(long, global = true)]
    estimated_height: Option<u32>,

    /// Extra messages mounted below the viewport
    #[arg(long, global = true)]
    overscan: Option<usize>,

    /// Do not reload the transcript when another process changes it
    #[arg(long)]
    no_watch: bool,

    /// Log output file path (enables logging when specified)
    #[arg(long, global = true)]
    log: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Send one prompt, print the answer and record both in the transcript
    Ask {
        /// Prompt text (use `-` for stdin)
        prompt: String,

        /// Also print the model's reasoning summary to stderr
        #[arg(long)]
        thoughts: bool,
    },
    /// Print the transcript
    History {
        /// Print the raw JSON instead of plain text
        #[arg(long)]
        json: bool,
    },
    /// Delete every message from the transcript
    Clear,
}

fn main() {
    let cli = Cli::parse();

    if let Some(log_path) = &cli.log {
        let file = match std::fs::File::create(log_path) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("Error: failed to open log file {}: {e}", log_path.display());
                std::process::exit(1);
            }
        };
        env_logger::Builder::from_default_env()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
    } else if cli.command.is_some() {
        env_logger::init();
    }
    // viewer mode + no --log → logger not initialized (the TUI owns the terminal)

    let mut cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };
    cfg.merge_cli(&config::CliOverrides {
        transcript: cli.file.clone().or_else(|| cli.transcript.clone()),
        model: cli.model.clone(),
        estimated_height: cli.estimated_height,
        overscan: cli.overscan,
    });
    let config = cfg.resolve();

    let result = match cli.command {
        Some(Command::Ask { prompt, thoughts }) => cmd_ask(&config, &prompt, thoughts),
        Some(Command::History { json }) => cmd_history(&config, json),
        Some(Command::Clear) => cmd_clear(&config),
        None => cmd_view(config, !cli.no_watch),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn transcript_path(config: &Config) -> Result<PathBuf> {
    config.transcript.clone().ok_or_else(|| {
        anyhow::anyhow!("no transcript location: pass a path or set HOME / XDG_DATA_HOME")
    })
}

/// A missing API key keeps the viewer usable for browsing; requests then
/// fail with the configuration error.
fn client_or_unavailable(config: &LlmConfig) -> Arc<dyn LlmClient> {
    match GeminiClient::new(config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            warn!("llm: {e:#}");
            Arc::new(Unavailable::new(format!("{e:#}")))
        }
    }
}

fn cmd_view(config: Config, watch: bool) -> Result<()> {
    let path = transcript_path(&config)?;
    let client = client_or_unavailable(&config.llm);
    viewer::run(Session {
        transcript_path: path,
        config,
        client,
        watch,
    })
}

fn cmd_ask(config: &Config, prompt: &str, thoughts: bool) -> Result<()> {
    let prompt = if prompt == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        buf
    } else {
        prompt.to_string()
    };
    if prompt.trim().is_empty() {
        anyhow::bail!("prompt is empty");
    }

    let client = GeminiClient::new(&config.llm)?;
    let path = transcript_path(config)?;
    let mut transcript = transcript::load(&path)?;
    if !transcript.push_prompt(&prompt) {
        anyhow::bail!("same prompt as the last one in {}", path.display());
    }
    // Saved before the request so a running viewer shows the pending reply.
    transcript::save(&path, &transcript)?;

    let started = Instant::now();
    let reply = match client.send(transcript.messages(), &CancelToken::new()) {
        Ok(reply) => reply,
        Err(e) => {
            transcript.drop_placeholder();
            transcript::save(&path, &transcript)?;
            return Err(e);
        }
    };
    info!(
        "cmd_ask: reply in {:.1}s ({} bytes)",
        started.elapsed().as_secs_f64(),
        reply.answer.len()
    );

    if thoughts && let Some(thought) = &reply.thought {
        eprintln!("{thought}\n");
    }
    println!("{}", reply.answer);
    transcript.resolve_placeholder(&reply.answer, reply.thought);
    transcript::save(&path, &transcript)?;
    Ok(())
}

fn cmd_history(config: &Config, json: bool) -> Result<()> {
    let path = transcript_path(config)?;
    let transcript = transcript::load(&path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(transcript.messages())?);
        return Ok(());
    }
    for msg in transcript.messages() {
        let who = match msg.sender {
            Sender::User => "You",
            Sender::Ai => "Gemini",
        };
        println!("{who}:\n{}\n", msg.content);
    }
    Ok(())
}

fn cmd_clear(config: &Config) -> Result<()> {
    let path = transcript_path(config)?;
    let mut transcript = transcript::load(&path)?;
    let count = transcript.len();
    transcript.clear();
    transcript::save(&path, &transcript)?;
    eprintln!("cleared {count} message(s) from {}", path.display());
    Ok(())
}
