#![allow(missing_docs)]

//! Seipipe CLI — run one pipe exchange from the command line.
//!
//! Loads valves from `pipes.toml` (or `$SEIPIPE_CONFIG_PATH`), builds a
//! one-message conversation, wires a stderr status sink, runs the
//! selected pipe once, and prints the reply to stdout. Errors print the
//! host-facing `{"error": ...}` object and exit non-zero.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing::debug;

use seipipe::config::PipesConfig;
use seipipe::conversation::{Conversation, RequestContext};
use seipipe::notify::{StatusEvent, StatusNotifier, StatusSink};
use seipipe::pipe::defi::DefiAgentPipe;
use seipipe::pipe::flow::FlowAgentPipe;
use seipipe::pipe::messaging::MessagingAgentPipe;
use seipipe::pipe::Pipe;

/// Seipipe — pipe adapters for external conversational agent backends.
#[derive(Parser)]
#[command(name = "seipipe", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands, one per pipe.
#[derive(Subcommand)]
enum Command {
    /// Send one message through the DeFi agent pipe.
    Defi {
        /// The user message to forward.
        message: String,
    },
    /// Send one message through the multi-agent messaging pipe.
    Messaging {
        /// The user message to forward.
        message: String,
    },
    /// Send one message through the agent-flow pipe.
    Flow {
        /// The user message to forward.
        message: String,
    },
}

/// Status sink printing progress lines to stderr.
struct StderrSink;

#[async_trait]
impl StatusSink for StderrSink {
    async fn emit(&self, event: StatusEvent) -> anyhow::Result<()> {
        eprintln!("[{:?}] {}", event.data.level, event.data.description);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    seipipe::logging::init_cli();

    let cli = Cli::parse();

    let config = match PipesConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let (pipe, message, enabled, interval): (Box<dyn Pipe>, String, bool, f64) = match cli.command {
        Command::Defi { message } => {
            let valves = config.defi;
            let (enabled, interval) = (valves.enable_status_indicator, valves.emit_interval_seconds);
            (Box::new(DefiAgentPipe::new(valves)), message, enabled, interval)
        }
        Command::Messaging { message } => {
            let valves = config.messaging;
            let (enabled, interval) = (valves.enable_status_indicator, valves.emit_interval_seconds);
            (
                Box::new(MessagingAgentPipe::new(valves)),
                message,
                enabled,
                interval,
            )
        }
        Command::Flow { message } => {
            let valves = config.flow;
            let (enabled, interval) = (valves.enable_status_indicator, valves.emit_interval_seconds);
            (Box::new(FlowAgentPipe::new(valves)), message, enabled, interval)
        }
    };

    let notifier = StatusNotifier::new(
        Arc::new(StderrSink),
        enabled,
        Duration::try_from_secs_f64(interval).unwrap_or(Duration::from_secs(2)),
    );

    let mut conversation = Conversation::from_user_text(message);
    let ctx = RequestContext::new();
    debug!(pipe = pipe.id(), request_id = %ctx.request_id, "running pipe");

    match pipe.run(&mut conversation, &ctx, &notifier).await {
        Ok(reply) => {
            println!("{reply}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}", e.to_body());
            ExitCode::FAILURE
        }
    }
}
