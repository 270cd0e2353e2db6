use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

use profman_orchestration::bootstrap::{audit, cleanup, open_registry, provision};
use profman_orchestration::{boot, OrchestratorConfig, Runtime};
use profman_profile_state::FailureType;

mod input;

use input::{parse_line, InputLine, OperatorCommand};

/// Profman - profile lifecycle orchestrator and process supervisor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct CommonArgs {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the orchestrator, reading JSON-line events from stdin
    Run {
        #[command(flatten)]
        common: CommonArgs,

        /// Run duration in seconds (for testing)
        #[arg(long)]
        run_duration: Option<u64>,
    },
    /// Audit the registry against live processes and print the report
    Audit {
        #[command(flatten)]
        common: CommonArgs,

        /// Apply the proposed corrections
        #[arg(long)]
        apply: bool,
    },
    /// Kill stray processes running from the managed binary directory
    Cleanup {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Create a new profile
    Provision {
        #[command(flatten)]
        common: CommonArgs,

        /// Unique alias for the profile
        alias: String,

        /// Make this the master profile
        #[arg(long)]
        master: bool,
    },
}

impl Command {
    fn common(&self) -> &CommonArgs {
        match self {
            Command::Run { common, .. }
            | Command::Audit { common, .. }
            | Command::Cleanup { common }
            | Command::Provision { common, .. } => common,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let common = args.command.common();

    let config = OrchestratorConfig::load_from_file(&common.config)?;
    initialize_logging(common.debug, &config.orchestrator.log_level)?;
    debug!("Config file: {}", common.config);

    match args.command {
        Command::Run { run_duration, .. } => run(config, run_duration).await,
        Command::Audit { apply, .. } => {
            let (_, registry) = open_registry(&config).await?;
            let report = audit(&config, &registry, apply).await?;
            print_json(&report)
        }
        Command::Cleanup { .. } => {
            let report = cleanup(&config.paths()?).await?;
            print_json(&report)
        }
        Command::Provision { alias, master, .. } => {
            let profile = provision(&config, &alias, master).await?;
            print_json(&profile)
        }
    }
}

async fn run(config: OrchestratorConfig, run_duration: Option<u64>) -> Result<()> {
    info!("Starting profman orchestrator");

    let runtime = match boot(&config).await {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start orchestrator: {:#}", e);
            return Err(anyhow!("Start failed: {}", e));
        }
    };

    for id in &runtime.started {
        match runtime.orchestrator.journaled_state(id).await {
            Ok(Some(state)) => info!("Profile {} was last journaled in {}", id, state),
            Ok(None) => {}
            Err(e) => warn!("Could not replay journal for profile {}: {}", id, e),
        }
    }

    info!("Orchestrator started with {} profile(s)", runtime.started.len());

    let shutdown = wait_for_shutdown(run_duration);
    tokio::pin!(shutdown);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,

            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => handle_line(&runtime, &line).await,
                Ok(None) => {
                    debug!("stdin closed; waiting for shutdown signal");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    info!("Shutting down orchestrator...");
    let statuses = runtime.shutdown().await;
    info!("Orchestrator shut down ({} lifecycle(s) stopped)", statuses.len());
    Ok(())
}

async fn handle_line(runtime: &Runtime, line: &str) {
    let orchestrator = &runtime.orchestrator;

    let reply = match parse_line(line) {
        Err(e) => json!({ "error": format!("invalid input: {}", e) }),
        Ok(InputLine::Event(event)) => to_reply(orchestrator.send_event(event).await),
        Ok(InputLine::Command(OperatorCommand::Status { profile_id: None })) => {
            to_reply(Ok::<_, profman_common::Error>(orchestrator.list().await))
        }
        Ok(InputLine::Command(OperatorCommand::Status {
            profile_id: Some(id),
        })) => to_reply(orchestrator.status(&id).await),
        Ok(InputLine::Command(OperatorCommand::Start { profile_id })) => {
            match runtime.registry.get(&profile_id).await {
                Ok(_) => to_reply(orchestrator.start(profile_id).await),
                Err(e) => to_reply::<()>(Err(e)),
            }
        }
        Ok(InputLine::Command(OperatorCommand::Stop { profile_id })) => {
            to_reply(orchestrator.stop(&profile_id).await)
        }
        Ok(InputLine::Command(OperatorCommand::Recover {
            profile_id,
            failure_type,
        })) => to_reply(
            orchestrator
                .recover(&profile_id, FailureType::parse(&failure_type))
                .await,
        ),
    };

    println!("{}", reply);
}

fn to_reply<T: Serialize>(result: profman_common::Result<T>) -> serde_json::Value {
    match result {
        Ok(value) => serde_json::to_value(value)
            .unwrap_or_else(|e| json!({ "error": format!("unserializable reply: {}", e) })),
        Err(e) => json!({ "error": e.to_string() }),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn initialize_logging(debug: bool, configured_level: &str) -> Result<()> {
    let level = if debug { "debug" } else { configured_level };

    // stdout carries replies; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    Ok(())
}

async fn wait_for_shutdown(run_duration: Option<u64>) {
    match run_duration {
        Some(duration) => {
            info!("Running for {} seconds (test mode)", duration);
            tokio::select! {
                _ = tokio::time::sleep(tokio::time::Duration::from_secs(duration)) => {}
                _ = setup_signal_handlers() => {}
            }
        }
        None => setup_signal_handlers().await,
    }
}

async fn setup_signal_handlers() {
    use tokio::signal;

    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to create SIGTERM handler");
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .expect("Failed to create SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT signal");
            }
        }
    }

    #[cfg(windows)]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C signal");
    }
}
