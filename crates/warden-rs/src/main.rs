//! `warden`: offline tooling for the runtime governor.
//!
//! ```sh
//! # Feed a recorded hook log through the governor, one JSON outcome per line
//! warden replay events.jsonl --config warden.json
//!
//! # Validate a config file and print it with defaults filled in
//! warden check-config warden.json
//! ```
//!
//! Logs go to stderr. Set `RUST_LOG` (e.g. `RUST_LOG=warden_rs=debug`) for
//! per-event detail.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use warden_rs::replay::Replayer;
use warden_rs::{Governor, GovernorConfig, GovernorError};

/// Runtime governor for LLM worker sessions.
#[derive(Parser)]
#[command(name = "warden", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a JSONL hook log and print one JSON outcome per event.
    Replay {
        /// Event log; `-` reads stdin.
        input: PathBuf,

        /// Governor config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Clock for events before the first timestamped one (RFC 3339).
        #[arg(long)]
        start: Option<DateTime<Utc>>,
    },
    /// Validate a config file and print it with defaults filled in.
    CheckConfig {
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Replay {
            input,
            config,
            start,
        } => replay(input, config, start).await,
        Command::CheckConfig { path } => check_config(path),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn replay(
    input: PathBuf,
    config: Option<PathBuf>,
    start: Option<DateTime<Utc>>,
) -> Result<(), GovernorError> {
    let config = match config {
        Some(path) => GovernorConfig::load(path)?,
        None => GovernorConfig::default(),
    };

    let log = if input.as_os_str() == "-" {
        let mut buf = String::new();
        tokio::io::stdin().read_to_string(&mut buf).await?;
        buf
    } else {
        tokio::fs::read_to_string(&input).await?
    };

    let mut replayer = Replayer::new(Governor::new(config), start.unwrap_or_else(Utc::now));
    let stdout = std::io::stdout();
    let stats = replayer.run(log.as_bytes(), stdout.lock())?;
    info!(
        events = stats.events,
        blocked = stats.blocked,
        errors = stats.errors,
        "replay finished"
    );
    Ok(())
}

fn check_config(path: PathBuf) -> Result<(), GovernorError> {
    let config = GovernorConfig::load(&path)?;
    let pretty = config.to_json_pretty()?;
    println!("{pretty}");
    eprintln!("{}: ok", path.display());
    Ok(())
}
