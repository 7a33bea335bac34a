//! ows CLI - one-way media mirror

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cmd;

use cli_lib::{host, system_config, util};

/// ows - mirror a media collection into a destination tree
#[derive(Parser)]
#[command(name = "ows")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/ows/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v actions, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the destination up to date with the library
    Sync {
        /// Log the planned actions without touching any file
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Number of worker threads (overrides sync.workers)
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Show every recorded outcome for one source file
    History {
        /// Source file path
        source: PathBuf,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recent sync generations
    Generations {
        /// Number of generations to show (default: 20)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show destination and ledger status
    Status,
    /// Inspect configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Print the config file path
    Path {
        /// Write the example config if the file does not exist
        #[arg(long)]
        create: bool,
    },

    /// Print an example configuration
    Example,
}

/// Install the global subscriber
///
/// Verbosity maps to WARN, INFO, DEBUG and TRACE. Dry runs and log files
/// record at least INFO so planned actions are visible. `RUST_LOG` wins
/// when set.
fn init_logging(verbose: u8, dry_run: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let mut level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    if level == "warn" && (dry_run || log_file.is_some()) {
        level = "info";
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (writer, guard, ansi) = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let (nb, guard) = tracing_appender::non_blocking(file);
            (BoxMakeWriter::new(nb), Some(guard), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), None, true),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(ansi).with_target(false))
        .with(filter)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let dry_run = matches!(cli.command, Commands::Sync { dry_run: true, .. });
    let _guard = init_logging(cli.verbose, dry_run, cli.log_file.as_deref())?;
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Sync { dry_run, workers } => cmd::sync::run(config, dry_run, workers).await,
        Commands::History { source, json } => {
            cmd::history::run(config, &source, json).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Generations { limit } => {
            cmd::generations::run(config, limit).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status => {
            cmd::status::run(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config(config_cmd) => {
            match config_cmd {
                ConfigCommands::Show => cmd::config::run_show(config).await?,
                ConfigCommands::Path { create } => cmd::config::run_path(config, create).await?,
                ConfigCommands::Example => cmd::config::run_example().await?,
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
