//! Bodyscan CLI - drive the measurement pipeline from the command line.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use bodyscan::config::ConfigFile;
use bodyscan::logging::{init_logging, LoggingGuard};

use commands::{monitor, profile, simulate};
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "bodyscan", version, about = "Adaptive body measurement pipeline")]
struct Cli {
    /// Configuration file (default: <config dir>/bodyscan/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show detected device capabilities
    Profile(profile::ProfileArgs),

    /// Run startup, a calibration session and measurements on synthetic frames
    Simulate(simulate::SimulateArgs),

    /// Run the performance monitor and optimizer over synthetic telemetry
    Monitor(monitor::MonitorArgs),

    /// Print the effective configuration
    Config {
        /// Only print the configuration file path
        #[arg(long)]
        path: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = ConfigFile::load_or_default(cli.config.as_deref())?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }

    match cli.command {
        Commands::Config { path } => commands::config::run(&config, cli.config.as_deref(), path),
        command => {
            let _guard = setup_logging(&config)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(CliError::Runtime)?;
            match command {
                Commands::Profile(args) => profile::run(&config, args),
                Commands::Simulate(args) => runtime.block_on(simulate::run(config, args)),
                Commands::Monitor(args) => runtime.block_on(monitor::run(config, args)),
                Commands::Config { .. } => Ok(()),
            }
        }
    }
}

fn setup_logging(config: &ConfigFile) -> Result<LoggingGuard, CliError> {
    Ok(init_logging(&config.logging)?)
}
