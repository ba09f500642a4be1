//! Adaptload CLI - diagnostics and simulation for the adaptive loading core
//!
//! ```text
//! adaptload profile              # derive the environment profile from this host
//! adaptload budget --network slow
//! adaptload config check|show|path
//! adaptload simulate --network slow --failure-rate 0.3
//! ```

mod commands;
mod error;

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use adaptload::logging::init_logging;
use commands::budget::BudgetArgs;
use commands::config::ConfigCommands;
use commands::profile::ProfileArgs;
use commands::simulate::SimulateArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "adaptload", version, about = "Adaptive resource loading diagnostics")]
struct Cli {
    /// Configuration file (defaults to <config_dir>/adaptload/config.ini)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show the environment profile derived from capability probes
    Profile(ProfileArgs),

    /// Show the budget table resolved for a profile
    Budget(BudgetArgs),

    /// Inspect and validate the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Run a simulated load session on virtual time
    Simulate(SimulateArgs),
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();

    // `config check` reports load errors itself, so defer them here.
    let loaded = commands::common::load_config(cli.config.as_deref());

    let mut logging = loaded
        .as_ref()
        .map(|config| config.logging.clone())
        .unwrap_or_default();
    match cli.verbose {
        0 => {}
        1 => logging.level = "debug".to_string(),
        _ => logging.level = "trace".to_string(),
    }
    let _log_guard = init_logging(&logging)?;

    match cli.command {
        Commands::Profile(args) => commands::profile::run(args),
        Commands::Budget(args) => commands::budget::run(args, &loaded?),
        Commands::Config { action } => commands::config::run(action, cli.config.as_deref()),
        Commands::Simulate(args) => commands::simulate::run(args, loaded?),
    }
}
