//! Reverig CLI - fetch and install Steam manifest scripts.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::commands::query::Query;
use crate::error::CliError;

#[derive(Debug, Parser)]
#[command(name = "reverig")]
#[command(version, about = "Fetch, patch and install Steam manifest scripts", long_about = None)]
struct Cli {
    /// Configuration file (default: <config dir>/reverig/reverig.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Steam root directory, overriding config and detection
    #[arg(long, global = true)]
    steam: Option<PathBuf>,

    /// Log level for reverig targets (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Acquire and install the script for an app, waiting until it finishes
    Fetch {
        /// Steam app id
        app_id: String,

        /// Print the final status reply instead of a progress bar
        #[arg(long)]
        json: bool,
    },
    /// Check whether a script is installed for an app
    Has {
        /// Steam app id
        app_id: String,
    },
    /// Remove the installed script for an app
    Remove {
        /// Steam app id
        app_id: String,
    },
    /// Record an app's DLC in the discovery file
    AddDlc {
        /// Steam app id
        app_id: String,
    },
    /// Comment out setManifestid lines in every installed script
    Sweep,
    /// List the effective source list in order
    Sources,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let options = runner::RunnerOptions {
        config_path: cli.config,
        steam_path: cli.steam,
        log_level: cli.log_level,
    };

    match cli.command {
        Commands::Sources => commands::sources::run(options),
        Commands::Fetch { app_id, json } => commands::fetch::run(options, &app_id, json),
        Commands::Has { app_id } => commands::query::run(options, Query::Has, &app_id),
        Commands::Remove { app_id } => commands::query::run(options, Query::Remove, &app_id),
        Commands::AddDlc { app_id } => commands::query::run(options, Query::AddDlc, &app_id),
        Commands::Sweep => commands::sweep::run(options),
    }
}
