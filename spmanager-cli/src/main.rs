//! spmanager CLI - command-line driver for the storage-provider task manager

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::config::ConfigCommands;
use commands::simulate::SimulateArgs;
use error::CliError;
use runner::CliRunner;

#[derive(Parser)]
#[command(name = "spmanager")]
#[command(version = spmanager::VERSION)]
#[command(about = "Task scheduler for a storage-provider daemon", long_about = None)]
struct Cli {
    /// Path to config.ini (defaults to ~/.spmanager/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Run the manager against a simulated chain and executor
    Simulate {
        /// Number of objects to upload
        #[arg(long, default_value = "16")]
        objects: u64,

        /// Number of storage providers on the simulated chain
        #[arg(long, default_value = "8")]
        sps: u32,

        /// Payload size of every object, in bytes
        #[arg(long, default_value = "1048576")]
        payload_size: u64,

        /// Database snapshot to load before and save after the run
        #[arg(long)]
        db: Option<PathBuf>,

        /// Enable debug-level logging
        #[arg(long)]
        debug: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { force } => commands::init::run(cli.config, force),
        Commands::Config { command } => commands::config::run(command, cli.config),
        Commands::Simulate {
            objects,
            sps,
            payload_size,
            db,
            debug,
        } => run_simulate(
            cli.config,
            debug,
            SimulateArgs {
                objects,
                sps,
                payload_size,
                db,
            },
        ),
    };

    if let Err(e) = result {
        e.exit();
    }
}

fn run_simulate(config: Option<PathBuf>, debug: bool, args: SimulateArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(config.as_deref(), debug)?;
    commands::simulate::run(&runner, args)
}
