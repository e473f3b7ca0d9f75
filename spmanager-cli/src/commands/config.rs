//! Configuration inspection commands.

use clap::Subcommand;
use spmanager::config::{config_file_path, ConfigFile};
use std::path::PathBuf;

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Print the effective configuration as INI
    Show,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, config_path: Option<PathBuf>) -> Result<(), CliError> {
    let path = config_path.unwrap_or_else(config_file_path);
    match command {
        ConfigCommands::Path => {
            println!("{}", path.display());
            if !path.exists() {
                println!("(file does not exist, defaults are in effect)");
            }
            Ok(())
        }
        ConfigCommands::Show => {
            let config = ConfigFile::load_from(&path)?;
            print!("{}", config.to_ini_string());
            Ok(())
        }
    }
}
