//! Writes a default configuration file.

use spmanager::config::{config_file_path, ConfigFile};
use std::path::PathBuf;

use crate::error::CliError;

/// Run the init command.
pub fn run(config_path: Option<PathBuf>, force: bool) -> Result<(), CliError> {
    let path = config_path.unwrap_or_else(config_file_path);
    if path.exists() && !force {
        return Err(CliError::Config(format!(
            "{} already exists, use --force to overwrite it",
            path.display()
        )));
    }

    ConfigFile::default().save_to(&path)?;
    println!("Wrote default configuration to {}", path.display());
    println!("Set operator_address in the [manager] section before running.");
    Ok(())
}
