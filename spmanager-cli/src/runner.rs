//! CLI runner for common setup.
//!
//! Encapsulates config loading and logging initialization so every command
//! starts the same way.

use crate::error::CliError;
use spmanager::config::ConfigFile;
use spmanager::logging::{init_logging, LoggingGuard};
use std::path::Path;
use tracing::info;

/// Runner that manages CLI lifecycle.
pub struct CliRunner {
    /// Keeps logging active while the runner exists
    _logging_guard: LoggingGuard,
    config: ConfigFile,
}

impl CliRunner {
    /// Loads config from `config_path` (or the default path) and starts
    /// logging into the configured directory.
    pub fn new(config_path: Option<&Path>, debug: bool) -> Result<Self, CliError> {
        let config = match config_path {
            Some(path) => ConfigFile::load_from(path)?,
            None => ConfigFile::load()?,
        };

        let logging_guard = init_logging(
            &config.logging.directory,
            &config.logging.file,
            true,
            debug,
        )
        .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            _logging_guard: logging_guard,
            config,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("spmanager v{}", spmanager::VERSION);
        info!("spmanager CLI: {} command", command);
    }
}
