//! Configuration for the manager and its background schedulers.
//!
//! User settings live in an INI file (`~/.spmanager/config.ini`) loaded into
//! a [`ConfigFile`]. Runtime components take their own typed config built
//! from it, for example `ManagerConfig::from(&config_file)`.
//!
//! # Example
//!
//! ```
//! use spmanager::config::ConfigFile;
//!
//! let config = ConfigFile::from_ini_str("[queue]\nreplicate = 16\n").unwrap();
//! assert_eq!(config.queue.replicate, 16);
//! assert_eq!(config.queue.seal, ConfigFile::default().queue.seal);
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod size;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    ConfigFile, LoggingSettings, ManagerSettings, QueueSettings, RecoverySettings, TaskSettings,
    VgmSettings,
};
pub use size::{format_size, parse_size, SizeParseError};
