//! Logging setup for the manager daemon.
//!
//! Log lines go to a file that is truncated at start-up and, optionally, to
//! stdout. `RUST_LOG` overrides the default level.

use std::fs;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default directory for log files.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "spmanager.log";

/// Keeps the non-blocking file writer alive. Dropping it flushes the file.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Initializes the global subscriber.
///
/// Creates `log_dir` if needed and clears the previous `log_file`. With
/// `debug` the default level is `debug` instead of `info`.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file cannot
/// be cleared.
pub fn init_logging(
    log_dir: &Path,
    log_file: &str,
    stdout_enabled: bool,
    debug: bool,
) -> Result<LoggingGuard, io::Error> {
    prepare_log_file(log_dir, log_file)?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true);

    let stdout_layer = stdout_enabled.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stdout)
            .with_ansi(true)
            .compact()
    });

    let default_level = if debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Creates the directory and truncates the log file.
fn prepare_log_file(log_dir: &Path, log_file: &str) -> Result<(), io::Error> {
    fs::create_dir_all(log_dir)?;
    fs::write(log_dir.join(log_file), "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_creates_directory_and_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path().join("nested").join("logs");

        prepare_log_file(&dir, DEFAULT_LOG_FILE).unwrap();

        let path = dir.join(DEFAULT_LOG_FILE);
        assert!(path.exists());
        assert_eq!(fs::read_to_string(path).unwrap(), "");
    }

    #[test]
    fn test_prepare_clears_existing_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("spmanager.log");
        fs::write(&path, "previous session").unwrap();

        prepare_log_file(temp.path(), "spmanager.log").unwrap();

        assert_eq!(fs::read_to_string(path).unwrap(), "");
    }
}
