//! CLI command implementations.
//!
//! - [`config`] - Configuration inspection (path, show)
//! - [`init`] - Configuration initialization
//! - [`simulate`] - Drive a manager against a simulated chain

pub mod config;
pub mod init;
pub mod simulate;
