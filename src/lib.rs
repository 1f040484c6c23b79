//! Dockside - a Docker-compatible command line client
//!
//! This crate talks to a container daemon over its HTTP API and provides the
//! interactive plumbing behind `attach`, `exec`, `run` and `start -a`:
//! hijacked connections, stdio demultiplexing, raw terminal handling,
//! signal forwarding and TTY resize propagation.

pub mod cli;
pub mod client;
pub mod config;
pub mod session;
pub mod stream;

use thiserror::Error;

/// Main error type for Dockside operations
#[derive(Error, Debug)]
pub enum DocksideError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Cannot connect to the daemon at {0}. Is the daemon running?")]
    ConnectionFailed(String),

    #[error("Error response from daemon: {message}")]
    Daemon { status: u16, message: String },

    #[error("Error response from daemon: {0}")]
    NotFound(String),

    #[error("Daemon did not switch protocols for hijacked request (status {0})")]
    UnsupportedUpgrade(u16),

    #[error("Invalid daemon host: {0}")]
    InvalidHost(String),

    #[error("Invalid detach keys: {0}")]
    InvalidDetachKeys(String),

    #[error("Terminal error: {0}")]
    Terminal(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Stream error: {0}")]
    Stream(String),
}

pub type Result<T> = std::result::Result<T, DocksideError>;

/// Exit status of a remote process, carried up to `main` so the CLI exits
/// with the same code.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Status: {status_code}")]
pub struct StatusError {
    pub status_code: i32,
}

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "dockside";
