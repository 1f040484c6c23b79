//! CLI command definitions and handlers

pub mod exec;
pub mod logs;
pub mod run;
pub mod start;

use crate::client::DaemonClient;
use crate::config::Settings;
use crate::session::keys::parse_detach_keys;
use crate::session::resize::{monitor_tty_size, ResizeMonitor, ResizeTarget};
use crate::session::stdin::ThreadedReader;
use crate::session::terminal::{is_terminal, terminal_size, RawTerminal, TerminalControl};
use crate::session::{InputStream, OutputStream};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

/// Dockside - a Docker-compatible container client
#[derive(Parser)]
#[command(name = "dockside")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Daemon socket to connect to (unix:///path or tcp://host:port)
    #[arg(short = 'H', long, global = true)]
    pub host: Option<String>,

    /// Location of client config files
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'D', long, global = true)]
    pub debug: bool,

    /// Logging level (error, warn, info, debug, trace)
    #[arg(short = 'l', long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Create and run a container
    Run(run::RunArgs),

    /// Execute a command in a running container
    Exec(exec::ExecArgs),

    /// Start one or more stopped containers
    Start(start::StartArgs),

    /// Attach to a running container
    Attach(exec::AttachArgs),

    /// Fetch the logs of a container
    Logs(logs::LogsArgs),
}

impl Cli {
    /// Log filter derived from `--log-level` and `--debug`
    pub fn log_filter(&self) -> String {
        match (&self.log_level, self.debug) {
            (Some(level), _) => level.clone(),
            (None, true) => "debug".to_string(),
            (None, false) => "warn".to_string(),
        }
    }
}

/// Everything a command handler needs to talk to the daemon and the local
/// terminal
pub struct CommandContext {
    pub settings: Settings,
    pub client: DaemonClient,
    pub stdin_is_terminal: bool,
    pub stdout_is_terminal: bool,
}

impl CommandContext {
    pub fn new(settings: Settings) -> Self {
        let client = DaemonClient::new(settings.endpoint.clone(), settings.api_version.clone());
        Self {
            settings,
            client,
            stdin_is_terminal: is_terminal(libc::STDIN_FILENO),
            stdout_is_terminal: is_terminal(libc::STDOUT_FILENO),
        }
    }

    /// Resolve and validate the detach keys for a command
    pub fn detach_keys(&self, flag: Option<&str>) -> crate::Result<Option<String>> {
        let keys = self.settings.detach_keys(flag);
        if let Some(keys) = &keys {
            parse_detach_keys(keys)?;
        }
        Ok(keys)
    }

    /// Local stdin, read on its own thread so a blocked read never holds up
    /// exit
    pub fn stdin(&self) -> InputStream {
        Box::new(ThreadedReader::stdin())
    }

    pub fn stdout(&self) -> OutputStream {
        Box::new(tokio::io::stdout())
    }

    pub fn stderr(&self) -> OutputStream {
        Box::new(tokio::io::stderr())
    }

    /// Raw mode controller for local stdin
    pub fn terminal(&self) -> Arc<dyn TerminalControl> {
        Arc::new(RawTerminal::stdin())
    }

    /// Keep the remote TTY the size of the local terminal
    pub async fn monitor_tty_size(&self, target: ResizeTarget) -> ResizeMonitor {
        monitor_tty_size(Arc::new(target), || terminal_size(libc::STDOUT_FILENO)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_log_filter() {
        let cli = Cli::parse_from(["dockside", "attach", "web"]);
        assert_eq!(cli.log_filter(), "warn");

        let cli = Cli::parse_from(["dockside", "-D", "attach", "web"]);
        assert_eq!(cli.log_filter(), "debug");

        let cli = Cli::parse_from(["dockside", "attach", "web", "-l", "trace"]);
        assert_eq!(cli.log_filter(), "trace");
    }

    #[test]
    fn test_global_host_flag() {
        let cli = Cli::parse_from(["dockside", "-H", "tcp://10.0.0.2:2375", "start", "a", "b"]);
        assert_eq!(cli.host.as_deref(), Some("tcp://10.0.0.2:2375"));
        match cli.command {
            Commands::Start(args) => assert_eq!(args.containers, vec!["a", "b"]),
            _ => panic!("expected start"),
        }
    }
}
