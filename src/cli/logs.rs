//! `dockside logs` command implementation

use super::CommandContext;
use crate::client::types::LogsOptions;
use crate::stream::demultiplex;
use crate::DocksideError;
use clap::Args;
use tokio::io::AsyncWriteExt;

/// Log drivers the daemon can read back from
const READABLE_LOG_DRIVERS: [&str; 2] = ["json-file", "journald"];

/// Arguments for the `logs` command
#[derive(Args)]
pub struct LogsArgs {
    /// Container name or ID
    pub container: String,

    /// Follow log output
    #[arg(short, long)]
    pub follow: bool,

    /// Show logs since timestamp (e.g., 2013-01-02T13:23:37Z) or relative (e.g., 42m)
    #[arg(long)]
    pub since: Option<String>,

    /// Number of lines to show from the end of the logs
    #[arg(short = 'n', long, default_value = "all")]
    pub tail: String,

    /// Show timestamps
    #[arg(short, long)]
    pub timestamps: bool,
}

impl LogsArgs {
    pub fn options(&self) -> LogsOptions {
        LogsOptions {
            stdout: true,
            stderr: true,
            follow: self.follow,
            timestamps: self.timestamps,
            since: self.since.clone(),
            tail: self.tail.clone(),
        }
    }
}

/// Fail unless the daemon can read logs back for this driver
pub fn check_log_driver(driver: &str) -> Result<(), DocksideError> {
    // An empty driver means an older daemon that only had json-file
    if driver.is_empty() || READABLE_LOG_DRIVERS.contains(&driver) {
        return Ok(());
    }
    Err(DocksideError::InvalidRequest(format!(
        "\"logs\" command is supported only for \"json-file\" and \"journald\" logging drivers (got: {})",
        driver
    )))
}

/// Execute the `logs` command
pub async fn execute(ctx: &CommandContext, args: LogsArgs) -> anyhow::Result<()> {
    let container = ctx.client.container_inspect(&args.container).await?;
    check_log_driver(&container.host_config.log_config.driver)?;

    let mut body = ctx
        .client
        .container_logs(&args.container, &args.options())
        .await?;
    let mut stdout = ctx.stdout();

    if container.config.tty {
        tokio::io::copy(&mut body, &mut stdout).await?;
        stdout.flush().await?;
    } else {
        let mut stderr = ctx.stderr();
        demultiplex(&mut body, Some(&mut stdout), Some(&mut stderr)).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn parse_logs(args: &[&str]) -> LogsArgs {
        let mut argv = vec!["dockside", "logs"];
        argv.extend_from_slice(args);
        match Cli::parse_from(argv).command {
            Commands::Logs(args) => args,
            _ => panic!("expected logs"),
        }
    }

    #[test]
    fn test_logs_defaults() {
        let options = parse_logs(&["web"]).options();
        assert!(options.stdout && options.stderr);
        assert!(!options.follow);
        assert!(!options.timestamps);
        assert_eq!(options.tail, "all");
        assert!(options.since.is_none());
    }

    #[test]
    fn test_logs_flags() {
        let args = parse_logs(&["-f", "-t", "-n", "20", "--since", "42m", "web"]);
        assert_eq!(args.container, "web");

        let options = args.options();
        assert!(options.follow);
        assert!(options.timestamps);
        assert_eq!(options.tail, "20");
        assert_eq!(options.since.as_deref(), Some("42m"));
    }

    #[test]
    fn test_check_log_driver() {
        assert!(check_log_driver("json-file").is_ok());
        assert!(check_log_driver("journald").is_ok());
        assert!(check_log_driver("").is_ok());

        let err = check_log_driver("syslog").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid request: \"logs\" command is supported only for \"json-file\" and \"journald\" logging drivers (got: syslog)"
        );
    }
}
