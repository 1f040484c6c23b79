//! `dockside start` command implementation

use super::CommandContext;
use crate::client::types::AttachOptions;
use crate::session::resize::ResizeTarget;
use crate::session::signals::{forward_all_signals, ContainerSignals};
use crate::session::{container_exit_code, HijackedSession};
use crate::{DocksideError, StatusError};
use clap::Args;
use std::sync::Arc;

/// Arguments for the `start` command
#[derive(Args)]
pub struct StartArgs {
    /// Container names or IDs to start
    #[arg(required = true)]
    pub containers: Vec<String>,

    /// Attach STDOUT/STDERR and forward signals
    #[arg(short, long)]
    pub attach: bool,

    /// Attach container's STDIN
    #[arg(short, long)]
    pub interactive: bool,

    /// Override the key sequence for detaching a container
    #[arg(long)]
    pub detach_keys: Option<String>,
}

/// Execute the `start` command
pub async fn execute(ctx: &CommandContext, args: StartArgs) -> anyhow::Result<()> {
    if !args.attach && !args.interactive {
        return start_without_attachments(ctx, &args.containers).await;
    }

    if args.containers.len() > 1 {
        return Err(DocksideError::InvalidRequest(
            "You cannot start and attach multiple containers at once.".to_string(),
        )
        .into());
    }
    let container_id = &args.containers[0];
    let client = &ctx.client;

    let container = client.container_inspect(container_id).await?;
    let tty = container.config.tty;

    let _forwarder = if !tty {
        let target = ContainerSignals {
            client: client.clone(),
            container_id: container_id.clone(),
        };
        Some(forward_all_signals(Arc::new(target))?)
    } else {
        None
    };

    let options = AttachOptions {
        stream: true,
        stdin: args.interactive && container.config.open_stdin,
        stdout: true,
        stderr: true,
        detach_keys: ctx.detach_keys(args.detach_keys.as_deref())?,
    };

    let resp = client.container_attach(container_id, &options).await?;
    let session = HijackedSession {
        tty,
        input: options.stdin.then(|| ctx.stdin()),
        output: Some(ctx.stdout()),
        error: Some(ctx.stderr()),
        response: resp,
        terminal: ctx.terminal(),
    };
    let hold = session.spawn();

    if let Err(e) = client.container_start(container_id).await {
        if let Err(hold_err) = hold.cancel().await {
            tracing::debug!("Error hijack: {}", hold_err);
        }
        return Err(e.into());
    }

    let _monitor = if tty && ctx.stdout_is_terminal {
        let target = ResizeTarget::Container {
            client: client.clone(),
            id: container_id.clone(),
        };
        Some(ctx.monitor_tty_size(target).await)
    } else {
        None
    };

    if let Err(e) = hold.wait().await {
        tracing::debug!("Error hijack: {}", e);
        return Err(e.into());
    }

    let (_, status) = container_exit_code(client, container_id).await?;
    if status != 0 {
        return Err(StatusError {
            status_code: status,
        }
        .into());
    }

    Ok(())
}

/// Start each container in turn, reporting failures together at the end
async fn start_without_attachments(ctx: &CommandContext, containers: &[String]) -> anyhow::Result<()> {
    let mut failed = Vec::new();

    for container_id in containers {
        match ctx.client.container_start(container_id).await {
            Ok(()) => println!("{}", container_id),
            Err(e) => {
                eprintln!("{}", e);
                failed.push(container_id.as_str());
            }
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("Error: failed to start containers: {}", failed.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn test_start_flags() {
        let cli = Cli::parse_from(["dockside", "start", "-ai", "--detach-keys", "ctrl-a", "web"]);
        match cli.command {
            Commands::Start(args) => {
                assert!(args.attach);
                assert!(args.interactive);
                assert_eq!(args.containers, vec!["web"]);
                assert_eq!(args.detach_keys.as_deref(), Some("ctrl-a"));
            }
            _ => panic!("expected start"),
        }
    }

    #[test]
    fn test_start_requires_container() {
        assert!(Cli::try_parse_from(["dockside", "start"]).is_err());
    }
}
