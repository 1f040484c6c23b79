//! `dockside exec` and `dockside attach` command implementations

use super::CommandContext;
use crate::client::types::{AttachOptions, ExecConfig, ExecStartCheck};
use crate::session::resize::{resize_to, ResizeTarget};
use crate::session::signals::{forward_all_signals, ContainerSignals};
use crate::session::terminal::{check_tty_input, terminal_size, TerminalSize};
use crate::session::{container_exit_code, exec_exit_code, HijackedSession};
use crate::{DocksideError, StatusError};
use clap::Args;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Arguments for the `exec` command
#[derive(Args)]
pub struct ExecArgs {
    /// Container name or ID
    pub container: String,

    /// Command to execute
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Run command in detached mode
    #[arg(short, long)]
    pub detach: bool,

    /// Set environment variables
    #[arg(short, long)]
    pub env: Vec<String>,

    /// Keep STDIN open
    #[arg(short, long)]
    pub interactive: bool,

    /// Allocate a pseudo-TTY
    #[arg(short, long)]
    pub tty: bool,

    /// Username or UID (format: <name|uid>[:<group|gid>])
    #[arg(short, long)]
    pub user: Option<String>,

    /// Working directory inside the container
    #[arg(short, long)]
    pub workdir: Option<String>,

    /// Give extended privileges to the command
    #[arg(long)]
    pub privileged: bool,

    /// Override the key sequence for detaching a container
    #[arg(long)]
    pub detach_keys: Option<String>,
}

impl ExecArgs {
    /// Build the exec request. Without `-d` stdout and stderr are always
    /// attached, stdin only with `-i`.
    pub fn exec_config(&self, detach_keys: Option<String>) -> ExecConfig {
        ExecConfig {
            user: self.user.clone(),
            privileged: self.privileged,
            tty: self.tty,
            attach_stdin: !self.detach && self.interactive,
            attach_stdout: !self.detach,
            attach_stderr: !self.detach,
            detach: self.detach,
            detach_keys,
            env: self.env.clone(),
            working_dir: self.workdir.clone(),
            cmd: self.command.clone(),
        }
    }
}

/// Arguments for the `attach` command
#[derive(Args)]
pub struct AttachArgs {
    /// Container name or ID
    pub container: String,

    /// Do not attach STDIN
    #[arg(long)]
    pub no_stdin: bool,

    /// Proxy all received signals to the process
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub sig_proxy: bool,

    /// Override the key sequence for detaching a container
    #[arg(long)]
    pub detach_keys: Option<String>,
}

/// Execute the `exec` command
pub async fn execute(ctx: &CommandContext, args: ExecArgs) -> anyhow::Result<()> {
    let client = &ctx.client;
    let detach_keys = ctx.detach_keys(args.detach_keys.as_deref())?;
    let config = args.exec_config(detach_keys);

    if !config.detach {
        check_tty_input(config.attach_stdin, config.tty, ctx.stdin_is_terminal)?;
    }

    let response = client.exec_create(&args.container, &config).await?;
    let exec_id = response.id;
    if exec_id.is_empty() {
        println!("exec ID empty");
        return Ok(());
    }

    if config.detach {
        let check = ExecStartCheck {
            detach: true,
            tty: config.tty,
        };
        client.exec_start(&exec_id, &check).await?;
        return Ok(());
    }

    let resp = client.exec_attach(&exec_id, &config).await?;
    let session = HijackedSession {
        tty: config.tty,
        input: config.attach_stdin.then(|| ctx.stdin()),
        output: config.attach_stdout.then(|| ctx.stdout()),
        error: config.attach_stderr.then(|| {
            if config.tty {
                ctx.stdout()
            } else {
                ctx.stderr()
            }
        }),
        response: resp,
        terminal: ctx.terminal(),
    };
    let hold = session.spawn();

    let _monitor = if config.tty && ctx.stdin_is_terminal {
        let target = ResizeTarget::Exec {
            client: client.clone(),
            id: exec_id.clone(),
        };
        Some(ctx.monitor_tty_size(target).await)
    } else {
        None
    };

    if let Err(e) = hold.wait().await {
        tracing::debug!("Error hijack: {}", e);
        return Err(e.into());
    }

    let (_, status) = exec_exit_code(client, &exec_id).await?;
    if status != 0 {
        return Err(StatusError {
            status_code: status,
        }
        .into());
    }

    Ok(())
}

/// Execute the `attach` command
pub async fn execute_attach(ctx: &CommandContext, args: AttachArgs) -> anyhow::Result<()> {
    let client = &ctx.client;
    let container = client.container_inspect(&args.container).await?;

    if !container.state.running {
        return Err(DocksideError::InvalidRequest(
            "You cannot attach to a stopped container, start it first".to_string(),
        )
        .into());
    }
    if container.state.paused {
        return Err(DocksideError::InvalidRequest(
            "You cannot attach to a paused container, unpause it first".to_string(),
        )
        .into());
    }

    let tty = container.config.tty;
    check_tty_input(!args.no_stdin, tty, ctx.stdin_is_terminal)?;

    let options = AttachOptions {
        stream: true,
        stdin: !args.no_stdin && container.config.open_stdin,
        stdout: true,
        stderr: true,
        detach_keys: ctx.detach_keys(args.detach_keys.as_deref())?,
    };

    let _forwarder = if args.sig_proxy && !tty {
        let target = ContainerSignals {
            client: client.clone(),
            container_id: args.container.clone(),
        };
        Some(forward_all_signals(Arc::new(target))?)
    } else {
        None
    };

    let resp = client.container_attach(&args.container, &options).await?;

    let _monitor = if tty && ctx.stdout_is_terminal {
        let target = ResizeTarget::Container {
            client: client.clone(),
            id: args.container.clone(),
        };
        // Nudge the size so a shell that is already running redraws its
        // prompt; the monitor then sets the real size.
        if let Some(size) = terminal_size(libc::STDOUT_FILENO) {
            let nudged = TerminalSize::new(size.rows.saturating_add(1), size.cols.saturating_add(1));
            resize_to(&target, nudged).await;
        }
        Some(ctx.monitor_tty_size(target).await)
    } else {
        None
    };

    let session = HijackedSession {
        tty,
        input: options.stdin.then(|| ctx.stdin()),
        output: Some(ctx.stdout()),
        error: Some(ctx.stderr()),
        response: resp,
        terminal: ctx.terminal(),
    };
    session.hold(CancellationToken::new()).await?;

    let (_, status) = container_exit_code(client, &args.container).await?;
    if status != 0 {
        return Err(StatusError {
            status_code: status,
        }
        .into());
    }

    Ok(())
}
