//! `dockside run` command implementation

use super::CommandContext;
use crate::client::types::{AttachOptions, ContainerConfig, HostConfig, RestartPolicy};
use crate::session::resize::ResizeTarget;
use crate::session::signals::{forward_all_signals, ContainerSignals};
use crate::session::terminal::check_tty_input;
use crate::session::{container_exit_code, HijackedSession};
use crate::{DocksideError, StatusError};
use clap::Args;
use std::sync::Arc;

/// Exit status for failures of the daemon itself
pub const EXIT_DAEMON_FAILURE: i32 = 125;

/// Exit status when the container command cannot be invoked
pub const EXIT_CANNOT_INVOKE: i32 = 126;

/// Exit status when the container command does not exist
pub const EXIT_NOT_FOUND: i32 = 127;

/// Arguments for the `run` command
#[derive(Args)]
pub struct RunArgs {
    /// Image to run
    pub image: String,

    /// Command to run in the container
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Container name
    #[arg(long)]
    pub name: Option<String>,

    /// Run container in background and print container ID
    #[arg(short, long)]
    pub detach: bool,

    /// Automatically remove the container when it exits
    #[arg(long)]
    pub rm: bool,

    /// Attach to STDIN, STDOUT or STDERR
    #[arg(short, long, value_parser = ["stdin", "stdout", "stderr"])]
    pub attach: Vec<String>,

    /// Set environment variables
    #[arg(short, long)]
    pub env: Vec<String>,

    /// Working directory inside the container
    #[arg(short, long)]
    pub workdir: Option<String>,

    /// Username or UID
    #[arg(short, long)]
    pub user: Option<String>,

    /// Keep STDIN open even if not attached
    #[arg(short, long)]
    pub interactive: bool,

    /// Allocate a pseudo-TTY
    #[arg(short, long)]
    pub tty: bool,

    /// Override the default entrypoint
    #[arg(long)]
    pub entrypoint: Option<String>,

    /// Container hostname
    #[arg(long)]
    pub hostname: Option<String>,

    /// Restart policy to apply when a container exits
    #[arg(long, default_value = "no")]
    pub restart: String,

    /// Proxy received signals to the process
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub sig_proxy: bool,

    /// Override the key sequence for detaching a container
    #[arg(long)]
    pub detach_keys: Option<String>,
}

impl RunArgs {
    /// Check flag combinations that cannot work together
    pub fn validate(&self, restart: &RestartPolicy) -> Result<(), DocksideError> {
        if self.detach && !self.attach.is_empty() {
            return Err(DocksideError::InvalidRequest(
                "Conflicting options: -a and -d".to_string(),
            ));
        }
        if self.detach && self.rm {
            return Err(DocksideError::InvalidRequest(
                "Conflicting options: --rm and -d".to_string(),
            ));
        }
        if self.rm && (restart.is_always() || restart.is_on_failure()) {
            return Err(DocksideError::InvalidRequest(
                "Conflicting options: --restart and --rm".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the create request.
    ///
    /// Detached containers attach nothing. Otherwise `-a` picks the streams;
    /// without it stdout and stderr are attached, plus stdin with `-i`.
    pub fn container_config(&self, restart: RestartPolicy) -> ContainerConfig {
        let (attach_stdin, attach_stdout, attach_stderr) = if self.detach {
            (false, false, false)
        } else if self.attach.is_empty() {
            (self.interactive, true, true)
        } else {
            let has = |s: &str| self.attach.iter().any(|a| a.eq_ignore_ascii_case(s));
            (has("stdin"), has("stdout"), has("stderr"))
        };

        ContainerConfig {
            image: self.image.clone(),
            cmd: self.command.clone(),
            entrypoint: self.entrypoint.clone().map(|e| vec![e]),
            env: self.env.clone(),
            working_dir: self.workdir.clone(),
            user: self.user.clone(),
            hostname: self.hostname.clone(),
            tty: self.tty,
            open_stdin: self.interactive,
            stdin_once: attach_stdin && self.interactive,
            attach_stdin,
            attach_stdout,
            attach_stderr,
            host_config: HostConfig {
                restart_policy: restart,
            },
        }
    }
}

/// Map a create/start failure to the exit status `run` reports
pub fn start_error_status(err: &DocksideError) -> i32 {
    let message = err.to_string();
    if message.contains("executable file not found") || message.contains("no such file or directory") {
        EXIT_NOT_FOUND
    } else if message.contains("permission denied") || message.contains("cannot be invoked") {
        EXIT_CANNOT_INVOKE
    } else {
        EXIT_DAEMON_FAILURE
    }
}

fn report_start_error(err: DocksideError) -> anyhow::Error {
    eprintln!("{}", err);
    StatusError {
        status_code: start_error_status(&err),
    }
    .into()
}

/// Execute the `run` command
pub async fn execute(ctx: &CommandContext, args: RunArgs) -> anyhow::Result<()> {
    let restart = RestartPolicy::parse(&args.restart).map_err(report_start_error)?;
    args.validate(&restart)?;

    let config = args.container_config(restart);
    if !args.detach {
        check_tty_input(config.attach_stdin, config.tty, ctx.stdin_is_terminal)?;
    }
    let detach_keys = ctx.detach_keys(args.detach_keys.as_deref())?;

    let created = ctx
        .client
        .container_create(&config, args.name.as_deref())
        .await
        .map_err(report_start_error)?;
    for warning in created.warnings.iter().flatten() {
        eprintln!("WARNING: {}", warning);
    }

    let result = run_created(ctx, &args, &config, &created.id, detach_keys).await;

    if args.rm {
        if let Err(e) = ctx.client.container_remove(&created.id, true).await {
            eprintln!("Error removing container: {}", e);
        }
    }

    result
}

/// Attach to, start and wait for a freshly created container
async fn run_created(
    ctx: &CommandContext,
    args: &RunArgs,
    config: &ContainerConfig,
    id: &str,
    detach_keys: Option<String>,
) -> anyhow::Result<()> {
    let client = &ctx.client;
    let attached = config.attach_stdin || config.attach_stdout || config.attach_stderr;

    // A TTY delivers signals itself from raw input
    let _forwarder = if args.sig_proxy && !config.tty {
        let target = ContainerSignals {
            client: client.clone(),
            container_id: id.to_string(),
        };
        Some(forward_all_signals(Arc::new(target))?)
    } else {
        None
    };

    if !config.attach_stdout && !config.attach_stderr {
        println!("{}", id);
    }

    let hold = if attached {
        let options = AttachOptions {
            stream: true,
            stdin: config.attach_stdin,
            stdout: config.attach_stdout,
            stderr: config.attach_stderr,
            detach_keys,
        };
        let resp = client.container_attach(id, &options).await?;
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
        Some(session.spawn())
    } else {
        None
    };

    if let Err(e) = client.container_start(id).await {
        // The terminal must be back to normal before the error is printed
        if let Some(hold) = hold {
            if let Err(hold_err) = hold.cancel().await {
                tracing::debug!("Error hijack: {}", hold_err);
            }
        }
        return Err(report_start_error(e));
    }

    let _monitor = if attached && config.tty && ctx.stdout_is_terminal {
        let target = ResizeTarget::Container {
            client: client.clone(),
            id: id.to_string(),
        };
        Some(ctx.monitor_tty_size(target).await)
    } else {
        None
    };

    if let Some(hold) = hold {
        if let Err(e) = hold.wait().await {
            tracing::debug!("Error hijack: {}", e);
            return Err(e.into());
        }
    }

    if !config.attach_stdout && !config.attach_stderr {
        return Ok(());
    }

    let status = if args.rm {
        // Wait for the exit, then read the final code before removal
        client.container_wait(id).await.map_err(report_start_error)?;
        container_exit_code(client, id).await?.1
    } else if !config.tty {
        // Without a TTY there is no detaching, so the container must exit
        client.container_wait(id).await?
    } else {
        container_exit_code(client, id).await?.1
    };

    if status != 0 {
        return Err(StatusError {
            status_code: status,
        }
        .into());
    }
    Ok(())
}
