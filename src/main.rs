//! Dockside CLI entry point
//!
//! A Docker-compatible client for attaching to, executing in and running
//! containers on a remote daemon.

use clap::Parser;
use dockside::cli::{Cli, CommandContext, Commands};
use dockside::config::Settings;
use dockside::StatusError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides the command line
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter())),
        )
        .init();

    let result = run(cli).await;

    if let Err(e) = &result {
        if let Some(status) = e.downcast_ref::<StatusError>() {
            std::process::exit(status.status_code);
        }
    }
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::resolve(cli.host.as_deref(), cli.config.as_deref())?;
    tracing::debug!("{} {} using daemon at {}", dockside::APP_NAME, dockside::VERSION, settings.endpoint);
    let ctx = CommandContext::new(settings);

    match cli.command {
        Commands::Run(args) => dockside::cli::run::execute(&ctx, args).await,
        Commands::Exec(args) => dockside::cli::exec::execute(&ctx, args).await,
        Commands::Start(args) => dockside::cli::start::execute(&ctx, args).await,
        Commands::Attach(args) => dockside::cli::exec::execute_attach(&ctx, args).await,
        Commands::Logs(args) => dockside::cli::logs::execute(&ctx, args).await,
    }
}
