//! Propagating local terminal size changes to the remote TTY

use super::terminal::TerminalSize;
use crate::client::DaemonClient;
use crate::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Poll interval when window-change signals are unavailable
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Something with a resizable TTY
pub trait TtyResizer: Send + Sync + 'static {
    fn resize(&self, size: TerminalSize) -> impl Future<Output = Result<()>> + Send;
}

/// Which remote TTY a resize applies to
#[derive(Debug, Clone)]
pub enum ResizeTarget {
    Container { client: DaemonClient, id: String },
    Exec { client: DaemonClient, id: String },
}

impl TtyResizer for ResizeTarget {
    async fn resize(&self, size: TerminalSize) -> Result<()> {
        match self {
            Self::Container { client, id } => client.container_resize(id, size.rows, size.cols).await,
            Self::Exec { client, id } => client.exec_resize(id, size.rows, size.cols).await,
        }
    }
}

/// Push a size to the remote side. Unknown (0x0) sizes are skipped and
/// failures are only logged.
pub async fn resize_to<T: TtyResizer>(target: &T, size: TerminalSize) {
    if size.is_empty() {
        return;
    }
    if let Err(e) = target.resize(size).await {
        tracing::debug!("Error resize: {}", e);
    }
}

/// Background task keeping the remote TTY size in sync; stops on drop
pub struct ResizeMonitor {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Drop for ResizeMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

/// Push the current size once, then again on every window change.
///
/// `current_size` reads the local terminal size. Where window-change
/// signals cannot be registered the size is polled instead.
pub async fn monitor_tty_size<T, F>(target: Arc<T>, current_size: F) -> ResizeMonitor
where
    T: TtyResizer,
    F: Fn() -> Option<TerminalSize> + Send + Sync + 'static,
{
    if let Some(size) = current_size() {
        resize_to(target.as_ref(), size).await;
    }

    let cancel = CancellationToken::new();
    let task = match signal(SignalKind::window_change()) {
        Ok(mut winch) => {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        received = winch.recv() => {
                            if received.is_none() {
                                break;
                            }
                            if let Some(size) = current_size() {
                                resize_to(target.as_ref(), size).await;
                            }
                        }
                    }
                }
            })
        }
        Err(e) => {
            tracing::debug!("Window change signal unavailable, polling size: {}", e);
            tokio::spawn(poll_tty_size(
                target,
                current_size,
                POLL_INTERVAL,
                cancel.clone(),
            ))
        }
    };

    ResizeMonitor { cancel, task }
}

/// Poll the local size and push it whenever it changes
pub async fn poll_tty_size<T, F>(
    target: Arc<T>,
    current_size: F,
    interval: Duration,
    cancel: CancellationToken,
) where
    T: TtyResizer,
    F: Fn() -> Option<TerminalSize> + Send + Sync + 'static,
{
    let mut previous = current_size();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let size = current_size();
                if size != previous {
                    if let Some(size) = size {
                        resize_to(target.as_ref(), size).await;
                    }
                    previous = size;
                }
            }
        }
    }
}
