//! Interactive sessions over hijacked connections
//!
//! A session ties together the pieces an interactive `attach`, `exec` or
//! `run` needs: raw mode on the local terminal, a task copying container
//! output to the local streams, a task copying local stdin into the
//! connection, and the rules for deciding when the session is over.

pub mod keys;
pub mod resize;
pub mod signals;
pub mod stdin;
pub mod terminal;

use crate::client::hijack::{close_write, HijackedReader, HijackedWriter};
use crate::client::{DaemonClient, HijackedResponse};
use crate::stream::demultiplex;
use crate::{DocksideError, Result};
use std::sync::Arc;
use terminal::{RestoreGuard, RestoreOnce, TerminalControl};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

/// Local input stream of a session
pub type InputStream = Box<dyn AsyncRead + Send + Unpin>;

/// Local output stream of a session
pub type OutputStream = Box<dyn AsyncWrite + Send + Unpin>;

const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// An attached stream pair plus the local ends it is copied to
pub struct HijackedSession {
    /// The remote side allocated a TTY: output is raw, not multiplexed
    pub tty: bool,
    pub input: Option<InputStream>,
    pub output: Option<OutputStream>,
    pub error: Option<OutputStream>,
    pub response: HijackedResponse,
    pub terminal: Arc<dyn TerminalControl>,
}

impl HijackedSession {
    /// Copy between the connection and the local streams until the session
    /// ends.
    ///
    /// The session ends when output reaches EOF, when input reaches EOF and
    /// output then finishes, or when `cancel` fires. An output error is
    /// returned; input errors only end the input side. If input is attached
    /// in TTY mode the local terminal is in raw mode for the duration and is
    /// restored exactly once on every way out.
    pub async fn hold(self, cancel: CancellationToken) -> Result<()> {
        let HijackedSession {
            tty,
            input,
            output,
            error,
            response,
            terminal,
        } = self;

        let has_input = input.is_some();
        let restore = Arc::new(RestoreOnce::new(terminal.clone()));
        let _guard = if has_input && tty {
            terminal.set_raw()?;
            Some(RestoreGuard(restore.clone()))
        } else {
            None
        };

        let (reader, writer) = response.into_parts();

        let mut receive = if output.is_some() || error.is_some() {
            Some(tokio::spawn(receive_output(
                reader,
                output,
                error,
                tty,
                has_input.then(|| restore.clone()),
            )))
        } else {
            None
        };

        let mut send = tokio::spawn(send_input(
            writer,
            input,
            (tty && has_input).then(|| restore.clone()),
        ));

        let result = match receive.as_mut() {
            Some(receive) => {
                tokio::select! {
                    r = &mut *receive => joined(r),
                    _ = &mut send => {
                        tokio::select! {
                            r = &mut *receive => joined(r),
                            _ = cancel.cancelled() => Ok(()),
                        }
                    }
                    _ = cancel.cancelled() => Ok(()),
                }
            }
            None => {
                tokio::select! {
                    _ = &mut send => Ok(()),
                    _ = cancel.cancelled() => Ok(()),
                }
            }
        };

        if let Some(receive) = receive {
            receive.abort();
        }
        send.abort();

        if let Err(e) = &result {
            tracing::debug!("Error receiveStdout: {}", e);
        }
        result
    }

    /// Hold the session on its own task
    pub fn spawn(self) -> SessionTask {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.hold(cancel.clone()));
        SessionTask { cancel, task }
    }
}

/// A session held on a background task
pub struct SessionTask {
    cancel: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl SessionTask {
    /// Wait for the session to end by itself
    pub async fn wait(self) -> Result<()> {
        joined(self.task.await)
    }

    /// End the session and wait for it to unwind. The local terminal has
    /// been restored by the time this returns.
    pub async fn cancel(self) -> Result<()> {
        self.cancel.cancel();
        self.wait().await
    }
}

fn joined(result: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    result.map_err(|e| DocksideError::Stream(format!("session task failed: {}", e)))?
}

/// Copy container output to the local streams
async fn receive_output(
    mut reader: HijackedReader,
    output: Option<OutputStream>,
    error: Option<OutputStream>,
    tty: bool,
    restore: Option<Arc<RestoreOnce>>,
) -> Result<()> {
    let result = match (tty, output, error) {
        (true, Some(mut dest), _) | (true, None, Some(mut dest)) => {
            let copied = copy_flushing(&mut reader, &mut dest).await;
            // Put the terminal back as soon as the remote side is done so
            // anything printed afterwards is not mangled by raw mode.
            if let Some(restore) = restore {
                restore.restore();
            }
            copied.map(|_| ()).map_err(DocksideError::from)
        }
        (_, mut output, mut error) => {
            demultiplex(&mut reader, output.as_deref_mut(), error.as_deref_mut())
                .await
                .map(|_| ())
        }
    };
    tracing::debug!("[hijack] End of stdout");
    result
}

/// Copy local input into the connection, then half-close it
async fn send_input(
    mut writer: HijackedWriter,
    input: Option<InputStream>,
    restore: Option<Arc<RestoreOnce>>,
) {
    if let Some(mut input) = input {
        if let Err(e) = copy_flushing(&mut input, &mut writer).await {
            tracing::debug!("Error sendStdin: {}", e);
        }
        if let Some(restore) = restore {
            restore.restore();
        }
        tracing::debug!("[hijack] End of stdin");
    }

    if let Err(e) = close_write(&mut writer).await {
        tracing::debug!("Couldn't send EOF: {}", e);
    }
}

/// Copy until EOF, flushing after every chunk so interactive output shows up
/// immediately
async fn copy_flushing<R, W>(reader: &mut R, writer: &mut W) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            writer.flush().await?;
            return Ok(total);
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        total += n as u64;
    }
}

/// Whether a container is still running and its exit code.
///
/// If the daemon cannot be reached it probably died with the container, so
/// that case reports `(false, -1)` rather than an error.
pub async fn container_exit_code(client: &DaemonClient, id: &str) -> Result<(bool, i32)> {
    match client.container_inspect(id).await {
        Ok(container) => Ok((container.state.running, container.state.exit_code)),
        Err(DocksideError::ConnectionFailed(_)) => Ok((false, -1)),
        Err(e) => Err(e),
    }
}

/// Whether an exec process is still running and its exit code
pub async fn exec_exit_code(client: &DaemonClient, id: &str) -> Result<(bool, i32)> {
    match client.exec_inspect(id).await {
        Ok(exec) => Ok((exec.running, exec.exit_code.unwrap_or(0))),
        Err(DocksideError::ConnectionFailed(_)) => Ok((false, -1)),
        Err(e) => Err(e),
    }
}
