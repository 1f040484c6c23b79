//! Forwarding local signals to the remote container
//!
//! Without a TTY, signals delivered to the client (Ctrl-C in the local
//! terminal, `kill` from another shell) are relayed to the container through
//! the kill endpoint so the remote process sees them instead of the client.

use crate::client::DaemonClient;
use crate::Result;
use nix::sys::signal::Signal;
use std::future::Future;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Signals relayed to the container. `SIGCHLD` is never relayed and
/// `SIGWINCH` is left to the resize monitor.
pub const FORWARDED_SIGNALS: &[Signal] = &[
    Signal::SIGHUP,
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTERM,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
    Signal::SIGALRM,
    Signal::SIGCONT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
    Signal::SIGPIPE,
];

/// Something that can receive a named signal
pub trait SignalSink: Send + Sync + 'static {
    fn kill(&self, signal: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Signals a container through the daemon
#[derive(Debug, Clone)]
pub struct ContainerSignals {
    pub client: DaemonClient,
    pub container_id: String,
}

impl SignalSink for ContainerSignals {
    async fn kill(&self, signal: &str) -> Result<()> {
        self.client.container_kill(&self.container_id, signal).await
    }
}

/// Daemon name of a signal (`SIGINT` -> `INT`); `None` for signals that are
/// never forwarded
pub fn signal_name(sig: Signal) -> Option<&'static str> {
    if sig == Signal::SIGCHLD {
        return None;
    }
    let name = sig.as_str();
    Some(name.strip_prefix("SIG").unwrap_or(name))
}

/// Relays signals until dropped
pub struct SignalForwarder {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for SignalForwarder {
    fn drop(&mut self) {
        self.cancel.cancel();
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Catch every forwardable signal and relay it to `target`
pub fn forward_all_signals<T: SignalSink>(target: Arc<T>) -> Result<SignalForwarder> {
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(128);
    let mut tasks = Vec::with_capacity(FORWARDED_SIGNALS.len() + 1);

    for &sig in FORWARDED_SIGNALS {
        let mut stream = signal(SignalKind::from_raw(sig as i32))?;
        let tx = tx.clone();
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = stream.recv() => {
                        if received.is_none() || tx.send(sig).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }));
    }
    drop(tx);

    tasks.push(tokio::spawn(relay_signals(rx, target, cancel.clone())));
    tracing::debug!("Forwarding {} signals", FORWARDED_SIGNALS.len());

    Ok(SignalForwarder { cancel, tasks })
}

/// Relay received signals to `target` until the channel closes or the token
/// is cancelled
pub async fn relay_signals<T: SignalSink>(
    mut rx: mpsc::Receiver<Signal>,
    target: Arc<T>,
    cancel: CancellationToken,
) {
    loop {
        let sig = tokio::select! {
            _ = cancel.cancelled() => break,
            sig = rx.recv() => match sig {
                Some(sig) => sig,
                None => break,
            },
        };

        let Some(name) = signal_name(sig) else {
            continue;
        };

        if let Err(e) = target.kill(name).await {
            tracing::debug!("Error sending signal {}: {}", name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DocksideError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<String>>,
        fail_first: bool,
    }

    impl SignalSink for RecordingSink {
        async fn kill(&self, signal: &str) -> Result<()> {
            let mut sent = self.sent.lock().unwrap();
            sent.push(signal.to_string());
            if self.fail_first && sent.len() == 1 {
                return Err(DocksideError::NotFound("No such container".to_string()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_signal_names() {
        assert_eq!(signal_name(Signal::SIGINT), Some("INT"));
        assert_eq!(signal_name(Signal::SIGTERM), Some("TERM"));
        assert_eq!(signal_name(Signal::SIGUSR1), Some("USR1"));
        assert_eq!(signal_name(Signal::SIGCHLD), None);
        assert!(!FORWARDED_SIGNALS.contains(&Signal::SIGCHLD));
        assert!(!FORWARDED_SIGNALS.contains(&Signal::SIGWINCH));
    }

    #[tokio::test]
    async fn test_relay_continues_after_kill_error() {
        let sink = Arc::new(RecordingSink {
            fail_first: true,
            ..Default::default()
        });
        let (tx, rx) = mpsc::channel(8);
        tx.send(Signal::SIGINT).await.unwrap();
        tx.send(Signal::SIGCHLD).await.unwrap();
        tx.send(Signal::SIGTERM).await.unwrap();
        drop(tx);

        relay_signals(rx, sink.clone(), CancellationToken::new()).await;

        assert_eq!(*sink.sent.lock().unwrap(), vec!["INT", "TERM"]);
    }

    #[tokio::test]
    async fn test_relay_stops_on_cancel() {
        let sink = Arc::new(RecordingSink::default());
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let relay = tokio::spawn(relay_signals(rx, sink.clone(), cancel.clone()));

        cancel.cancel();
        relay.await.unwrap();

        // The relay dropped its receiver, so nothing more is delivered
        assert!(tx.send(Signal::SIGINT).await.is_err());
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_forwarder_relays_real_signal() {
        let sink = Arc::new(RecordingSink::default());
        let forwarder = forward_all_signals(sink.clone()).unwrap();

        nix::sys::signal::raise(Signal::SIGUSR2).unwrap();

        for _ in 0..100 {
            if !sink.sent.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(*sink.sent.lock().unwrap(), vec!["USR2"]);
        drop(forwarder);
    }
}
