//! Local input read on a dedicated thread
//!
//! A blocking read on stdin cannot be cancelled. Reading on a detached
//! thread that feeds a channel means a finished session never waits for
//! the user's next key press, and neither does runtime shutdown.

use std::io::Read;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;

const CHUNK_SIZE: usize = 4096;

/// Chunks read ahead of the consumer
const CHANNEL_DEPTH: usize = 4;

/// Async reader over a blocking source read on its own thread
pub struct ThreadedReader {
    rx: mpsc::Receiver<std::io::Result<Vec<u8>>>,
    chunk: Vec<u8>,
    pos: usize,
}

impl ThreadedReader {
    /// Start reading `source` on a detached thread
    pub fn spawn<R: Read + Send + 'static>(mut source: R) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);

        std::thread::spawn(move || loop {
            let mut buf = vec![0u8; CHUNK_SIZE];
            match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    buf.truncate(n);
                    if tx.blocking_send(Ok(buf)).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let _ = tx.blocking_send(Err(e));
                    break;
                }
            }
        });

        Self {
            rx,
            chunk: Vec::new(),
            pos: 0,
        }
    }

    /// Read the process's stdin
    pub fn stdin() -> Self {
        Self::spawn(std::io::stdin())
    }
}

impl AsyncRead for ThreadedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = &mut *self;
        loop {
            if this.pos < this.chunk.len() {
                let n = buf.remaining().min(this.chunk.len() - this.pos);
                buf.put_slice(&this.chunk[this.pos..this.pos + n]);
                this.pos += n;
                return Poll::Ready(Ok(()));
            }

            match ready!(this.rx.poll_recv(cx)) {
                Some(Ok(chunk)) => {
                    this.chunk = chunk;
                    this.pos = 0;
                }
                Some(Err(e)) => return Poll::Ready(Err(e)),
                None => return Poll::Ready(Ok(())),
            }
        }
    }
}
