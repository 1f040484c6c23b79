//! Multiplexed stdio framing
//!
//! Without a TTY the daemon sends stdout and stderr over one stream. Each
//! frame starts with an 8-byte header:
//!
//! ```text
//! [stream id: u8][0u8; 3][payload size: u32 big-endian]
//! ```
//!
//! followed by `size` bytes of payload.

use crate::{DocksideError, Result};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of a frame header
pub const HEADER_LEN: usize = 8;

/// Stream identifiers used in frame headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StdStream {
    Stdin = 0,
    Stdout = 1,
    Stderr = 2,
    /// Error reported by the daemon itself, not the container
    Systemerr = 3,
}

impl StdStream {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Stdin),
            1 => Some(Self::Stdout),
            2 => Some(Self::Stderr),
            3 => Some(Self::Systemerr),
            _ => None,
        }
    }
}

/// Encode a frame header
pub fn frame_header(stream: StdStream, len: u32) -> [u8; HEADER_LEN] {
    let size = len.to_be_bytes();
    [stream as u8, 0, 0, 0, size[0], size[1], size[2], size[3]]
}

/// Fill `buf` as far as possible; returns how many bytes were read before EOF
async fn read_full<R>(src: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = src.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Copy a multiplexed stream into separate stdout and stderr writers.
///
/// Stdin and stdout frames go to `stdout`, stderr frames to `stderr`. A
/// `None` destination discards its frames. Returns the number of payload
/// bytes written. The copy ends quietly at EOF, including when the last
/// frame was cut short.
pub async fn demultiplex<R, O, E>(
    src: &mut R,
    mut stdout: Option<&mut O>,
    mut stderr: Option<&mut E>,
) -> Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    O: AsyncWrite + Unpin + ?Sized,
    E: AsyncWrite + Unpin + ?Sized,
{
    let mut header = [0u8; HEADER_LEN];
    let mut written: u64 = 0;

    loop {
        let n = read_full(src, &mut header).await?;
        if n < HEADER_LEN {
            if n > 0 {
                tracing::debug!("Discarding truncated frame header ({} bytes)", n);
            }
            return Ok(written);
        }

        let stream = StdStream::from_byte(header[0]).ok_or_else(|| {
            DocksideError::Stream(format!("unrecognized input header: {}", header[0]))
        })?;
        let size = u64::from(u32::from_be_bytes([header[4], header[5], header[6], header[7]]));

        // Payloads are copied through a bounded buffer, never allocated whole
        let mut frame = (&mut *src).take(size);
        let (consumed, copied) = match stream {
            StdStream::Stdin | StdStream::Stdout => copy_frame(&mut frame, stdout.as_deref_mut()).await?,
            StdStream::Stderr => copy_frame(&mut frame, stderr.as_deref_mut()).await?,
            StdStream::Systemerr => {
                let mut message = Vec::new();
                frame.read_to_end(&mut message).await?;
                return Err(DocksideError::Stream(format!(
                    "error from daemon in stream: {}",
                    String::from_utf8_lossy(&message)
                )));
            }
        };
        written += copied;

        if consumed < size {
            tracing::debug!("Stream ended inside a frame ({} of {} bytes)", consumed, size);
            return Ok(written);
        }
    }
}

/// Copy one frame payload; returns bytes consumed and bytes written
async fn copy_frame<R, W>(frame: &mut R, dest: Option<&mut W>) -> std::io::Result<(u64, u64)>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    match dest {
        Some(dest) => {
            let n = tokio::io::copy(frame, dest).await?;
            dest.flush().await?;
            Ok((n, n))
        }
        None => {
            let n = tokio::io::copy(frame, &mut tokio::io::sink()).await?;
            Ok((n, 0))
        }
    }
}

/// Writer that wraps every write into a frame for one stream
pub struct StdWriter<W> {
    inner: W,
    stream: StdStream,
    pending: Vec<u8>,
    /// Payload bytes represented by `pending`
    pending_len: usize,
}

impl<W> StdWriter<W> {
    pub fn new(inner: W, stream: StdStream) -> Self {
        Self {
            inner,
            stream,
            pending: Vec::new(),
            pending_len: 0,
        }
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for StdWriter<W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = &mut *self;

        if this.pending.is_empty() {
            if buf.is_empty() {
                return Poll::Ready(Ok(0));
            }
            let len = buf.len().min(u32::MAX as usize);
            this.pending.extend_from_slice(&frame_header(this.stream, len as u32));
            this.pending.extend_from_slice(&buf[..len]);
            this.pending_len = len;
        }

        // A frame is only reported as written once it fully reached the
        // inner writer, so a frame is never split by a retried write.
        while !this.pending.is_empty() {
            match Pin::new(&mut this.inner).poll_write(cx, &this.pending) {
                Poll::Ready(Ok(0)) => {
                    return Poll::Ready(Err(std::io::ErrorKind::WriteZero.into()));
                }
                Poll::Ready(Ok(n)) => {
                    this.pending.drain(..n);
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
        }

        Poll::Ready(Ok(std::mem::take(&mut this.pending_len)))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(stream: StdStream, payload: &[u8]) -> Vec<u8> {
        let mut out = frame_header(stream, payload.len() as u32).to_vec();
        out.extend_from_slice(payload);
        out
    }

    #[tokio::test]
    async fn test_demultiplex_routes_streams() {
        let mut input = Vec::new();
        input.extend(frame(StdStream::Stdout, b"hello "));
        input.extend(frame(StdStream::Stderr, b"oops"));
        input.extend(frame(StdStream::Stdout, b"world"));

        let mut out = Vec::new();
        let mut err = Vec::new();
        let written = demultiplex(&mut input.as_slice(), Some(&mut out), Some(&mut err))
            .await
            .unwrap();

        assert_eq!(out, b"hello world");
        assert_eq!(err, b"oops");
        assert_eq!(written, 15);
    }

    #[tokio::test]
    async fn test_demultiplex_discards_missing_destination() {
        let mut input = Vec::new();
        input.extend(frame(StdStream::Stderr, b"dropped"));
        input.extend(frame(StdStream::Stdout, b"kept"));

        let mut out = Vec::new();
        let written = demultiplex(&mut input.as_slice(), Some(&mut out), None::<&mut Vec<u8>>)
            .await
            .unwrap();
        assert_eq!(out, b"kept");
        assert_eq!(written, 4);
    }

    #[tokio::test]
    async fn test_demultiplex_unknown_stream() {
        let input = vec![9u8, 0, 0, 0, 0, 0, 0, 1, b'x'];
        let mut out = Vec::new();
        let err = demultiplex(&mut input.as_slice(), Some(&mut out), None::<&mut Vec<u8>>)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unrecognized input header: 9"));
    }

    #[tokio::test]
    async fn test_demultiplex_system_error() {
        let input = frame(StdStream::Systemerr, b"exec failed");
        let mut out = Vec::new();
        let err = demultiplex(&mut input.as_slice(), Some(&mut out), None::<&mut Vec<u8>>)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exec failed"));
    }

    #[tokio::test]
    async fn test_demultiplex_truncated_frame() {
        let mut input = frame(StdStream::Stdout, b"complete");
        input.extend(frame_header(StdStream::Stdout, 10));
        input.extend_from_slice(b"part");

        let mut out = Vec::new();
        let written = demultiplex(&mut input.as_slice(), Some(&mut out), None::<&mut Vec<u8>>)
            .await
            .unwrap();
        assert_eq!(out, b"completepart");
        assert_eq!(written, 12);

        let short_header = [1u8, 0, 0];
        let mut out = Vec::new();
        let written = demultiplex(&mut &short_header[..], Some(&mut out), None::<&mut Vec<u8>>)
            .await
            .unwrap();
        assert_eq!(written, 0);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_demultiplex_oversized_header() {
        // A garbled header claims a 4 GiB frame; only what arrives is copied
        let mut input = frame_header(StdStream::Stderr, u32::MAX).to_vec();
        input.extend_from_slice(b"tty text");

        let mut err = Vec::new();
        let written = demultiplex(&mut input.as_slice(), None::<&mut Vec<u8>>, Some(&mut err))
            .await
            .unwrap();
        assert_eq!(err, b"tty text");
        assert_eq!(written, 8);
    }

    #[tokio::test]
    async fn test_demultiplex_split_reads() {
        // The header and payload arrive across many small reads
        let (mut tx, mut rx) = tokio::io::duplex(3);
        let writer = tokio::spawn(async move {
            let mut stdout = StdWriter::new(&mut tx, StdStream::Stdout);
            stdout.write_all(b"a longer payload").await.unwrap();
            let mut stderr = StdWriter::new(&mut tx, StdStream::Stderr);
            stderr.write_all(b"err").await.unwrap();
        });

        let mut out = Vec::new();
        let mut err = Vec::new();
        demultiplex(&mut rx, Some(&mut out), Some(&mut err))
            .await
            .unwrap();
        writer.await.unwrap();

        assert_eq!(out, b"a longer payload");
        assert_eq!(err, b"err");
    }
}
