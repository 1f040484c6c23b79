//! Hijacked (upgraded) daemon connections
//!
//! After the daemon answers `101 Switching Protocols` the HTTP connection
//! becomes a raw byte stream: container output is read from it and local
//! stdin is written to it.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Boxed read half of a hijacked connection
pub type HijackedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write half of a hijacked connection
pub type HijackedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Both halves of an upgraded connection
pub struct HijackedResponse {
    pub reader: HijackedReader,
    pub writer: HijackedWriter,
}

impl HijackedResponse {
    /// Build a hijacked response from any duplex stream
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// Split into independently owned halves
    pub fn into_parts(self) -> (HijackedReader, HijackedWriter) {
        (self.reader, self.writer)
    }
}

/// Half-close the connection so the remote process sees EOF on stdin
pub async fn close_write(writer: &mut HijackedWriter) -> std::io::Result<()> {
    writer.flush().await?;
    writer.shutdown().await
}
