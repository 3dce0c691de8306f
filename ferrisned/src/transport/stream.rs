//! Transport over a generic async byte stream.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::Transport;
use crate::error::{Result, TransportError};

const READ_CHUNK: usize = 4096;

/// Transport over any `AsyncRead + AsyncWrite` stream.
///
/// No telnet option negotiation is performed; the peer is expected to
/// behave like a plain terminal line.
pub struct StreamTransport<S> {
    stream: S,
    buf: Vec<u8>,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a connected stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: vec![0; READ_CHUNK],
        }
    }

    /// Unwrap the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.stream
            .write_all(data)
            .await
            .map_err(TransportError::Io)?;
        self.stream.flush().await.map_err(TransportError::Io)?;
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Vec<u8>>> {
        let n = self
            .stream
            .read(&mut self.buf)
            .await
            .map_err(TransportError::Io)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(self.buf[..n].to_vec()))
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await.map_err(TransportError::Io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_and_writes_through_stream() {
        let mock = tokio_test::io::Builder::new()
            .read(b"router#")
            .write(b"show version\n")
            .read(b"Cisco IOS Software\nrouter#")
            .build();
        let mut transport = StreamTransport::new(mock);

        assert_eq!(transport.read().await.unwrap(), Some(b"router#".to_vec()));
        transport.write(b"show version\n").await.unwrap();
        let chunk = transport.read().await.unwrap().unwrap();
        assert!(chunk.starts_with(b"Cisco IOS Software"));
    }

    #[tokio::test]
    async fn test_eof_is_none() {
        let mock = tokio_test::io::Builder::new().build();
        let mut transport = StreamTransport::new(mock);
        assert_eq!(transport.read().await.unwrap(), None);
    }
}
