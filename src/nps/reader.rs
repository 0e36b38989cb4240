//! Buffered byte reader for the handshake.
//!
//! The reader owns the single receive buffer for the connection: all inbound
//! bytes land here, and every phase of the handshake consumes them in FIFO
//! order through [`ByteReader::read_exact`]. Reading ahead past a message
//! boundary is allowed; whatever is left over at the end of the handshake is
//! handed back to the caller untouched.

use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::{HandshakeError, NpsResult};

/// Default read deadline: fail if no byte arrives for this long.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

const READ_CHUNK: usize = 8192;

/// FIFO receive buffer with a per-read deadline.
///
/// The buffer deliberately does not own the stream: the stream is passed
/// into each read so the in-band TLS upgrade can swap transports while the
/// buffered bytes survive.
#[derive(Debug)]
pub struct ByteReader {
    buf: BytesMut,
    timeout: Duration,
}

impl ByteReader {
    /// Reader with the default 30 second deadline.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_READ_TIMEOUT)
    }

    /// Reader with a caller-chosen deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            buf: BytesMut::with_capacity(READ_CHUNK),
            timeout,
        }
    }

    /// Pull one chunk from the transport into the buffer.
    ///
    /// The deadline applies to each individual read, so a slow-but-live
    /// server resets the clock with every chunk it sends.
    async fn fill<S>(&mut self, stream: &mut S) -> NpsResult<usize>
    where
        S: AsyncRead + Unpin,
    {
        let read = tokio::time::timeout(self.timeout, stream.read_buf(&mut self.buf))
            .await
            .map_err(|_| HandshakeError::Timeout(self.timeout))??;
        if read == 0 {
            return Err(HandshakeError::TransportClosed);
        }
        Ok(read)
    }

    /// Return the next `n` bytes, waiting for the transport as needed.
    pub async fn read_exact<S>(&mut self, stream: &mut S, n: usize) -> NpsResult<Bytes>
    where
        S: AsyncRead + Unpin,
    {
        while self.buf.len() < n {
            self.fill(stream).await?;
        }
        Ok(self.buf.split_to(n).freeze())
    }

    /// Read a single byte.
    pub async fn read_u8<S>(&mut self, stream: &mut S) -> NpsResult<u8>
    where
        S: AsyncRead + Unpin,
    {
        let bytes = self.read_exact(stream, 1).await?;
        Ok(bytes[0])
    }

    /// Read a big-endian int32.
    pub async fn read_i32<S>(&mut self, stream: &mut S) -> NpsResult<i32>
    where
        S: AsyncRead + Unpin,
    {
        let mut bytes = self.read_exact(stream, 4).await?;
        Ok(bytes.get_i32())
    }

    /// Read whatever is available, up to `max` bytes.
    ///
    /// Behaves like a bounded socket read: if the buffer already holds
    /// bytes they are returned immediately, otherwise one read from the
    /// transport is awaited. Used for the free-form error payload in the
    /// completion drain, where the server may close right after writing.
    pub async fn read_available<S>(&mut self, stream: &mut S, max: usize) -> NpsResult<Bytes>
    where
        S: AsyncRead + Unpin,
    {
        if self.buf.is_empty() {
            self.fill(stream).await?;
        }
        let n = self.buf.len().min(max);
        Ok(self.buf.split_to(n).freeze())
    }

    /// Number of bytes buffered but not yet consumed.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drain the buffer, handing its contents to the caller.
    pub fn take_remaining(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

impl Default for ByteReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_read_exact_single_write() {
        let (mut client, mut server) = tokio::io::duplex(64);
        server.write_all(b"hello").await.unwrap();

        let mut reader = ByteReader::new();
        let bytes = reader.read_exact(&mut client, 5).await.unwrap();
        assert_eq!(&bytes[..], b"hello");
        assert!(reader.is_empty());
    }

    #[tokio::test]
    async fn test_read_exact_across_writes() {
        let (mut client, mut server) = tokio::io::duplex(64);

        let writer = tokio::spawn(async move {
            server.write_all(b"he").await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            server.write_all(b"llo").await.unwrap();
            server
        });

        let mut reader = ByteReader::new();
        let bytes = reader.read_exact(&mut client, 5).await.unwrap();
        assert_eq!(&bytes[..], b"hello");
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn test_fifo_read_ahead() {
        let (mut client, mut server) = tokio::io::duplex(64);
        server.write_all(b"0123456789").await.unwrap();

        let mut reader = ByteReader::new();
        assert_eq!(&reader.read_exact(&mut client, 3).await.unwrap()[..], b"012");
        assert_eq!(&reader.read_exact(&mut client, 4).await.unwrap()[..], b"3456");
        // The tail stays buffered and is handed back on request
        assert_eq!(reader.buffered_len(), 3);
        assert_eq!(&reader.take_remaining()[..], b"789");
        assert!(reader.is_empty());
    }

    #[tokio::test]
    async fn test_read_u8_and_i32() {
        let (mut client, mut server) = tokio::io::duplex(64);
        server.write_all(&[b'N', 0, 0, 0, 5]).await.unwrap();

        let mut reader = ByteReader::new();
        assert_eq!(reader.read_u8(&mut client).await.unwrap(), b'N');
        assert_eq!(reader.read_i32(&mut client).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_eof_is_transport_closed() {
        let (mut client, server) = tokio::io::duplex(64);
        drop(server);

        let mut reader = ByteReader::new();
        let err = reader.read_exact(&mut client, 1).await.unwrap_err();
        assert!(matches!(err, HandshakeError::TransportClosed));
    }

    #[tokio::test]
    async fn test_eof_midway_is_transport_closed() {
        let (mut client, mut server) = tokio::io::duplex(64);
        server.write_all(b"ab").await.unwrap();
        drop(server);

        let mut reader = ByteReader::new();
        let err = reader.read_exact(&mut client, 4).await.unwrap_err();
        assert!(matches!(err, HandshakeError::TransportClosed));
    }

    #[tokio::test]
    async fn test_stalled_read_times_out() {
        let (mut client, _server) = tokio::io::duplex(64);

        let mut reader = ByteReader::with_timeout(Duration::from_millis(50));
        let err = reader.read_exact(&mut client, 1).await.unwrap_err();
        assert!(matches!(err, HandshakeError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_bytes_arriving_mid_wait_complete_the_read() {
        let (mut client, mut server) = tokio::io::duplex(64);

        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            server.write_all(b"xyz").await.unwrap();
            server
        });

        let mut reader = ByteReader::with_timeout(Duration::from_secs(1));
        let bytes = reader.read_exact(&mut client, 3).await.unwrap();
        assert_eq!(&bytes[..], b"xyz");
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn test_read_available_returns_what_arrived() {
        let (mut client, mut server) = tokio::io::duplex(64);
        server.write_all(b"short message").await.unwrap();
        drop(server);

        let mut reader = ByteReader::new();
        let bytes = reader.read_available(&mut client, 2000).await.unwrap();
        assert_eq!(&bytes[..], b"short message");
    }

    #[tokio::test]
    async fn test_read_available_caps_at_max() {
        let (mut client, mut server) = tokio::io::duplex(64);
        server.write_all(b"0123456789").await.unwrap();

        let mut reader = ByteReader::new();
        let bytes = reader.read_available(&mut client, 4).await.unwrap();
        assert_eq!(&bytes[..], b"0123");
        assert_eq!(reader.buffered_len(), 6);
    }

    #[tokio::test]
    async fn test_read_available_prefers_buffered_bytes() {
        let (mut client, mut server) = tokio::io::duplex(64);
        server.write_all(b"abcd").await.unwrap();

        let mut reader = ByteReader::new();
        // Prime the buffer past the first read
        assert_eq!(&reader.read_exact(&mut client, 1).await.unwrap()[..], b"a");
        let bytes = reader.read_available(&mut client, 2000).await.unwrap();
        assert_eq!(&bytes[..], b"bcd");
    }

    #[tokio::test]
    async fn test_read_available_empty_stream_is_closed() {
        let (mut client, server) = tokio::io::duplex(64);
        drop(server);

        let mut reader = ByteReader::new();
        let err = reader.read_available(&mut client, 2000).await.unwrap_err();
        assert!(matches!(err, HandshakeError::TransportClosed));
    }
}
