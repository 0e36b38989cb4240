//! Stream abstraction for plain and TLS-upgraded connections.
//!
//! The handshake starts on a cleartext transport and may upgrade to TLS
//! in-band, on the same socket. `NpsStream` abstracts over both states so
//! the rest of the handshake (and whatever the caller attaches afterwards)
//! reads and writes without caring which one it is.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use super::error::{HandshakeError, NpsResult};

/// A connection stream, cleartext or TLS.
///
/// The TLS variant is boxed to keep the enum small; `TlsStream` is much
/// larger than most transports.
pub enum NpsStream<S> {
    /// Cleartext transport
    Plain(S),
    /// TLS-upgraded transport wrapping the original one
    Tls(Box<TlsStream<S>>),
}

impl<S> NpsStream<S> {
    /// Whether the stream has been upgraded to TLS.
    pub fn is_encrypted(&self) -> bool {
        matches!(self, NpsStream::Tls(_))
    }

    /// The cleartext transport, if not upgraded.
    pub fn as_plain(&self) -> Option<&S> {
        match self {
            NpsStream::Plain(s) => Some(s),
            NpsStream::Tls(_) => None,
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> NpsStream<S> {
    /// Run the TLS client handshake over the current transport, replacing
    /// it with the secure stream. The connection must still be cleartext.
    pub(crate) async fn upgrade(
        self,
        connector: &TlsConnector,
        server_name: ServerName<'static>,
    ) -> NpsResult<Self> {
        match self {
            NpsStream::Plain(stream) => {
                let tls = connector
                    .connect(server_name, stream)
                    .await
                    .map_err(|e| HandshakeError::TlsHandshakeFailed(e.to_string()))?;
                Ok(NpsStream::Tls(Box::new(tls)))
            }
            NpsStream::Tls(_) => Err(HandshakeError::TlsHandshakeFailed(
                "connection is already TLS".to_string(),
            )),
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for NpsStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            NpsStream::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            NpsStream::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncWrite for NpsStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            NpsStream::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            NpsStream::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            NpsStream::Plain(stream) => Pin::new(stream).poll_flush(cx),
            NpsStream::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            NpsStream::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            NpsStream::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

impl<S> std::fmt::Debug for NpsStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NpsStream::Plain(_) => f.write_str("NpsStream::Plain"),
            NpsStream::Tls(_) => f.write_str("NpsStream::Tls"),
        }
    }
}
