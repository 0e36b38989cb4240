//! Handshake error types.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result type for handshake operations.
pub type NpsResult<T> = Result<T, HandshakeError>;

/// Errors surfaced by the handshake driver.
///
/// Every variant is fatal to the current connection attempt: the driver
/// never retries, and the caller is responsible for closing the transport.
#[derive(Error, Debug)]
pub enum HandshakeError {
    /// The server sent a byte the protocol does not admit at this point
    #[error("protocol violation: unexpected byte 0x{0:02X}")]
    BadProtocol(u8),

    /// The server rejected a connection attribute
    #[error("server rejected a connection attribute")]
    BadAttributeValue,

    /// The server counter-offered a version outside 2..5
    #[error("server offered unsupported protocol version byte 0x{0:02X}")]
    UnsupportedVersion(u8),

    /// The sub-protocol fallback walk ran past its floor
    #[error("sub-protocol fallback exhausted")]
    ProtocolExhausted,

    /// The server rejected the database selection
    #[error("server rejected the requested database")]
    DatabaseRejected,

    /// The server insisted on TLS but the security level forbids it
    #[error("server requires TLS but security level is unsecured-only")]
    TlsRefused,

    /// The server refused TLS but the security level requires it
    #[error("server refused TLS but security level is secured-only")]
    TlsRequired,

    /// The server answered the TLS probe with an error
    #[error("server rejected TLS negotiation")]
    TlsRejected,

    /// The in-band TLS upgrade failed
    #[error("TLS handshake failed: {0}")]
    TlsHandshakeFailed(String),

    /// Invalid TLS configuration (certificates, keys, server name)
    #[error("invalid TLS configuration: {0}")]
    TlsConfig(String),

    /// The server demanded an authentication method this client lacks
    #[error("unsupported authentication method {0}")]
    UnsupportedAuthMethod(i32),

    /// The server reported an error during the completion drain
    #[error("server error: {0}")]
    ServerError(String),

    /// Something other than an authentication request arrived where one was
    /// required
    #[error("expected authentication request, got message type 0x{0:02X}")]
    UnexpectedMessage(u8),

    /// No byte arrived within the read deadline
    #[error("read timed out after {0:?}")]
    Timeout(Duration),

    /// The transport ended before the expected bytes arrived
    #[error("connection closed by server during handshake")]
    TransportClosed,

    /// Transport-level I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
