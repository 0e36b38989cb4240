//! # NPS Wire Protocol
//!
//! Client-side implementation of the Netezza Performance Server connection
//! handshake: the state machine that turns a raw TCP connection into a
//! ready-for-query session.
//!
//! ## Overview
//!
//! The handshake negotiates a connection-protocol version, selects the
//! database, optionally upgrades the transport to TLS in-band, streams
//! client identity attributes for audit, answers the server's
//! authentication challenge, and drains the post-authentication preamble
//! until the ready-for-query marker.
//!
//! Although the protocol reuses a few PostgreSQL message-type letters, it
//! is not PostgreSQL-compatible: frames carry 16-bit opcodes, the
//! completion drain has its own non-uniform framing, and the TLS upgrade
//! happens inside the handshake rather than before it.
//!
//! ## Submodules
//!
//! - [`version`] - Connection-protocol versions and the sub-protocol pair
//! - [`frame`] - Handshake opcodes and the length-prefixed frame encoder
//! - [`auth`] - Authentication challenges and salted credentials
//! - [`reader`] - Buffered byte reader with read deadlines
//! - [`stream`] - Plain/TLS stream abstraction
//! - [`tls`] - Security levels and TLS client configuration
//! - [`context`] - Ambient client identity snapshot
//! - [`handshake`] - The handshake driver itself
//! - [`error`] - Error taxonomy

pub mod auth;
pub mod context;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod reader;
pub mod stream;
pub mod tls;
pub mod version;

pub use auth::AuthRequest;
pub use context::ClientContext;
pub use error::{HandshakeError, NpsResult};
pub use frame::{FrameCodec, HandshakeFrame, HandshakeOpcode};
pub use handshake::{
    BackendKeyData, HandshakeDriver, HandshakeOptions, HandshakeResult,
};
pub use reader::{ByteReader, DEFAULT_READ_TIMEOUT};
pub use stream::NpsStream;
pub use tls::{SecurityLevel, TlsOptions};
pub use version::{CpVersion, SubProtocol};

/// Default NPS server port.
pub const DEFAULT_PORT: u16 = 5480;

/// Client type value announced under the CLIENT_TYPE opcode.
pub const CLIENT_TYPE_VALUE: i16 = 15;
