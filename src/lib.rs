//! # Netezza Driver
//!
//! An async Rust client handshake for [IBM Netezza Performance Server]
//! (NPS), implementing the full connection protocol: version negotiation,
//! session setup with in-band TLS upgrade, client metadata streaming,
//! authentication, and the completion drain that leaves the connection
//! ready for queries.
//!
//! [IBM Netezza Performance Server]: https://www.ibm.com/products/netezza
//!
//! ## Features
//!
//! - **Connection protocol 2-6** - Negotiates down from CP6 automatically
//! - **Async/Await** - Built on Tokio, generic over any duplex transport
//! - **In-band TLS** - Upgrades the same socket mid-handshake via rustls
//! - **Authentication** - None, cleartext, salted MD5, salted SHA-256
//! - **Read-ahead safe** - Bytes past the ready-for-query marker are
//!   handed back for the caller's message parser
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netezza_driver::{DEFAULT_PORT, HandshakeDriver, HandshakeOptions, SecurityLevel};
//! use tokio::net::TcpStream;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tcp = TcpStream::connect(("nps.example.com", DEFAULT_PORT)).await?;
//!     tcp.set_nodelay(true)?;
//!
//!     let driver = HandshakeDriver::new(tcp, None, HandshakeOptions::default());
//!     let session = driver
//!         .startup(
//!             Some("sales"),
//!             SecurityLevel::PreferredUnsecured,
//!             "admin",
//!             "password",
//!             None,
//!         )
//!         .await?;
//!
//!     // Attach a message parser to `session.stream`, feeding it
//!     // `session.remaining` first.
//!     println!("negotiated {} protocol {}", session.version, session.protocol);
//!     Ok(())
//! }
//! ```
//!
//! ## TLS
//!
//! The server may demand TLS during session setup; the upgrade happens on
//! the same socket, after cleartext frames have already been exchanged:
//!
//! ```rust,no_run
//! use netezza_driver::{HandshakeDriver, HandshakeOptions, SecurityLevel, TlsOptions};
//! # async fn example(tcp: tokio::net::TcpStream) -> Result<(), Box<dyn std::error::Error>> {
//! let tls = TlsOptions::new("nps.example.com").with_ca("/etc/nps/ca.pem");
//! let driver = HandshakeDriver::new(tcp, Some(tls), HandshakeOptions::default());
//! let session = driver
//!     .startup(None, SecurityLevel::OnlySecured, "admin", "password", None)
//!     .await?;
//! assert!(session.stream.is_encrypted());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every operation returns [`NpsResult`]; all handshake errors are fatal to
//! the connection attempt and the driver never retries:
//!
//! ```rust,no_run
//! # use netezza_driver::{HandshakeDriver, HandshakeOptions, HandshakeError, SecurityLevel};
//! # async fn example(tcp: tokio::net::TcpStream) -> Result<(), Box<dyn std::error::Error>> {
//! let driver = HandshakeDriver::new(tcp, None, HandshakeOptions::default());
//! match driver.startup(None, SecurityLevel::OnlySecured, "admin", "pw", None).await {
//!     Ok(session) => println!("ready for query, {}", session.version),
//!     Err(HandshakeError::TlsRequired) => eprintln!("server refused TLS"),
//!     Err(e) => eprintln!("handshake failed: {e}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`nps`] - The wire protocol implementation

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod nps;

// Re-exports for convenience
pub use nps::{
    AuthRequest, BackendKeyData, ByteReader, ClientContext, CpVersion, FrameCodec,
    HandshakeDriver, HandshakeError, HandshakeFrame, HandshakeOpcode, HandshakeOptions,
    HandshakeResult, NpsResult, NpsStream, SecurityLevel, SubProtocol, TlsOptions,
    CLIENT_TYPE_VALUE, DEFAULT_PORT, DEFAULT_READ_TIMEOUT,
};
