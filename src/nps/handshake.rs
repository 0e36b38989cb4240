//! NPS connection handshake.
//!
//! The handshake turns a raw transport into a ready-for-query session in
//! four phases:
//!
//! 1. Version negotiation - agree on a connection-protocol version (CP2-CP6)
//! 2. Session setup - database selection, TLS negotiation with optional
//!    in-band upgrade, sub-protocol selection, client metadata streaming
//! 3. Authentication - none, cleartext, salted MD5, or salted SHA-256
//! 4. Completion drain - consume notices, backend key data, and trailing
//!    authentication acknowledgments until the ready-for-query marker
//!
//! The driver is the sole reader and writer of the transport for its
//! lifetime, and is consumed by [`HandshakeDriver::startup`], so a driver
//! can never be reused across attempts.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Encoder;

use super::auth::{self, AuthRequest, SALT_LEN};
use super::context::ClientContext;
use super::error::{HandshakeError, NpsResult};
use super::frame::{FrameCodec, HandshakeFrame, HandshakeOpcode};
use super::reader::{ByteReader, DEFAULT_READ_TIMEOUT};
use super::stream::NpsStream;
use super::tls::{SecurityLevel, TlsOptions};
use super::version::{CpVersion, SubProtocol};
use super::CLIENT_TYPE_VALUE;

/// Server accepted the frame (also the notice message type in the drain).
const ACCEPT: u8 = b'N';
/// Server counter-offers a lower connection-protocol version.
const DOWNGRADE: u8 = b'M';
/// Server rejected the frame, or reports an error in the drain.
const REJECT: u8 = b'E';
/// Server accepted the TLS probe and expects an upgrade.
const TLS_ACCEPT: u8 = b'S';
/// Authentication request / status message type.
const AUTH_REQUEST: u8 = b'R';
/// Backend key data message type.
const BACKEND_KEY: u8 = b'K';
/// Ready-for-query marker, the end of the handshake.
const READY_FOR_QUERY: u8 = b'Z';

/// Defensive cap on version-negotiation redials; the strict-decrease rule
/// already bounds the walk at five.
const MAX_NEGOTIATE_ATTEMPTS: usize = 6;

/// Upper bound on the error payload read in the completion drain.
const ERROR_TEXT_LIMIT: usize = 2000;

/// Filler bytes preceding most completion-drain message bodies.
const DRAIN_FILLER_LEN: usize = 8;

/// Options for a handshake attempt.
#[derive(Debug, Clone)]
pub struct HandshakeOptions {
    /// Application name announced under APPNAME; defaults to the
    /// executable basename
    pub app_name: Option<String>,
    /// Emit per-frame diagnostics through `tracing`
    pub debug: bool,
    /// Deadline for each read from the server
    pub read_timeout: Duration,
}

impl HandshakeOptions {
    /// Override the announced application name.
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    /// Toggle per-frame diagnostics.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Override the per-read deadline.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

impl Default for HandshakeOptions {
    fn default() -> Self {
        Self {
            app_name: None,
            debug: false,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Backend process id and secret key from the `'K'` message, needed later
/// for out-of-band cancel requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendKeyData {
    /// Server-side process id of the backend
    pub process_id: i32,
    /// Secret key authorizing cancel requests
    pub secret_key: i32,
}

/// Outcome of a successful handshake.
///
/// `remaining` holds bytes the driver read past the ready-for-query marker;
/// the caller must feed these into its message parser before reading from
/// the stream again.
#[derive(Debug)]
pub struct HandshakeResult<S> {
    /// The transport, TLS-upgraded if the server requested it
    pub stream: NpsStream<S>,
    /// Read-ahead past the ready-for-query marker
    pub remaining: Bytes,
    /// Negotiated connection-protocol version
    pub version: CpVersion,
    /// Announced sub-protocol pair
    pub protocol: SubProtocol,
    /// Backend key data, if the server sent any
    pub backend_key: Option<BackendKeyData>,
}

/// Drives one connection attempt through the four handshake phases.
///
/// # Example
///
/// ```rust,no_run
/// use netezza_driver::{HandshakeDriver, HandshakeOptions, SecurityLevel, DEFAULT_PORT};
/// use tokio::net::TcpStream;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let tcp = TcpStream::connect(("nps.example.com", DEFAULT_PORT)).await?;
/// tcp.set_nodelay(true)?;
///
/// let driver = HandshakeDriver::new(tcp, None, HandshakeOptions::default());
/// let session = driver
///     .startup(Some("sales"), SecurityLevel::PreferredUnsecured, "admin", "pw", None)
///     .await?;
///
/// println!(
///     "connected: {} protocol {} read-ahead {} bytes",
///     session.version,
///     session.protocol,
///     session.remaining.len(),
/// );
/// # Ok(())
/// # }
/// ```
pub struct HandshakeDriver<S> {
    stream: NpsStream<S>,
    rx: ByteReader,
    codec: FrameCodec,
    write_buf: BytesMut,
    context: ClientContext,
    tls: Option<TlsOptions>,
    debug: bool,
}

impl<S: AsyncRead + AsyncWrite + Unpin> HandshakeDriver<S> {
    /// Create a driver over a connected transport.
    ///
    /// The client identity streamed during session setup is snapshotted
    /// here, not at `startup`, so the attempt is deterministic once the
    /// driver exists.
    pub fn new(stream: S, tls: Option<TlsOptions>, options: HandshakeOptions) -> Self {
        let mut context = ClientContext::capture();
        if let Some(app_name) = options.app_name {
            context.app_name = app_name;
        }
        Self {
            stream: NpsStream::Plain(stream),
            rx: ByteReader::with_timeout(options.read_timeout),
            codec: FrameCodec::new(),
            write_buf: BytesMut::with_capacity(256),
            context,
            tls,
            debug: options.debug,
        }
    }

    /// Replace the snapshotted client identity.
    ///
    /// Mainly for tests that need byte-identical traffic across runs.
    pub fn with_context(mut self, context: ClientContext) -> Self {
        self.context = context;
        self
    }

    /// Run the handshake to completion.
    ///
    /// Consumes the driver; on success the transport (possibly upgraded to
    /// TLS) is handed back along with any read-ahead. On failure the
    /// transport is dropped with the driver and the attempt is over - the
    /// driver never retries.
    pub async fn startup(
        mut self,
        database: Option<&str>,
        security: SecurityLevel,
        user: &str,
        password: &str,
        pg_options: Option<&str>,
    ) -> NpsResult<HandshakeResult<S>> {
        // Phase 1: version negotiation
        let version = self.negotiate_version().await?;
        let mut protocol = SubProtocol::new();

        // Phase 2: session setup
        if let Some(database) = database.filter(|d| !d.is_empty()) {
            self.select_database(database).await?;
        }
        protocol.advance()?;
        self = self.negotiate_tls(security).await?;
        self.send_metadata(version, protocol, user, pg_options).await?;

        // Phase 3: authentication
        self.authenticate(password).await?;

        // Phase 4: completion drain
        let backend_key = self.drain_completion().await?;

        let remaining = self.rx.take_remaining();
        Ok(HandshakeResult {
            stream: self.stream,
            remaining,
            version,
            protocol,
            backend_key,
        })
    }

    /// Propose CP versions until the server accepts one.
    async fn negotiate_version(&mut self) -> NpsResult<CpVersion> {
        let mut version = CpVersion::NEWEST;
        for _ in 0..MAX_NEGOTIATE_ATTEMPTS {
            self.send_frame(HandshakeFrame::int16(
                HandshakeOpcode::ClientBegin,
                version.wire_value(),
            ))
            .await?;
            match self.read_u8().await? {
                ACCEPT => {
                    if self.debug {
                        tracing::debug!(%version, "server accepted connection protocol");
                    }
                    return Ok(version);
                }
                DOWNGRADE => {
                    let digit = self.read_u8().await?;
                    let offered = CpVersion::from_counter_offer(digit)?;
                    // A counter-offer must strictly lower the version
                    if offered >= version {
                        return Err(HandshakeError::BadProtocol(digit));
                    }
                    version = offered;
                }
                REJECT => return Err(HandshakeError::BadAttributeValue),
                other => return Err(HandshakeError::BadProtocol(other)),
            }
        }
        Err(HandshakeError::BadProtocol(DOWNGRADE))
    }

    async fn select_database(&mut self, database: &str) -> NpsResult<()> {
        self.send_frame(HandshakeFrame::cstring(HandshakeOpcode::Db, database))
            .await?;
        self.expect_ack(HandshakeError::DatabaseRejected).await
    }

    /// Announce the security level and, when the server asks for it,
    /// upgrade the transport to TLS in-band.
    ///
    /// Any bytes still buffered at the upgrade point would belong to the
    /// cleartext layer and must not reach the TLS engine; the protocol
    /// guarantees the server sends nothing between `'S'` and the TLS
    /// handshake, and that is checked here rather than assumed.
    async fn negotiate_tls(mut self, security: SecurityLevel) -> NpsResult<Self> {
        self.send_frame(HandshakeFrame::int32(
            HandshakeOpcode::SslNegotiate,
            security.as_i32(),
        ))
        .await?;
        match self.read_u8().await? {
            ACCEPT => {
                if security.requires_tls() {
                    return Err(HandshakeError::TlsRequired);
                }
                Ok(self)
            }
            TLS_ACCEPT => {
                if security.forbids_tls() {
                    return Err(HandshakeError::TlsRefused);
                }
                self.send_frame(HandshakeFrame::int32(
                    HandshakeOpcode::SslConnect,
                    security.as_i32(),
                ))
                .await?;
                if !self.rx.is_empty() {
                    return Err(HandshakeError::TlsHandshakeFailed(format!(
                        "{} cleartext bytes buffered at TLS upgrade",
                        self.rx.buffered_len()
                    )));
                }

                let Self {
                    stream,
                    rx,
                    codec,
                    write_buf,
                    context,
                    tls,
                    debug,
                } = self;
                let options = tls.unwrap_or_default();
                let connector = options.connector()?;
                let server_name = options.server_name()?;
                let stream = stream.upgrade(&connector, server_name).await?;
                if debug {
                    tracing::debug!(server_name = %options.server_name, "transport upgraded to TLS");
                }
                Ok(Self {
                    stream,
                    rx,
                    codec,
                    write_buf,
                    context,
                    tls: Some(options),
                    debug,
                })
            }
            REJECT => Err(HandshakeError::TlsRejected),
            other => Err(HandshakeError::BadProtocol(other)),
        }
    }

    /// Stream the client metadata frames for the negotiated version.
    ///
    /// The two version families differ only in the four extended audit
    /// attributes, so the stream is built as one list with conditional
    /// entries rather than two parallel paths.
    async fn send_metadata(
        &mut self,
        version: CpVersion,
        protocol: SubProtocol,
        user: &str,
        pg_options: Option<&str>,
    ) -> NpsResult<()> {
        let mut frames = vec![HandshakeFrame::cstring(HandshakeOpcode::User, user)];
        if version.has_extended_metadata() {
            frames.push(HandshakeFrame::cstring(
                HandshakeOpcode::AppName,
                &self.context.app_name,
            ));
            frames.push(HandshakeFrame::cstring(
                HandshakeOpcode::ClientOs,
                &self.context.os,
            ));
            frames.push(HandshakeFrame::cstring(
                HandshakeOpcode::ClientHostName,
                &self.context.host_name,
            ));
            frames.push(HandshakeFrame::cstring(
                HandshakeOpcode::ClientOsUser,
                &self.context.os_user,
            ));
        }
        let (protocol1, protocol2) = protocol.pair();
        frames.push(HandshakeFrame::protocol(protocol1, protocol2));
        frames.push(HandshakeFrame::int32(
            HandshakeOpcode::RemotePid,
            self.context.pid as i32,
        ));
        if let Some(options) = pg_options.filter(|o| !o.is_empty()) {
            frames.push(HandshakeFrame::cstring(HandshakeOpcode::Options, options));
        }
        frames.push(HandshakeFrame::int16(
            HandshakeOpcode::ClientType,
            CLIENT_TYPE_VALUE,
        ));
        if version.supports_varlena64() {
            frames.push(HandshakeFrame::int16(HandshakeOpcode::Varlena64Enabled, 1));
        }

        for frame in frames {
            self.send_frame(frame).await?;
            self.expect_ack(HandshakeError::BadAttributeValue).await?;
        }
        // Terminal frame; the server never acknowledges it
        self.send_frame(HandshakeFrame::empty(HandshakeOpcode::ClientDone))
            .await
    }

    /// Answer the server's authentication challenge.
    async fn authenticate(&mut self, password: &str) -> NpsResult<()> {
        let mut message_type = self.read_u8().await?;
        if message_type == ACCEPT {
            // One stray acknowledgment is tolerated ahead of the request
            message_type = self.read_u8().await?;
        }
        if message_type != AUTH_REQUEST {
            return Err(HandshakeError::UnexpectedMessage(message_type));
        }
        let code = self.read_i32().await?;
        match AuthRequest::from_code(code)? {
            AuthRequest::Ok => Ok(()),
            AuthRequest::CleartextPassword => {
                self.send_frame(HandshakeFrame::credential(password.as_bytes()))
                    .await
            }
            AuthRequest::Md5Password => {
                let salt = self.read_salt().await?;
                let credential = auth::salted_md5(&salt, password);
                self.send_frame(HandshakeFrame::credential(credential.as_bytes()))
                    .await
            }
            AuthRequest::Sha256Password => {
                let salt = self.read_salt().await?;
                let credential = auth::salted_sha256(&salt, password);
                self.send_frame(HandshakeFrame::credential(credential.as_bytes()))
                    .await
            }
        }
    }

    /// Consume post-authentication messages until ready-for-query.
    ///
    /// Messages other than `'R'`, `'N'`, and `'E'` carry 8 leading filler
    /// bytes on this protocol; the discard is part of the wire format, not
    /// sloppiness to clean up.
    async fn drain_completion(&mut self) -> NpsResult<Option<BackendKeyData>> {
        let mut backend_key = None;
        loop {
            let message_type = self.read_u8().await?;
            match message_type {
                AUTH_REQUEST => {
                    let code = self.read_i32().await?;
                    if code != 0 {
                        tracing::debug!(code, "ignoring non-final authentication status");
                    }
                }
                BACKEND_KEY => {
                    self.discard_filler().await?;
                    let process_id = self.read_i32().await?;
                    let secret_key = self.read_i32().await?;
                    backend_key = Some(BackendKeyData {
                        process_id,
                        secret_key,
                    });
                }
                ACCEPT => {
                    // Notice; the body is not surfaced
                    self.discard_filler().await?;
                    let _body_len = self.read_i32().await?;
                }
                READY_FOR_QUERY => {
                    if self.debug {
                        tracing::debug!("handshake complete, ready for query");
                    }
                    return Ok(backend_key);
                }
                REJECT => {
                    let raw = self
                        .rx
                        .read_available(&mut self.stream, ERROR_TEXT_LIMIT)
                        .await?;
                    let end = raw
                        .iter()
                        .rposition(|&b| b != 0)
                        .map(|i| i + 1)
                        .unwrap_or(0);
                    let text = String::from_utf8_lossy(&raw[..end]).into_owned();
                    return Err(HandshakeError::ServerError(text));
                }
                other => {
                    tracing::debug!(
                        message_type = other,
                        "skipping unknown completion message"
                    );
                    self.discard_filler().await?;
                }
            }
        }
    }

    async fn send_frame(&mut self, frame: HandshakeFrame) -> NpsResult<()> {
        if self.debug {
            tracing::debug!(opcode = ?frame.opcode(), len = frame.wire_len(), "sending frame");
        }
        self.write_buf.clear();
        self.codec.encode(frame, &mut self.write_buf)?;
        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn expect_ack(&mut self, on_reject: HandshakeError) -> NpsResult<()> {
        match self.read_u8().await? {
            ACCEPT => Ok(()),
            REJECT => Err(on_reject),
            other => Err(HandshakeError::BadProtocol(other)),
        }
    }

    async fn read_u8(&mut self) -> NpsResult<u8> {
        self.rx.read_u8(&mut self.stream).await
    }

    async fn read_i32(&mut self) -> NpsResult<i32> {
        self.rx.read_i32(&mut self.stream).await
    }

    async fn read_salt(&mut self) -> NpsResult<[u8; SALT_LEN]> {
        let bytes = self.rx.read_exact(&mut self.stream, SALT_LEN).await?;
        Ok([bytes[0], bytes[1]])
    }

    async fn discard_filler(&mut self) -> NpsResult<()> {
        self.rx
            .read_exact(&mut self.stream, DRAIN_FILLER_LEN)
            .await?;
        Ok(())
    }
}

impl<S> std::fmt::Debug for HandshakeDriver<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeDriver")
            .field("stream", &self.stream)
            .field("buffered", &self.rx.buffered_len())
            .field("debug", &self.debug)
            .finish()
    }
}
