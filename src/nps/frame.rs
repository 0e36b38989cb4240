//! Handshake frame model and wire encoder.
//!
//! Every frame sent during version negotiation and session setup has the
//! layout `len(i32 BE) + opcode(i16 BE) + body`, where `len` counts itself
//! plus the opcode plus the body. The credential frame sent during
//! authentication reuses the same length prefix but carries no opcode.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::Encoder;

use super::error::HandshakeError;

/// Opcodes understood by the handshake, with their wire identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum HandshakeOpcode {
    /// Version proposal, int16 body
    ClientBegin = 1,
    /// Database selection, null-terminated UTF-8 body
    Db = 2,
    /// User name, null-terminated UTF-8 body
    User = 3,
    /// Backend options string, null-terminated UTF-8 body
    Options = 4,
    /// Client process id, int32 body
    RemotePid = 6,
    /// Client type announcement, int16 body
    ClientType = 8,
    /// Sub-protocol pair, int16 + int16 body
    Protocol = 9,
    /// TLS preference probe, int32 security level body
    SslNegotiate = 11,
    /// TLS upgrade commit, int32 security level body
    SslConnect = 12,
    /// Application name, null-terminated UTF-8 body
    AppName = 13,
    /// Client operating system, null-terminated UTF-8 body
    ClientOs = 14,
    /// Client host name, null-terminated UTF-8 body
    ClientHostName = 15,
    /// Client OS user, null-terminated UTF-8 body
    ClientOsUser = 16,
    /// 64-bit varlena announcement, int16 body
    Varlena64Enabled = 17,
    /// Terminates the metadata stream, empty body, never acknowledged
    ClientDone = 1000,
}

impl HandshakeOpcode {
    /// Wire identifier.
    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

/// A single client-to-server handshake frame.
///
/// Constructed through the typed helpers so body encodings stay in one
/// place; encoded onto the wire by [`FrameCodec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeFrame {
    opcode: Option<HandshakeOpcode>,
    body: Vec<u8>,
}

impl HandshakeFrame {
    /// Frame with an empty body.
    pub fn empty(opcode: HandshakeOpcode) -> Self {
        Self {
            opcode: Some(opcode),
            body: Vec::new(),
        }
    }

    /// Frame with a big-endian int16 body.
    pub fn int16(opcode: HandshakeOpcode, value: i16) -> Self {
        Self {
            opcode: Some(opcode),
            body: value.to_be_bytes().to_vec(),
        }
    }

    /// Frame with a big-endian int32 body.
    pub fn int32(opcode: HandshakeOpcode, value: i32) -> Self {
        Self {
            opcode: Some(opcode),
            body: value.to_be_bytes().to_vec(),
        }
    }

    /// Frame with a null-terminated UTF-8 body.
    pub fn cstring(opcode: HandshakeOpcode, value: &str) -> Self {
        let mut body = Vec::with_capacity(value.len() + 1);
        body.extend_from_slice(value.as_bytes());
        body.push(0);
        Self {
            opcode: Some(opcode),
            body,
        }
    }

    /// PROTOCOL frame carrying the sub-protocol pair.
    pub fn protocol(protocol1: i16, protocol2: i16) -> Self {
        let mut body = Vec::with_capacity(4);
        body.extend_from_slice(&protocol1.to_be_bytes());
        body.extend_from_slice(&protocol2.to_be_bytes());
        Self {
            opcode: Some(HandshakeOpcode::Protocol),
            body,
        }
    }

    /// Credential frame: a length-prefixed, null-terminated payload with no
    /// opcode, sent in response to an authentication challenge.
    pub fn credential(payload: &[u8]) -> Self {
        let mut body = Vec::with_capacity(payload.len() + 1);
        body.extend_from_slice(payload);
        body.push(0);
        Self { opcode: None, body }
    }

    /// Opcode, if the frame carries one.
    pub fn opcode(&self) -> Option<HandshakeOpcode> {
        self.opcode
    }

    /// Total on-wire length, including the length prefix itself.
    pub fn wire_len(&self) -> i32 {
        let opcode_len = if self.opcode.is_some() { 2 } else { 0 };
        (4 + opcode_len + self.body.len()) as i32
    }
}

/// Encoder for [`HandshakeFrame`], writing the length-prefixed layout into a
/// write buffer.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new frame codec.
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<HandshakeFrame> for FrameCodec {
    type Error = HandshakeError;

    fn encode(&mut self, frame: HandshakeFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(frame.wire_len() as usize);
        dst.put_i32(frame.wire_len());
        if let Some(opcode) = frame.opcode {
            dst.put_i16(opcode.as_i16());
        }
        dst.put_slice(&frame.body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(frame: HandshakeFrame) -> BytesMut {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(frame, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_opcode_identifiers() {
        assert_eq!(HandshakeOpcode::ClientBegin.as_i16(), 1);
        assert_eq!(HandshakeOpcode::Db.as_i16(), 2);
        assert_eq!(HandshakeOpcode::User.as_i16(), 3);
        assert_eq!(HandshakeOpcode::Options.as_i16(), 4);
        assert_eq!(HandshakeOpcode::RemotePid.as_i16(), 6);
        assert_eq!(HandshakeOpcode::ClientType.as_i16(), 8);
        assert_eq!(HandshakeOpcode::Protocol.as_i16(), 9);
        assert_eq!(HandshakeOpcode::SslNegotiate.as_i16(), 11);
        assert_eq!(HandshakeOpcode::SslConnect.as_i16(), 12);
        assert_eq!(HandshakeOpcode::AppName.as_i16(), 13);
        assert_eq!(HandshakeOpcode::ClientOs.as_i16(), 14);
        assert_eq!(HandshakeOpcode::ClientHostName.as_i16(), 15);
        assert_eq!(HandshakeOpcode::ClientOsUser.as_i16(), 16);
        assert_eq!(HandshakeOpcode::Varlena64Enabled.as_i16(), 17);
        assert_eq!(HandshakeOpcode::ClientDone.as_i16(), 1000);
    }

    #[test]
    fn test_client_begin_layout() {
        let buf = encode(HandshakeFrame::int16(HandshakeOpcode::ClientBegin, 6));
        assert_eq!(&buf[..], &[0, 0, 0, 8, 0, 1, 0, 6]);
    }

    #[test]
    fn test_cstring_layout() {
        let buf = encode(HandshakeFrame::cstring(HandshakeOpcode::Db, "mydb"));
        assert_eq!(
            &buf[..],
            &[0, 0, 0, 11, 0, 2, b'm', b'y', b'd', b'b', 0]
        );
    }

    #[test]
    fn test_protocol_pair_layout() {
        let buf = encode(HandshakeFrame::protocol(3, 5));
        assert_eq!(&buf[..], &[0, 0, 0, 10, 0, 9, 0, 3, 0, 5]);
    }

    #[test]
    fn test_int32_layout() {
        let buf = encode(HandshakeFrame::int32(HandshakeOpcode::SslNegotiate, 3));
        assert_eq!(&buf[..], &[0, 0, 0, 10, 0, 11, 0, 0, 0, 3]);
    }

    #[test]
    fn test_client_done_layout() {
        let buf = encode(HandshakeFrame::empty(HandshakeOpcode::ClientDone));
        // 1000 = 0x03E8
        assert_eq!(&buf[..], &[0, 0, 0, 6, 0x03, 0xE8]);
    }

    #[test]
    fn test_credential_has_no_opcode() {
        let frame = HandshakeFrame::credential(b"pw");
        assert_eq!(frame.opcode(), None);
        let buf = encode(frame);
        assert_eq!(&buf[..], &[0, 0, 0, 7, b'p', b'w', 0]);
    }

    #[test]
    fn test_length_prefix_counts_whole_frame() {
        let frames = vec![
            HandshakeFrame::empty(HandshakeOpcode::ClientDone),
            HandshakeFrame::int16(HandshakeOpcode::ClientType, 15),
            HandshakeFrame::int32(HandshakeOpcode::RemotePid, 4242),
            HandshakeFrame::cstring(HandshakeOpcode::User, "admin"),
            HandshakeFrame::protocol(3, 4),
            HandshakeFrame::credential(b"secret"),
        ];
        for frame in frames {
            let buf = encode(frame);
            let len = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
            assert_eq!(len as usize, buf.len());
        }
    }

    #[test]
    fn test_encoder_appends() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(HandshakeFrame::int16(HandshakeOpcode::ClientBegin, 6), &mut buf)
            .unwrap();
        codec
            .encode(HandshakeFrame::empty(HandshakeOpcode::ClientDone), &mut buf)
            .unwrap();
        assert_eq!(buf.len(), 8 + 6);
    }
}
