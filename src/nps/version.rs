//! Connection-protocol version definitions.

use std::fmt;

use super::error::HandshakeError;

/// NPS connection-protocol (CP) versions.
///
/// The version is negotiated at the very start of the handshake: the client
/// proposes the newest version it knows and the server either accepts or
/// counter-offers a lower one. The negotiated version controls which
/// metadata opcodes the server expects during session setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum CpVersion {
    /// CP2 - oldest version still accepted by this client
    V2 = 2,
    /// CP3
    V3 = 3,
    /// CP4 - first version with extended client audit attributes
    V4 = 4,
    /// CP5 - first version with 64-bit varlena support
    V5 = 5,
    /// CP6 - newest version, extended attributes plus 64-bit varlena
    V6 = 6,
}

impl CpVersion {
    /// The version proposed first in every handshake.
    pub const NEWEST: CpVersion = CpVersion::V6;

    /// Create a version from its raw number.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            2 => Some(CpVersion::V2),
            3 => Some(CpVersion::V3),
            4 => Some(CpVersion::V4),
            5 => Some(CpVersion::V5),
            6 => Some(CpVersion::V6),
            _ => None,
        }
    }

    /// Parse a server counter-offer, an ASCII digit `'2'..'5'`.
    ///
    /// The server never counter-offers 6 (it would have accepted instead),
    /// so digits outside `'2'..'5'` are an unsupported-version error.
    pub fn from_counter_offer(digit: u8) -> Result<Self, HandshakeError> {
        match digit {
            b'2' => Ok(CpVersion::V2),
            b'3' => Ok(CpVersion::V3),
            b'4' => Ok(CpVersion::V4),
            b'5' => Ok(CpVersion::V5),
            other => Err(HandshakeError::UnsupportedVersion(other)),
        }
    }

    /// Raw version number.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Version number as sent in the CLIENT_BEGIN body.
    pub fn wire_value(self) -> i16 {
        self as u8 as i16
    }

    /// Whether this version streams the extended audit attributes
    /// (APPNAME, CLIENT_OS, CLIENT_HOST_NAME, CLIENT_OS_USER).
    pub fn has_extended_metadata(self) -> bool {
        matches!(self, CpVersion::V4 | CpVersion::V6)
    }

    /// Whether this version announces 64-bit varlena support.
    pub fn supports_varlena64(self) -> bool {
        matches!(self, CpVersion::V5 | CpVersion::V6)
    }
}

impl fmt::Display for CpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CP{}", self.as_u8())
    }
}

/// The sub-protocol pair announced under the PROTOCOL opcode.
///
/// `protocol1` is a major version fixed at 3. `protocol2` is a minor version
/// walked 5 -> 4 -> 3 by [`SubProtocol::advance`]; a fresh pair starts at a
/// sentinel 0 meaning "not yet advanced". Walking past 3 is a protocol
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubProtocol {
    protocol1: i16,
    protocol2: i16,
}

impl SubProtocol {
    /// Major version announced to the server.
    pub const MAJOR: i16 = 3;

    /// A fresh, not-yet-advanced pair.
    pub fn new() -> Self {
        Self {
            protocol1: Self::MAJOR,
            protocol2: 0,
        }
    }

    /// Step the fallback walk: 0 -> 5 -> 4 -> 3 -> exhausted.
    pub fn advance(&mut self) -> Result<(), HandshakeError> {
        self.protocol2 = match self.protocol2 {
            0 => 5,
            5 => 4,
            4 => 3,
            _ => return Err(HandshakeError::ProtocolExhausted),
        };
        Ok(())
    }

    /// Major component (always 3).
    pub fn protocol1(self) -> i16 {
        self.protocol1
    }

    /// Minor component: 0 until advanced, then 5, 4, or 3.
    pub fn protocol2(self) -> i16 {
        self.protocol2
    }

    /// The `(protocol1, protocol2)` wire pair.
    pub fn pair(self) -> (i16, i16) {
        (self.protocol1, self.protocol2)
    }
}

impl Default for SubProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.protocol1, self.protocol2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_values() {
        assert_eq!(CpVersion::V2 as u8, 2);
        assert_eq!(CpVersion::V3 as u8, 3);
        assert_eq!(CpVersion::V4 as u8, 4);
        assert_eq!(CpVersion::V5 as u8, 5);
        assert_eq!(CpVersion::V6 as u8, 6);
        assert_eq!(CpVersion::NEWEST, CpVersion::V6);
    }

    #[test]
    fn test_version_from_u8() {
        assert_eq!(CpVersion::from_u8(2), Some(CpVersion::V2));
        assert_eq!(CpVersion::from_u8(6), Some(CpVersion::V6));
        assert_eq!(CpVersion::from_u8(1), None);
        assert_eq!(CpVersion::from_u8(7), None);
    }

    #[test]
    fn test_counter_offer_digits() {
        assert_eq!(
            CpVersion::from_counter_offer(b'2').unwrap(),
            CpVersion::V2
        );
        assert_eq!(
            CpVersion::from_counter_offer(b'5').unwrap(),
            CpVersion::V5
        );
    }

    #[test]
    fn test_counter_offer_out_of_range() {
        let err = CpVersion::from_counter_offer(b'1').unwrap_err();
        assert!(matches!(err, HandshakeError::UnsupportedVersion(b'1')));

        let err = CpVersion::from_counter_offer(b'6').unwrap_err();
        assert!(matches!(err, HandshakeError::UnsupportedVersion(b'6')));
    }

    #[test]
    fn test_wire_value() {
        assert_eq!(CpVersion::V6.wire_value(), 6i16);
        assert_eq!(CpVersion::V2.wire_value(), 2i16);
    }

    #[test]
    fn test_extended_metadata() {
        assert!(!CpVersion::V2.has_extended_metadata());
        assert!(!CpVersion::V3.has_extended_metadata());
        assert!(CpVersion::V4.has_extended_metadata());
        assert!(!CpVersion::V5.has_extended_metadata());
        assert!(CpVersion::V6.has_extended_metadata());
    }

    #[test]
    fn test_varlena64() {
        assert!(!CpVersion::V2.supports_varlena64());
        assert!(!CpVersion::V4.supports_varlena64());
        assert!(CpVersion::V5.supports_varlena64());
        assert!(CpVersion::V6.supports_varlena64());
    }

    #[test]
    fn test_version_ordering() {
        assert!(CpVersion::V6 > CpVersion::V5);
        assert!(CpVersion::V3 > CpVersion::V2);
    }

    #[test]
    fn test_version_display() {
        assert_eq!(CpVersion::V6.to_string(), "CP6");
        assert_eq!(CpVersion::V2.to_string(), "CP2");
    }

    #[test]
    fn test_sub_protocol_walk() {
        let mut proto = SubProtocol::new();
        assert_eq!(proto.pair(), (3, 0));

        proto.advance().unwrap();
        assert_eq!(proto.pair(), (3, 5));

        proto.advance().unwrap();
        assert_eq!(proto.pair(), (3, 4));

        proto.advance().unwrap();
        assert_eq!(proto.pair(), (3, 3));

        let err = proto.advance().unwrap_err();
        assert!(matches!(err, HandshakeError::ProtocolExhausted));
        // The pair is left at the floor after a failed advance
        assert_eq!(proto.pair(), (3, 3));
    }

    #[test]
    fn test_sub_protocol_display() {
        let mut proto = SubProtocol::new();
        proto.advance().unwrap();
        assert_eq!(proto.to_string(), "3.5");
    }
}
