//! Authentication challenges and salted credential computation.
//!
//! The server selects the method by sending an `'R'` message with a 32-bit
//! code. The salted methods prepend a two-byte server salt to the UTF-8
//! password, hash, and send the digest base64-encoded with the trailing
//! `'='` padding stripped.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use md5::Md5;
use sha2::{Digest, Sha256};

use super::error::HandshakeError;

/// Number of salt bytes prepended to the password by the salted methods.
pub const SALT_LEN: usize = 2;

/// Authentication methods the server may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRequest {
    /// Code 0 - already authenticated, no credential exchange
    Ok,
    /// Code 3 - password sent in the clear
    CleartextPassword,
    /// Code 5 - MD5 over salt + password
    Md5Password,
    /// Code 6 - SHA-256 over salt + password
    Sha256Password,
}

impl AuthRequest {
    /// Map a wire code to a method; codes outside {0, 3, 5, 6} are
    /// unsupported.
    pub fn from_code(code: i32) -> Result<Self, HandshakeError> {
        match code {
            0 => Ok(AuthRequest::Ok),
            3 => Ok(AuthRequest::CleartextPassword),
            5 => Ok(AuthRequest::Md5Password),
            6 => Ok(AuthRequest::Sha256Password),
            other => Err(HandshakeError::UnsupportedAuthMethod(other)),
        }
    }
}

/// MD5 credential: base64(md5(salt + password)) without padding.
pub fn salted_md5(salt: &[u8; SALT_LEN], password: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    STANDARD_NO_PAD.encode(hasher.finalize())
}

/// SHA-256 credential: base64(sha256(salt + password)) without padding.
pub fn salted_sha256(salt: &[u8; SALT_LEN], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    STANDARD_NO_PAD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;

    #[test]
    fn test_from_code() {
        assert_eq!(AuthRequest::from_code(0).unwrap(), AuthRequest::Ok);
        assert_eq!(
            AuthRequest::from_code(3).unwrap(),
            AuthRequest::CleartextPassword
        );
        assert_eq!(
            AuthRequest::from_code(5).unwrap(),
            AuthRequest::Md5Password
        );
        assert_eq!(
            AuthRequest::from_code(6).unwrap(),
            AuthRequest::Sha256Password
        );
    }

    #[test]
    fn test_from_code_unsupported() {
        for code in [1, 2, 4, 7, 9, -1] {
            let err = AuthRequest::from_code(code).unwrap_err();
            assert!(matches!(
                err,
                HandshakeError::UnsupportedAuthMethod(c) if c == code
            ));
        }
    }

    #[test]
    fn test_salted_md5_known_vector() {
        // md5(0xAB 0xCD + "secret")
        let credential = salted_md5(&[0xAB, 0xCD], "secret");
        assert_eq!(credential, "7ewRqfGM3Q1lvtaWUmB86g");
    }

    #[test]
    fn test_salted_sha256_known_vector() {
        // sha256(0xAB 0xCD + "secret")
        let credential = salted_sha256(&[0xAB, 0xCD], "secret");
        assert_eq!(credential, "9vH6nE6JUMs7LDyoWCHBTqG0yVsg3IY2ARZXaPZplDQ");
    }

    #[test]
    fn test_no_trailing_padding() {
        let md5 = salted_md5(&[0x00, 0xFF], "pw");
        let sha = salted_sha256(&[0x00, 0xFF], "pw");
        assert!(!md5.ends_with('='));
        assert!(!sha.ends_with('='));
    }

    #[test]
    fn test_credential_decodes_to_digest() {
        // Re-adding the stripped padding must round-trip to the raw digest.
        let credential = salted_md5(&[0xAB, 0xCD], "secret");
        let mut padded = credential.clone();
        while padded.len() % 4 != 0 {
            padded.push('=');
        }
        let digest = STANDARD.decode(&padded).unwrap();
        assert_eq!(digest.len(), 16);

        let credential = salted_sha256(&[0xAB, 0xCD], "secret");
        let mut padded = credential.clone();
        while padded.len() % 4 != 0 {
            padded.push('=');
        }
        let digest = STANDARD.decode(&padded).unwrap();
        assert_eq!(digest.len(), 32);
    }

    #[test]
    fn test_salt_changes_credential() {
        let a = salted_sha256(&[0x01, 0x02], "secret");
        let b = salted_sha256(&[0x02, 0x01], "secret");
        assert_ne!(a, b);
    }
}
