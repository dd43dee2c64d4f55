//! Base58Check pay-to-address encoding (spec.md §3, §4.4).

use std::fmt;

/// 20 bytes (`hash160` of a public key) plus the network version byte it was
/// encoded under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub version: u8,
    pub hash: [u8; 20],
}

/// Errors produced parsing a Base58Check-encoded address string.
#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("not valid base58 or checksum failed")]
    InvalidEncoding,

    #[error("decoded payload is {0} bytes, expected 20")]
    WrongLength(usize),
}

impl Address {
    pub fn new(version: u8, hash: [u8; 20]) -> Self {
        Self { version, hash }
    }

    /// `Base58Check(version || hash)`. The trailing 4 checksum bytes are
    /// `first4(doubleDigest(version || hash))`.
    pub fn to_base58check(&self) -> String {
        bs58::encode(self.hash)
            .with_check_version(self.version)
            .into_string()
    }

    /// Parses a Base58Check string, rejecting payloads whose checksum does
    /// not match `first4(doubleDigest(prefix))`.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let decoded = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|_| AddressError::InvalidEncoding)?;
        if decoded.len() != 21 {
            return Err(AddressError::WrongLength(decoded.len().saturating_sub(1)));
        }
        let version = decoded[0];
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&decoded[1..21]);
        Ok(Self { version, hash })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58check())
    }
}
