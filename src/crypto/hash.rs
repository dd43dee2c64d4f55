//! The 32-byte hash newtype shared by block hashes and txids.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte double-SHA-256 digest.
///
/// Wire order is little-endian; [`fmt::Display`] renders the conventional
/// "big-endian" hex form used by block explorers, i.e. the hex of the
/// *reversed* byte array. `display(h) == hex(reverse(bytes(h)))`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Double-SHA-256 of `data`.
    pub fn of(data: &[u8]) -> Self {
        Self(crate::codec::double_sha256(data))
    }

    /// Interpret the wire (little-endian) bytes as an unsigned 256-bit
    /// integer for proof-of-work comparison against a big-endian target.
    pub fn as_be_integer_bytes(&self) -> [u8; 32] {
        let mut out = self.0;
        out.reverse();
        out
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        write!(f, "{}", hex::encode(reversed))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({self})")
    }
}

impl std::str::FromStr for Hash256 {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        bytes.reverse();
        Ok(Self(bytes))
    }
}
