//! Little/big-endian integers, VarInt, double-SHA-256, hash160, and the
//! generic compact ("MPI-style") integer decoding of spec.md §4.1.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use std::io::{self, Read, Write};

/// A Bitcoin-style variable-length integer.
///
/// `< 0xFD` encodes as a single byte; `0xFD` + u16 LE; `0xFE` + u32 LE;
/// `0xFF` + u64 LE. Always little-endian regardless of payload width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarInt(pub u64);

/// Number of bytes `write_var_int` will emit for `value`.
pub fn var_int_len(value: u64) -> usize {
    match value {
        0..=0xFC => 1,
        0xFD..=0xFFFF => 3,
        0x1_0000..=0xFFFF_FFFF => 5,
        _ => 9,
    }
}

pub fn write_var_int<W: Write>(w: &mut W, value: u64) -> io::Result<()> {
    match value {
        0..=0xFC => w.write_all(&[value as u8]),
        0xFD..=0xFFFF => {
            w.write_all(&[0xFD])?;
            w.write_all(&(value as u16).to_le_bytes())
        }
        0x1_0000..=0xFFFF_FFFF => {
            w.write_all(&[0xFE])?;
            w.write_all(&(value as u32).to_le_bytes())
        }
        _ => {
            w.write_all(&[0xFF])?;
            w.write_all(&value.to_le_bytes())
        }
    }
}

pub fn read_var_int<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut prefix = [0u8; 1];
    r.read_exact(&mut prefix)?;
    Ok(match prefix[0] {
        0xFD => {
            let mut buf = [0u8; 2];
            r.read_exact(&mut buf)?;
            u16::from_le_bytes(buf) as u64
        }
        0xFE => {
            let mut buf = [0u8; 4];
            r.read_exact(&mut buf)?;
            u32::from_le_bytes(buf) as u64
        }
        0xFF => {
            let mut buf = [0u8; 8];
            r.read_exact(&mut buf)?;
            u64::from_le_bytes(buf)
        }
        n => n as u64,
    })
}

/// A length-prefixed (VarInt) UTF-8 string, as carried in `version`'s
/// sub-version field.
pub fn write_var_str<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    write_var_int(w, s.len() as u64)?;
    w.write_all(s.as_bytes())
}

pub fn read_var_str<R: Read>(r: &mut R) -> io::Result<String> {
    let len = read_var_int(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// `SHA-256(SHA-256(data))`.
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    second.into()
}

/// `RIPEMD-160(SHA-256(data))`, used to derive addresses from public keys.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let ripe = Ripemd160::digest(sha);
    ripe.into()
}

/// Generic compact-integer decode (spec.md §4.1): returns the decoded
/// magnitude and the (consensus-unused, but round-trip-required) sign bit.
pub fn decode_compact(c: u32) -> (u64, bool) {
    let s = (c >> 24) & 0xFF;
    let mantissa = (c & 0x007F_FFFF) as u64;
    let sign = c & 0x0080_0000 != 0;
    let value = if s >= 3 {
        mantissa << (8 * (s - 3))
    } else {
        mantissa >> (8 * (3 - s))
    };
    (value, sign)
}

/// Inverse of [`decode_compact`] for values that fit back into the
/// 1-byte-exponent/3-byte-mantissa compact form.
pub fn encode_compact(value: u64, sign: bool) -> u32 {
    let mut size = ((64 - value.leading_zeros()) as u32 + 7) / 8;
    let mut compact: u32 = if size <= 3 {
        (value << (8 * (3 - size))) as u32
    } else {
        (value >> (8 * (size - 3))) as u32
    };
    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }
    let sign_bit = if sign { 0x0080_0000 } else { 0 };
    compact | sign_bit | (size << 24)
}
