//! Message framing (spec.md §4.2): magic-byte resync, the fixed
//! header, checksum validation, and command dispatch to
//! [`crate::network::protocol::Message`].

use std::io::{self, Read, Write};

use crate::codec::double_sha256;
use crate::error::FrameError;
use crate::network::protocol::{Message, MAX_PAYLOAD_BYTES};

const COMMAND_LEN: usize = 12;

/// Scans `r` byte-by-byte until the 4-byte `magic` sequence (sent
/// big-endian on the wire) is observed, silently discarding everything
/// before it (spec.md §4.2 step 1, "Satoshi interop").
fn resync<R: Read>(r: &mut R, magic: u32) -> Result<(), FrameError> {
    let target = magic.to_be_bytes();
    let mut window = [0u8; 4];
    let mut filled = 0usize;
    loop {
        let mut byte = [0u8; 1];
        match r.read_exact(&mut byte) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(FrameError::Disconnected),
            Err(e) => return Err(FrameError::Io(e)),
        }
        window = [window[1], window[2], window[3], byte[0]];
        filled = (filled + 1).min(4);
        if filled == 4 && window == target {
            return Ok(());
        }
    }
}

/// Parses the 12-byte command field, trimming the NUL terminator and
/// rejecting anything that isn't printable ASCII padded with NULs.
fn command_from_bytes(buf: &[u8; COMMAND_LEN]) -> Result<String, FrameError> {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(COMMAND_LEN);
    if !buf[..end].iter().all(|&b| b.is_ascii_graphic()) {
        return Err(FrameError::BadCommand);
    }
    if end < COMMAND_LEN && !buf[end..].iter().all(|&b| b == 0) {
        return Err(FrameError::BadCommand);
    }
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

/// Writes the full NUL-padded 12-byte command field (spec.md §9: the
/// source copies only the first character into every byte; this writes
/// the complete command string as the spec requires).
fn command_to_bytes(command: &str) -> Result<[u8; COMMAND_LEN], FrameError> {
    if command.len() > COMMAND_LEN {
        return Err(FrameError::BadCommand);
    }
    let mut buf = [0u8; COMMAND_LEN];
    buf[..command.len()].copy_from_slice(command.as_bytes());
    Ok(buf)
}

/// Reads one framed message from `r`.
///
/// `checksum_active` should be `false` only during the pre-handshake phase
/// of a connection speaking protocol version < 209; `protocol_version` is
/// the already-negotiated version used to interpret version-dependent
/// payload shapes (currently just `addr` timestamps).
pub fn read_message<R: Read>(
    r: &mut R,
    magic: u32,
    checksum_active: bool,
    protocol_version: i32,
) -> Result<Message, FrameError> {
    resync(r, magic)?;

    let mut command_buf = [0u8; COMMAND_LEN];
    r.read_exact(&mut command_buf)?;
    let command = command_from_bytes(&command_buf)?;

    let mut length_buf = [0u8; 4];
    r.read_exact(&mut length_buf)?;
    let length = u32::from_le_bytes(length_buf);
    if length > MAX_PAYLOAD_BYTES {
        return Err(FrameError::PayloadTooLarge(length));
    }

    let checksum = if checksum_active {
        let mut buf = [0u8; 4];
        r.read_exact(&mut buf)?;
        Some(buf)
    } else {
        None
    };

    // Read exactly `length` bytes (spec.md §9: the source's read loop stops
    // one byte short; this reads the full declared length).
    let mut payload = vec![0u8; length as usize];
    r.read_exact(&mut payload)?;

    if let Some(expected) = checksum {
        let actual = &double_sha256(&payload)[..4];
        if actual != expected {
            return Err(FrameError::ChecksumMismatch { command });
        }
    }

    Message::read_payload(&command, &payload, protocol_version)
}

/// Writes one framed message to `w`.
pub fn write_message<W: Write>(
    w: &mut W,
    magic: u32,
    message: &Message,
    checksum_active: bool,
    protocol_version: i32,
) -> Result<(), FrameError> {
    let mut payload = Vec::new();
    message.write_payload(&mut payload, protocol_version)?;
    if payload.len() as u64 > MAX_PAYLOAD_BYTES as u64 {
        return Err(FrameError::PayloadTooLarge(payload.len() as u32));
    }

    w.write_all(&magic.to_be_bytes())?;
    w.write_all(&command_to_bytes(message.command())?)?;
    w.write_all(&(payload.len() as u32).to_le_bytes())?;
    if checksum_active {
        let checksum = double_sha256(&payload);
        w.write_all(&checksum[..4])?;
    }
    w.write_all(&payload)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::protocol::Message;

    const TEST_MAGIC: u32 = 0xFABF_B5DA;

    #[test]
    fn write_then_read_round_trips_verack() {
        let mut buf = Vec::new();
        write_message(&mut buf, TEST_MAGIC, &Message::Verack, true, 70015).unwrap();
        let mut cursor = &buf[..];
        let parsed = read_message(&mut cursor, TEST_MAGIC, true, 70015).unwrap();
        assert_eq!(parsed, Message::Verack);
    }

    #[test]
    fn leading_garbage_before_magic_is_discarded() {
        let mut buf = vec![0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01];
        write_message(&mut buf, TEST_MAGIC, &Message::Verack, true, 70015).unwrap();
        let mut cursor = &buf[..];
        let parsed = read_message(&mut cursor, TEST_MAGIC, true, 70015).unwrap();
        assert_eq!(parsed, Message::Verack);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut buf = Vec::new();
        write_message(&mut buf, TEST_MAGIC, &Message::Verack, true, 70015).unwrap();
        // Corrupt the checksum field (right after the 4-byte length that
        // follows magic + 12-byte command).
        let checksum_offset = 4 + COMMAND_LEN + 4;
        buf[checksum_offset] ^= 0xFF;
        let mut cursor = &buf[..];
        assert!(matches!(
            read_message(&mut cursor, TEST_MAGIC, true, 70015),
            Err(FrameError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn command_field_is_written_fully_nul_padded() {
        let mut buf = Vec::new();
        write_message(&mut buf, TEST_MAGIC, &Message::Verack, true, 70015).unwrap();
        let command_field = &buf[4..4 + COMMAND_LEN];
        assert_eq!(&command_field[..6], b"verack");
        assert!(command_field[6..].iter().all(|&b| b == 0));
    }

    #[test]
    fn oversize_payload_is_rejected_before_allocating() {
        let mut header = Vec::new();
        header.extend_from_slice(&TEST_MAGIC.to_be_bytes());
        header.extend_from_slice(b"block\0\0\0\0\0\0\0");
        header.extend_from_slice(&(MAX_PAYLOAD_BYTES + 1).to_le_bytes());
        let mut cursor = &header[..];
        assert!(matches!(
            read_message(&mut cursor, TEST_MAGIC, false, 70015),
            Err(FrameError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn disconnect_before_magic_is_reported() {
        let empty: &[u8] = &[];
        let mut cursor = empty;
        assert!(matches!(
            read_message(&mut cursor, TEST_MAGIC, true, 70015),
            Err(FrameError::Disconnected)
        ));
    }
}
