//! Typed peer-protocol messages (spec.md §4.3): `version`, `verack`, `addr`,
//! `inv`/`getdata`, `getblocks`, `block`, `tx`, and an opaque `unknown`
//! fallback for unrecognized commands.

use std::io::{self, Read, Write};

use crate::blockchain::{Block, Transaction};
use crate::codec::{read_var_int, read_var_str, write_var_int, write_var_str};
use crate::crypto::hash::Hash256;
use crate::error::FrameError;

/// Above this many protocol versions, `addr` records carry a leading u32
/// timestamp (spec.md §4.3).
pub const ADDR_TIME_VERSION: i32 = 31402;

/// `inv`/`getdata` entries are capped at this many per message.
pub const MAX_INVENTORY_ITEMS: usize = 50_000;

/// Max payload size accepted by the framing layer (spec.md §4.2).
pub const MAX_PAYLOAD_BYTES: u32 = 32 * 1024 * 1024;

/// A peer network address: services bitfield, an IPv6-mapped IP (IPv4
/// addresses are carried `::ffff:a.b.c.d`), and a big-endian port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkAddress {
    pub services: u64,
    pub ip: [u8; 16],
    pub port: u16,
}

impl NetworkAddress {
    pub fn from_ipv4(services: u64, ipv4: [u8; 4], port: u16) -> Self {
        let mut ip = [0u8; 16];
        ip[10] = 0xff;
        ip[11] = 0xff;
        ip[12..16].copy_from_slice(&ipv4);
        Self { services, ip, port }
    }

    /// The IPv4 address this record carries, if it is an IPv4-mapped
    /// address (`::ffff:a.b.c.d`).
    pub fn as_ipv4(&self) -> Option<[u8; 4]> {
        if self.ip[..10] == [0u8; 10] && self.ip[10] == 0xff && self.ip[11] == 0xff {
            let mut ipv4 = [0u8; 4];
            ipv4.copy_from_slice(&self.ip[12..16]);
            Some(ipv4)
        } else {
            None
        }
    }

    /// Writes the 26-byte body (services + ip + port); an optional 4-byte
    /// timestamp prefix is written by the caller when `with_time` applies.
    fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.services.to_le_bytes())?;
        w.write_all(&self.ip)?;
        w.write_all(&self.port.to_be_bytes())
    }

    fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut services_buf = [0u8; 8];
        r.read_exact(&mut services_buf)?;
        let mut ip = [0u8; 16];
        r.read_exact(&mut ip)?;
        let mut port_buf = [0u8; 2];
        r.read_exact(&mut port_buf)?;
        Ok(Self {
            services: u64::from_le_bytes(services_buf),
            ip,
            port: u16::from_be_bytes(port_buf),
        })
    }

    /// Writes the full record, with a leading u32 LE timestamp iff
    /// `with_time` is set (spec.md §4.3: addr records carry a timestamp
    /// when the negotiated protocol version is above 31402).
    pub fn write_timed<W: Write>(&self, w: &mut W, time: Option<u32>, with_time: bool) -> io::Result<()> {
        if with_time {
            w.write_all(&time.unwrap_or(0).to_le_bytes())?;
        }
        self.write(w)
    }

    pub fn read_timed<R: Read>(r: &mut R, with_time: bool) -> io::Result<(Option<u32>, Self)> {
        let time = if with_time {
            let mut buf = [0u8; 4];
            r.read_exact(&mut buf)?;
            Some(u32::from_le_bytes(buf))
        } else {
            None
        };
        Ok((time, Self::read(r)?))
    }
}

/// The `version` handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMessage {
    pub version: i32,
    pub services: u64,
    pub timestamp: i64,
    pub addr_recv: NetworkAddress,
    pub addr_from: NetworkAddress,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: i32,
}

impl VersionMessage {
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.version.to_le_bytes())?;
        w.write_all(&self.services.to_le_bytes())?;
        w.write_all(&self.timestamp.to_le_bytes())?;
        // recv/from addresses never carry a timestamp prefix, regardless of
        // negotiated version (spec.md §4.3).
        self.addr_recv.write(w)?;
        self.addr_from.write(w)?;
        w.write_all(&self.nonce.to_le_bytes())?;
        write_var_str(w, &self.user_agent)?;
        w.write_all(&self.start_height.to_le_bytes())
    }

    pub fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut version_buf = [0u8; 4];
        r.read_exact(&mut version_buf)?;
        let mut services_buf = [0u8; 8];
        r.read_exact(&mut services_buf)?;
        let mut timestamp_buf = [0u8; 8];
        r.read_exact(&mut timestamp_buf)?;
        let addr_recv = NetworkAddress::read(r)?;
        let addr_from = NetworkAddress::read(r)?;
        let mut nonce_buf = [0u8; 8];
        r.read_exact(&mut nonce_buf)?;
        let user_agent = read_var_str(r)?;
        let mut start_height_buf = [0u8; 4];
        r.read_exact(&mut start_height_buf)?;
        Ok(Self {
            version: i32::from_le_bytes(version_buf),
            services: u64::from_le_bytes(services_buf),
            timestamp: i64::from_le_bytes(timestamp_buf),
            addr_recv,
            addr_from,
            nonce: u64::from_le_bytes(nonce_buf),
            user_agent,
            start_height: i32::from_le_bytes(start_height_buf),
        })
    }
}

/// The kind carried by an `inv`/`getdata` entry (spec.md §4.3). Values
/// outside the three defined kinds are tolerated, not rejected (spec.md
/// §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryKind {
    Error,
    Tx,
    Block,
    Unknown(u32),
}

impl InventoryKind {
    fn to_u32(self) -> u32 {
        match self {
            InventoryKind::Error => 0,
            InventoryKind::Tx => 1,
            InventoryKind::Block => 2,
            InventoryKind::Unknown(n) => n,
        }
    }

    fn from_u32(n: u32) -> Self {
        match n {
            0 => InventoryKind::Error,
            1 => InventoryKind::Tx,
            2 => InventoryKind::Block,
            other => InventoryKind::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventoryVector {
    pub kind: InventoryKind,
    pub hash: Hash256,
}

impl InventoryVector {
    fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.kind.to_u32().to_le_bytes())?;
        w.write_all(&self.hash.0)
    }

    fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut kind_buf = [0u8; 4];
        r.read_exact(&mut kind_buf)?;
        let mut hash = [0u8; 32];
        r.read_exact(&mut hash)?;
        Ok(Self {
            kind: InventoryKind::from_u32(u32::from_le_bytes(kind_buf)),
            hash: Hash256(hash),
        })
    }
}

/// Writes a VarInt-counted list of inventory entries, used by both `inv`
/// and `getdata`.
pub fn write_inventory<W: Write>(w: &mut W, items: &[InventoryVector]) -> io::Result<()> {
    write_var_int(w, items.len() as u64)?;
    for item in items {
        item.write(w)?;
    }
    Ok(())
}

/// Reads a VarInt-counted list of inventory entries, rejecting more than
/// [`MAX_INVENTORY_ITEMS`] (spec.md §4.3).
pub fn read_inventory<R: Read>(r: &mut R) -> Result<Vec<InventoryVector>, FrameError> {
    let count = read_var_int(r)? as usize;
    if count > MAX_INVENTORY_ITEMS {
        return Err(FrameError::TooManyInventoryItems(count));
    }
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(InventoryVector::read(r)?);
    }
    Ok(items)
}

/// The `getblocks` message: a block locator plus a stop hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBlocksMessage {
    pub version: u32,
    pub locator_hashes: Vec<Hash256>,
    pub hash_stop: Hash256,
}

impl GetBlocksMessage {
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.version.to_le_bytes())?;
        write_var_int(w, self.locator_hashes.len() as u64)?;
        for hash in &self.locator_hashes {
            w.write_all(&hash.0)?;
        }
        w.write_all(&self.hash_stop.0)
    }

    pub fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut version_buf = [0u8; 4];
        r.read_exact(&mut version_buf)?;
        let count = read_var_int(r)? as usize;
        let mut locator_hashes = Vec::with_capacity(count);
        for _ in 0..count {
            let mut hash = [0u8; 32];
            r.read_exact(&mut hash)?;
            locator_hashes.push(Hash256(hash));
        }
        let mut stop = [0u8; 32];
        r.read_exact(&mut stop)?;
        Ok(Self {
            version: u32::from_le_bytes(version_buf),
            locator_hashes,
            hash_stop: Hash256(stop),
        })
    }
}

/// A fully parsed peer-protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Version(VersionMessage),
    Verack,
    Addr(Vec<NetworkAddress>),
    Inv(Vec<InventoryVector>),
    GetData(Vec<InventoryVector>),
    GetBlocks(GetBlocksMessage),
    Block(Block),
    Tx(Transaction),
    /// An unrecognized command, carried opaquely rather than rejected
    /// (spec.md §4.2 step 4).
    Unknown { command: String, payload: Vec<u8> },
}

impl Message {
    pub fn command(&self) -> &str {
        match self {
            Message::Version(_) => "version",
            Message::Verack => "verack",
            Message::Addr(_) => "addr",
            Message::Inv(_) => "inv",
            Message::GetData(_) => "getdata",
            Message::GetBlocks(_) => "getblocks",
            Message::Block(_) => "block",
            Message::Tx(_) => "tx",
            Message::Unknown { command, .. } => command,
        }
    }

    /// Serializes the payload body (everything after the framing header).
    /// `protocol_version` governs whether `addr` entries carry a timestamp.
    pub fn write_payload(&self, w: &mut impl Write, protocol_version: i32) -> io::Result<()> {
        let with_time = protocol_version > ADDR_TIME_VERSION;
        match self {
            Message::Version(v) => v.write(w),
            Message::Verack => Ok(()),
            Message::Addr(addrs) => {
                write_var_int(w, addrs.len() as u64)?;
                for addr in addrs {
                    addr.write_timed(w, None, with_time)?;
                }
                Ok(())
            }
            Message::Inv(items) => write_inventory(w, items),
            Message::GetData(items) => write_inventory(w, items),
            Message::GetBlocks(m) => m.write(w),
            Message::Block(b) => b.write(w),
            Message::Tx(tx) => tx.write(w),
            Message::Unknown { payload, .. } => w.write_all(payload),
        }
    }

    /// Parses `payload` (the exact bytes announced by the framing header)
    /// according to `command`.
    pub fn read_payload(command: &str, payload: &[u8], protocol_version: i32) -> Result<Self, FrameError> {
        let with_time = protocol_version > ADDR_TIME_VERSION;
        let mut cursor = payload;
        Ok(match command {
            "version" => Message::Version(VersionMessage::read(&mut cursor)?),
            "verack" => Message::Verack,
            "addr" => {
                let count = read_var_int(&mut cursor)? as usize;
                let mut addrs = Vec::with_capacity(count);
                for _ in 0..count {
                    let (_, addr) = NetworkAddress::read_timed(&mut cursor, with_time)?;
                    addrs.push(addr);
                }
                Message::Addr(addrs)
            }
            "inv" => Message::Inv(read_inventory(&mut cursor)?),
            "getdata" => Message::GetData(read_inventory(&mut cursor)?),
            "getblocks" => Message::GetBlocks(GetBlocksMessage::read(&mut cursor)?),
            "block" => Message::Block(Block::read(&mut cursor)?),
            "tx" => Message::Tx(Transaction::read(&mut cursor)?),
            other => Message::Unknown {
                command: other.to_string(),
                payload: payload.to_vec(),
            },
        })
    }
}
