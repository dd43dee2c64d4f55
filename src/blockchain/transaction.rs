//! Transactions: parsing, serialization, txid, and the coinbase predicate
//! (spec.md §3, §4.3).

use std::io::{self, Read, Write};

use crate::codec::{read_var_int, write_var_int};
use crate::crypto::hash::Hash256;

/// A reference to a previous transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutPoint {
    pub txid: Hash256,
    pub index: u32,
}

impl OutPoint {
    /// The all-zero outpoint used by coinbase inputs (spec.md §3).
    pub const COINBASE: OutPoint = OutPoint {
        txid: Hash256::zero(),
        index: 0,
    };

    fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.txid.0)?;
        w.write_all(&self.index.to_le_bytes())
    }

    fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut txid = [0u8; 32];
        r.read_exact(&mut txid)?;
        let mut index_buf = [0u8; 4];
        r.read_exact(&mut index_buf)?;
        Ok(Self {
            txid: Hash256(txid),
            index: u32::from_le_bytes(index_buf),
        })
    }
}

/// A transaction input: the output it spends plus the unlocking script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub previous_output: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

impl TxIn {
    fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.previous_output.write(w)?;
        write_var_int(w, self.script_sig.len() as u64)?;
        w.write_all(&self.script_sig)?;
        w.write_all(&self.sequence.to_le_bytes())
    }

    fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let previous_output = OutPoint::read(r)?;
        let script_len = read_var_int(r)? as usize;
        let mut script_sig = vec![0u8; script_len];
        r.read_exact(&mut script_sig)?;
        let mut seq_buf = [0u8; 4];
        r.read_exact(&mut seq_buf)?;
        Ok(Self {
            previous_output,
            script_sig,
            sequence: u32::from_le_bytes(seq_buf),
        })
    }
}

/// A transaction output: a value and the locking script that must be
/// satisfied to spend it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub value: i64,
    pub script_pubkey: Vec<u8>,
}

impl TxOut {
    fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.value.to_le_bytes())?;
        write_var_int(w, self.script_pubkey.len() as u64)?;
        w.write_all(&self.script_pubkey)
    }

    fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut value_buf = [0u8; 8];
        r.read_exact(&mut value_buf)?;
        let script_len = read_var_int(r)? as usize;
        let mut script_pubkey = vec![0u8; script_len];
        r.read_exact(&mut script_pubkey)?;
        Ok(Self {
            value: i64::from_le_bytes(value_buf),
            script_pubkey,
        })
    }
}

/// An ordered list of inputs and outputs plus version and lock-time
/// (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    /// `txid` = double-SHA-256 of the serialization.
    pub fn txid(&self) -> Hash256 {
        let mut buf = Vec::new();
        self.write(&mut buf).expect("writing to a Vec cannot fail");
        Hash256::of(&buf)
    }

    /// A transaction is coinbase iff it has exactly one input whose
    /// previous-output reference is the all-zero outpoint.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output == OutPoint::COINBASE
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.version.to_le_bytes())?;
        write_var_int(w, self.inputs.len() as u64)?;
        for input in &self.inputs {
            input.write(w)?;
        }
        write_var_int(w, self.outputs.len() as u64)?;
        for output in &self.outputs {
            output.write(w)?;
        }
        w.write_all(&self.lock_time.to_le_bytes())
    }

    pub fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut version_buf = [0u8; 4];
        r.read_exact(&mut version_buf)?;
        let input_count = read_var_int(r)? as usize;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            inputs.push(TxIn::read(r)?);
        }
        let output_count = read_var_int(r)? as usize;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            outputs.push(TxOut::read(r)?);
        }
        let mut lock_time_buf = [0u8; 4];
        r.read_exact(&mut lock_time_buf)?;
        Ok(Self {
            version: u32::from_le_bytes(version_buf),
            inputs,
            outputs,
            lock_time: u32::from_le_bytes(lock_time_buf),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write(&mut buf).expect("writing to a Vec cannot fail");
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        let mut cursor = bytes;
        Self::read(&mut cursor)
    }
}
