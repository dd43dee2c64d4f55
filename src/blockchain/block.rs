//! The 80-byte block header, the optional attached transaction list, and
//! proof-of-work verification (spec.md §3, §4.5).

use std::io::{self, Read, Write};

use crate::blockchain::difficulty::expand_compact;
use crate::blockchain::merkle::merkle_root;
use crate::blockchain::transaction::{OutPoint, Transaction, TxIn, TxOut};
use crate::codec::{read_var_int, write_var_int};
use crate::config::NetworkParams;
use crate::crypto::address::Address;
use crate::crypto::hash::Hash256;
use crate::error::VerifyError;

/// Block reward paid by `create_next_block`'s coinbase, fixed since subsidy
/// halving is outside this layer's scope (spec.md §3: "this layer does not
/// enforce the schedule").
pub const STANDARD_SUBSIDY: i64 = 50_0000_0000;

/// Fixed-size header: version, previous-block hash, Merkle root, timestamp,
/// compact difficulty target, nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_block: Hash256,
    pub merkle_root: Hash256,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub const SIZE: usize = 80;

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.version.to_le_bytes())?;
        w.write_all(&self.prev_block.0)?;
        w.write_all(&self.merkle_root.0)?;
        w.write_all(&self.time.to_le_bytes())?;
        w.write_all(&self.bits.to_le_bytes())?;
        w.write_all(&self.nonce.to_le_bytes())
    }

    pub fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut version_buf = [0u8; 4];
        r.read_exact(&mut version_buf)?;
        let mut prev_block = [0u8; 32];
        r.read_exact(&mut prev_block)?;
        let mut merkle_root = [0u8; 32];
        r.read_exact(&mut merkle_root)?;
        let mut time_buf = [0u8; 4];
        r.read_exact(&mut time_buf)?;
        let mut bits_buf = [0u8; 4];
        r.read_exact(&mut bits_buf)?;
        let mut nonce_buf = [0u8; 4];
        r.read_exact(&mut nonce_buf)?;
        Ok(Self {
            version: u32::from_le_bytes(version_buf),
            prev_block: Hash256(prev_block),
            merkle_root: Hash256(merkle_root),
            time: u32::from_le_bytes(time_buf),
            bits: u32::from_le_bytes(bits_buf),
            nonce: u32::from_le_bytes(nonce_buf),
        })
    }

    /// Block hash: double-SHA-256 of the 80-byte header.
    pub fn hash(&self) -> Hash256 {
        let mut buf = [0u8; Self::SIZE];
        let mut cursor = &mut buf[..];
        self.write(&mut cursor).expect("fixed-size write cannot fail");
        Hash256::of(&buf)
    }
}

/// A header, optionally followed by its transaction list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    pub fn merkle_root(&self) -> Hash256 {
        let txids: Vec<Hash256> = self.transactions.iter().map(Transaction::txid).collect();
        merkle_root(&txids)
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.header.write(w)?;
        write_var_int(w, self.transactions.len() as u64)?;
        for tx in &self.transactions {
            tx.write(w)?;
        }
        Ok(())
    }

    pub fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let header = BlockHeader::read(r)?;
        let tx_count = read_var_int(r)? as usize;
        let mut transactions = Vec::with_capacity(tx_count);
        for _ in 0..tx_count {
            transactions.push(Transaction::read(r)?);
        }
        Ok(Self { header, transactions })
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

    /// Validates, in order: header well-formedness (structural — always true
    /// once parsed), proof of work, the target-vs-network-limit bound, and
    /// (if transactions are attached) the Merkle root (spec.md §4.5).
    pub fn verify(&self, params: &NetworkParams) -> Result<(), VerifyError> {
        let target = expand_compact(self.header.bits);
        let hash_be = self.hash().as_be_integer_bytes();
        if hash_be.as_slice() > target.as_slice() {
            return Err(VerifyError::BadProofOfWork);
        }
        let limit = params.proof_of_work_limit;
        if target.as_slice() > limit.as_slice() {
            return Err(VerifyError::BadDifficultyTarget);
        }
        if !self.transactions.is_empty() && self.merkle_root() != self.header.merkle_root {
            return Err(VerifyError::BadMerkleRoot);
        }
        Ok(())
    }

    /// Builds a successor block with a single coinbase output paying
    /// `to_address` the standard subsidy, inheriting `difficultyTarget` by
    /// default, and solves the header by incrementing the nonce until
    /// proof-of-work is satisfied.
    pub fn create_next_block(&self, to_address: &Address, time: Option<u32>, params: &NetworkParams) -> Block {
        let coinbase = Transaction {
            version: 1,
            inputs: vec![TxIn {
                previous_output: OutPoint::COINBASE,
                script_sig: self.hash().0.to_vec(),
                sequence: 0xFFFF_FFFF,
            }],
            outputs: vec![TxOut {
                value: STANDARD_SUBSIDY,
                script_pubkey: pay_to_address_script(to_address),
            }],
            lock_time: 0,
        };
        let transactions = vec![coinbase];
        let merkle = merkle_root(&[transactions[0].txid()]);
        let mut header = BlockHeader {
            version: self.header.version,
            prev_block: self.hash(),
            merkle_root: merkle,
            time: time.unwrap_or(self.header.time + 1),
            bits: self.header.bits,
            nonce: 0,
        };
        let target = expand_compact(header.bits);
        loop {
            let hash_be = header.hash().as_be_integer_bytes();
            if hash_be.as_slice() <= target.as_slice() {
                break;
            }
            header.nonce = header.nonce.wrapping_add(1);
        }
        Block { header, transactions }
    }
}

/// Standard pay-to-address output script: `OP_DUP OP_HASH160 <20-byte hash>
/// OP_EQUALVERIFY OP_CHECKSIG`, recognized just well enough to identify
/// standard spends (spec.md §1: script execution is out of scope beyond
/// this).
pub fn pay_to_address_script(address: &Address) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(0x76); // OP_DUP
    script.push(0xa9); // OP_HASH160
    script.push(0x14); // push 20 bytes
    script.extend_from_slice(&address.hash);
    script.push(0x88); // OP_EQUALVERIFY
    script.push(0xac); // OP_CHECKSIG
    script
}

/// Extracts the 20-byte hash from a standard pay-to-address script, if
/// `script` matches that template.
pub fn script_pubkey_hash(script: &[u8]) -> Option<[u8; 20]> {
    if script.len() == 25
        && script[0] == 0x76
        && script[1] == 0xa9
        && script[2] == 0x14
        && script[23] == 0x88
        && script[24] == 0xac
    {
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&script[3..23]);
        Some(hash)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;

    fn easy_genesis(params: &NetworkParams) -> Block {
        params.genesis()
    }

    #[test]
    fn header_round_trips_byte_identically() {
        let header = BlockHeader {
            version: 1,
            prev_block: Hash256::zero(),
            merkle_root: Hash256::of(b"root"),
            time: 100,
            bits: 0x207F_FFFF,
            nonce: 0,
        };
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len(), BlockHeader::SIZE);
        let mut cursor = &buf[..];
        let parsed = BlockHeader::read(&mut cursor).unwrap();
        assert_eq!(header, parsed);
        assert_eq!(header.hash(), parsed.hash());
    }

    #[test]
    fn block_round_trip_preserves_hash() {
        let params = NetworkParams::for_network(Network::Unittest);
        let genesis = easy_genesis(&params);
        let key = crate::crypto::key::EcKey::generate();
        let addr = key.to_address(&params);
        let next = genesis.create_next_block(&addr, Some(genesis.header.time + 1), &params);
        let bytes = next.to_bytes();
        let parsed = Block::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.hash(), next.hash());
    }

    #[test]
    fn create_next_block_satisfies_its_own_proof_of_work() {
        let params = NetworkParams::for_network(Network::Unittest);
        let genesis = easy_genesis(&params);
        let key = crate::crypto::key::EcKey::generate();
        let addr = key.to_address(&params);
        let next = genesis.create_next_block(&addr, None, &params);
        assert!(next.verify(&params).is_ok());
    }

    #[test]
    fn bad_difficulty_target_is_rejected() {
        let params = NetworkParams::for_network(Network::Unittest);
        let genesis = easy_genesis(&params);
        let key = crate::crypto::key::EcKey::generate();
        let addr = key.to_address(&params);
        // Mined against the network's own (easy) limit, then its `bits` is
        // overridden to a target larger than that limit. The block's hash
        // still satisfies the larger target, so this is rejected by the
        // difficulty-bound check rather than a spurious proof-of-work
        // failure.
        let mut block = genesis.create_next_block(&addr, None, &params);
        block.header.bits = 0x2100_8000;
        assert_eq!(block.verify(&params), Err(VerifyError::BadDifficultyTarget));
    }

    #[test]
    fn pay_to_address_round_trips_through_script_template() {
        let addr = Address::new(0x00, [9u8; 20]);
        let script = pay_to_address_script(&addr);
        assert_eq!(script_pubkey_hash(&script), Some(addr.hash));
    }
}
