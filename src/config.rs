//! Per-network parameters: magic bytes, ports, difficulty/timing constants,
//! and the genesis block (spec.md §6).

use crate::blockchain::block::{Block, BlockHeader, STANDARD_SUBSIDY};
use crate::blockchain::difficulty::expand_compact;
use crate::blockchain::merkle::merkle_root;
use crate::blockchain::transaction::{OutPoint, Transaction, TxIn, TxOut};
use crate::crypto::hash::Hash256;

/// Which Bitcoin-style network a peer is speaking to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Mainnet,
    Testnet,
    /// The small-interval network used by the difficulty-transition fixtures
    /// in spec.md §8 (`targetTimespan` = 200s, `interval` = 10).
    Unittest,
}

/// The constant parameters associated with a [`Network`] (spec.md §6 table).
#[derive(Debug, Clone, Copy)]
pub struct NetworkParams {
    pub network: Network,
    /// 4-byte magic, sent big-endian on the wire.
    pub magic: u32,
    pub port: u16,
    /// Base58Check version byte for pay-to-address output scripts.
    pub address_header: u8,
    /// Difficulty retarget period, in seconds.
    pub target_timespan: i64,
    /// Number of blocks between retargets.
    pub interval: u32,
    /// The easiest allowed target (big-endian 256-bit bytes).
    pub proof_of_work_limit: [u8; 32],
}

impl NetworkParams {
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self {
                network,
                magic: 0xF9BE_B4D9,
                port: 8333,
                address_header: 0x00,
                target_timespan: 14 * 24 * 60 * 60,
                interval: 2016,
                proof_of_work_limit: expand_compact(0x1D00_FFFF),
            },
            Network::Testnet => Self {
                network,
                magic: 0xFABF_B5DA,
                port: 18333,
                address_header: 0x6F,
                target_timespan: 14 * 24 * 60 * 60,
                interval: 2016,
                proof_of_work_limit: expand_compact(0x1D0F_FFFF),
            },
            Network::Unittest => Self {
                network,
                magic: 0xFABF_B5DA,
                port: 18333,
                address_header: 0x6F,
                target_timespan: 200,
                interval: 10,
                proof_of_work_limit: expand_compact(0x207F_FFFF),
            },
        }
    }

    /// The fixed genesis header and coinbase shared by all networks, distinct
    /// per-network only in timestamp/bits/nonce, mirroring the real Bitcoin
    /// genesis block.
    pub fn genesis(&self) -> Block {
        let (time, bits, nonce) = match self.network {
            Network::Mainnet => (1_231_006_505u32, 0x1D00_FFFFu32, 2_083_236_893u32),
            Network::Testnet => (1_296_688_602, 0x1D0F_FFFF, 414_098_458),
            Network::Unittest => (1_296_688_602, 0x207F_FFFF, 0),
        };
        let coinbase = genesis_coinbase();
        let header = BlockHeader {
            version: 1,
            prev_block: Hash256::zero(),
            merkle_root: merkle_root(&[coinbase.txid()]),
            time,
            bits,
            nonce,
        };
        Block {
            header,
            transactions: vec![coinbase],
        }
    }
}

/// The message embedded in every network's genesis coinbase (spec.md §6),
/// taken verbatim from the reference network's own genesis block.
const GENESIS_MESSAGE: &[u8] = b"The Times 03/Jan/2009 Chancellor on brink of second bailout for banks";

/// The single genesis coinbase shared by every network: one input
/// referencing no prior output and carrying [`GENESIS_MESSAGE`] as its
/// unlocking script, one output paying the standard subsidy to an
/// `OP_RETURN` script so it can never actually be spent.
fn genesis_coinbase() -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxIn {
            previous_output: OutPoint::COINBASE,
            script_sig: GENESIS_MESSAGE.to_vec(),
            sequence: 0xFFFF_FFFF,
        }],
        outputs: vec![TxOut {
            value: STANDARD_SUBSIDY,
            script_pubkey: vec![0x6a],
        }],
        lock_time: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mainnet_pow_limit_matches_known_target() {
        let params = NetworkParams::for_network(Network::Mainnet);
        // 0x1D00FFFF expands to 0x00000000FFFF0000...0000 (Bitcoin's genesis target).
        assert_eq!(params.proof_of_work_limit[3], 0x00);
        assert_eq!(params.proof_of_work_limit[4], 0xFF);
        assert_eq!(params.proof_of_work_limit[5], 0xFF);
    }

    #[test]
    fn unittest_network_has_short_retarget_interval() {
        let params = NetworkParams::for_network(Network::Unittest);
        assert_eq!(params.interval, 10);
        assert_eq!(params.target_timespan, 200);
    }

    #[test]
    fn genesis_blocks_differ_per_network() {
        let main = NetworkParams::for_network(Network::Mainnet).genesis();
        let test = NetworkParams::for_network(Network::Testnet).genesis();
        assert_ne!(main.header.nonce, test.header.nonce);
    }
}
