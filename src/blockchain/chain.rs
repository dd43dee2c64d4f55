//! The block-chain engine: extension, fork detection, reorganization, and
//! difficulty retargeting (spec.md §4.7). Grounded in the teacher's
//! `consensus::difficulty::CompactDifficulty` for the retarget math and its
//! `database::UTXOStorage` trait-over-backends shape for the store
//! dependency, generalized to the header-only chain this spec describes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::blockchain::block::Block;
use crate::blockchain::difficulty::{clamp_timespan, encode_compact, expand_compact, retarget};
use crate::blockchain::store::{BlockStore, StoredBlock};
use crate::config::NetworkParams;
use crate::crypto::hash::Hash256;
use crate::error::{PeerError, StoreError, VerifyError};

/// Whether a connected block belongs to the best chain or a known side
/// chain (spec.md §4.7 step 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectKind {
    BestChain,
    SideChain,
}

/// The chain engine's single downstream collaborator. A block arriving on
/// the best chain, a side chain, or during reorg replay reaches the
/// listener through these three calls; it does not know about wallet pools
/// or transactions, only blocks and their kind (spec.md §9: narrow observer
/// interfaces).
pub trait ChainObserver: Send + Sync {
    fn block_connected(&self, block: &Block, kind: ConnectKind);
    fn block_disconnected(&self, block: &Block);
}

/// An observer that does nothing; useful for tests exercising the chain
/// engine in isolation.
pub struct NullObserver;

impl ChainObserver for NullObserver {
    fn block_connected(&self, _block: &Block, _kind: ConnectKind) {}
    fn block_disconnected(&self, _block: &Block) {}
}

/// Owns the header store and drives `add`. Full blocks (not just headers)
/// are cached here, not in the `BlockStore`, since only the chain engine
/// needs them — to replay transactions during a reorg — while the header
/// store's job is limited to the hash/work/height triple spec.md §4.6
/// describes.
pub struct Chain {
    store: Arc<dyn BlockStore>,
    params: NetworkParams,
    blocks: RwLock<HashMap<Hash256, Block>>,
    orphans: RwLock<HashMap<Hash256, Vec<Block>>>,
    observer: Arc<dyn ChainObserver>,
}

impl Chain {
    pub fn new(store: Arc<dyn BlockStore>, params: NetworkParams, observer: Arc<dyn ChainObserver>) -> Self {
        Self {
            store,
            params,
            blocks: RwLock::new(HashMap::new()),
            orphans: RwLock::new(HashMap::new()),
            observer,
        }
    }

    /// Seeds the chain with its genesis block, caching the full block for
    /// later reorg replay.
    pub fn init_genesis(&self, genesis: Block) -> Result<(), PeerError> {
        let stored = StoredBlock::genesis(&genesis);
        self.store.set_chain_head(stored)?;
        self.blocks.write().insert(genesis.hash(), genesis);
        Ok(())
    }

    /// Adds `block` to the chain. Returns `Ok(true)` if it extended a chain
    /// (best or side), `Ok(false)` if its parent is unknown (orphan,
    /// silently discarded per spec.md §4.7).
    pub fn add(&self, block: Block) -> Result<bool, PeerError> {
        if self.store.get(&block.hash())?.is_some() {
            return Ok(true);
        }
        block.verify(&self.params)?;

        let prev = match self.store.get(&block.header.prev_block)? {
            Some(prev) => prev,
            None => {
                self.orphans
                    .write()
                    .entry(block.header.prev_block)
                    .or_default()
                    .push(block);
                return Ok(false);
            }
        };

        let new_stored = prev.build(&block);
        self.check_difficulty(&prev, &new_stored, &block)?;

        self.store.put(new_stored)?;
        let hash = block.hash();
        self.blocks.write().insert(hash, block.clone());

        let current_head = self.store.get_chain_head()?;
        if prev.hash() == current_head.hash() {
            self.store.set_chain_head(new_stored)?;
            self.observer.block_connected(&block, ConnectKind::BestChain);
        } else if new_stored.chain_work > current_head.chain_work {
            self.reorganize(current_head, new_stored)?;
        } else {
            self.observer.block_connected(&block, ConnectKind::SideChain);
        }

        self.connect_orphans(hash)?;
        Ok(true)
    }

    fn check_difficulty(
        &self,
        prev: &StoredBlock,
        new_stored: &StoredBlock,
        block: &Block,
    ) -> Result<(), VerifyError> {
        if new_stored.height % self.params.interval == 0 {
            let start = self
                .walk_back(*prev, self.params.interval - 1)
                .map_err(|_| VerifyError::UnexpectedDifficultyChange)?;
            let elapsed = new_stored.header.time as i64 - start.header.time as i64;
            let clamped = clamp_timespan(elapsed, self.params.target_timespan);
            let prev_target = expand_compact(prev.header.bits);
            let new_target = retarget(&prev_target, clamped, self.params.target_timespan, &self.params.proof_of_work_limit);
            let expected_bits = encode_compact(&new_target);
            if block.header.bits != expected_bits {
                return Err(VerifyError::UnexpectedDifficultyChange);
            }
        } else if block.header.bits != prev.header.bits {
            return Err(VerifyError::UnexpectedDifficultyChange);
        }
        Ok(())
    }

    fn walk_back(&self, mut from: StoredBlock, steps: u32) -> Result<StoredBlock, StoreError> {
        for _ in 0..steps {
            from = self
                .store
                .get(&from.header.prev_block)?
                .ok_or_else(|| StoreError::NotFound(from.header.prev_block.to_string()))?;
        }
        Ok(from)
    }

    fn common_ancestor(&self, mut a: StoredBlock, mut b: StoredBlock) -> Result<StoredBlock, StoreError> {
        while a.height > b.height {
            a = self
                .store
                .get(&a.header.prev_block)?
                .ok_or_else(|| StoreError::NotFound(a.header.prev_block.to_string()))?;
        }
        while b.height > a.height {
            b = self
                .store
                .get(&b.header.prev_block)?
                .ok_or_else(|| StoreError::NotFound(b.header.prev_block.to_string()))?;
        }
        while a.hash() != b.hash() {
            a = self
                .store
                .get(&a.header.prev_block)?
                .ok_or_else(|| StoreError::NotFound(a.header.prev_block.to_string()))?;
            b = self
                .store
                .get(&b.header.prev_block)?
                .ok_or_else(|| StoreError::NotFound(b.header.prev_block.to_string()))?;
        }
        Ok(a)
    }

    /// Collects the `StoredBlock`s strictly between `fork` and `tip`, tip
    /// first (closest-to-tip order).
    fn branch_from(&self, tip: StoredBlock, fork: &StoredBlock) -> Result<Vec<StoredBlock>, StoreError> {
        let mut branch = Vec::new();
        let mut cur = tip;
        while cur.hash() != fork.hash() {
            branch.push(cur);
            cur = self
                .store
                .get(&cur.header.prev_block)?
                .ok_or_else(|| StoreError::NotFound(cur.header.prev_block.to_string()))?;
        }
        Ok(branch)
    }

    fn full_block(&self, stored: &StoredBlock) -> Result<Block, StoreError> {
        self.blocks
            .read()
            .get(&stored.hash())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(stored.hash().to_string()))
    }

    /// Replays a chain-split in favor of `new_head` (spec.md §4.7.1):
    /// disconnect `old_branch` tip-to-fork, connect `new_branch`
    /// fork-to-tip, then move the chain-head pointer last.
    fn reorganize(&self, old_head: StoredBlock, new_head: StoredBlock) -> Result<(), PeerError> {
        let fork = self.common_ancestor(old_head, new_head)?;
        let old_branch = self.branch_from(old_head, &fork)?;
        let mut new_branch = self.branch_from(new_head, &fork)?;
        new_branch.reverse();

        for stored in &old_branch {
            let block = self.full_block(stored)?;
            self.observer.block_disconnected(&block);
        }
        for stored in &new_branch {
            let block = self.full_block(stored)?;
            self.observer.block_connected(&block, ConnectKind::BestChain);
        }

        self.store.set_chain_head(new_head)?;
        Ok(())
    }

    fn connect_orphans(&self, parent_hash: Hash256) -> Result<(), PeerError> {
        let waiting = self.orphans.write().remove(&parent_hash);
        if let Some(waiting) = waiting {
            for orphan in waiting {
                self.add(orphan)?;
            }
        }
        Ok(())
    }

    pub fn chain_head(&self) -> Result<StoredBlock, StoreError> {
        self.store.get_chain_head()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::block::{pay_to_address_script, BlockHeader, STANDARD_SUBSIDY};
    use crate::blockchain::merkle::merkle_root;
    use crate::blockchain::store::MemoryBlockStore;
    use crate::blockchain::transaction::{OutPoint, Transaction, TxIn, TxOut};
    use crate::config::Network;
    use crate::crypto::address::Address;
    use crate::crypto::key::EcKey;

    fn fresh_chain() -> (Chain, NetworkParams, crate::crypto::address::Address) {
        let params = NetworkParams::for_network(Network::Unittest);
        let genesis = params.genesis();
        let stored_genesis = StoredBlock::genesis(&genesis);
        let store = Arc::new(MemoryBlockStore::new(stored_genesis));
        let chain = Chain::new(store, params, Arc::new(NullObserver));
        chain.blocks.write().insert(genesis.hash(), genesis);
        let key = EcKey::generate();
        let addr = key.to_address(&params);
        (chain, params, addr)
    }

    /// Mines a successor to `prev` under a caller-chosen `bits`, rather than
    /// `Block::create_next_block`'s inherited-bits default — needed to drive
    /// a block through a retarget boundary with the recomputed difficulty.
    fn mine_block_with_bits(prev: &Block, to_address: &Address, time: u32, bits: u32) -> Block {
        let coinbase = Transaction {
            version: 1,
            inputs: vec![TxIn {
                previous_output: OutPoint::COINBASE,
                script_sig: prev.hash().0.to_vec(),
                sequence: 0xFFFF_FFFF,
            }],
            outputs: vec![TxOut {
                value: STANDARD_SUBSIDY,
                script_pubkey: pay_to_address_script(to_address),
            }],
            lock_time: 0,
        };
        let mut header = BlockHeader {
            version: prev.header.version,
            prev_block: prev.hash(),
            merkle_root: merkle_root(&[coinbase.txid()]),
            time,
            bits,
            nonce: 0,
        };
        let target = expand_compact(bits);
        loop {
            let hash_be = header.hash().as_be_integer_bytes();
            if hash_be.as_slice() <= target.as_slice() {
                break;
            }
            header.nonce = header.nonce.wrapping_add(1);
        }
        Block {
            header,
            transactions: vec![coinbase],
        }
    }

    #[test]
    fn extending_the_best_chain_moves_the_head() {
        let (chain, params, addr) = fresh_chain();
        let genesis = chain.full_block(&chain.chain_head().unwrap()).unwrap();
        let b1 = genesis.create_next_block(&addr, None, &params);
        assert!(chain.add(b1.clone()).unwrap());
        assert_eq!(chain.chain_head().unwrap().hash(), b1.hash());
    }

    #[test]
    fn adding_the_same_block_twice_is_idempotent() {
        let (chain, params, addr) = fresh_chain();
        let genesis = chain.full_block(&chain.chain_head().unwrap()).unwrap();
        let b1 = genesis.create_next_block(&addr, None, &params);
        assert!(chain.add(b1.clone()).unwrap());
        assert!(chain.add(b1).unwrap());
    }

    #[test]
    fn unconnected_block_is_rejected_until_its_parent_arrives() {
        let (chain, params, addr) = fresh_chain();
        let genesis = chain.full_block(&chain.chain_head().unwrap()).unwrap();
        let b1 = genesis.create_next_block(&addr, None, &params);
        let b2 = b1.create_next_block(&addr, None, &params);
        assert!(!chain.add(b2.clone()).unwrap());
        assert_eq!(chain.chain_head().unwrap().hash(), genesis.hash());
        assert!(chain.add(b1).unwrap());
        assert_eq!(chain.chain_head().unwrap().hash(), b2.hash());
    }

    #[test]
    fn bad_difficulty_target_is_rejected_and_state_is_unchanged() {
        let (chain, params, addr) = fresh_chain();
        let genesis = chain.full_block(&chain.chain_head().unwrap()).unwrap();
        // Mined against genesis's own (easy) bits, then overridden to a
        // target larger than the network's proof-of-work limit; the mined
        // hash still satisfies that larger target, so rejection comes from
        // the difficulty-bound check specifically.
        let mut b1 = genesis.create_next_block(&addr, None, &params);
        b1.header.bits = 0x2100_8000;
        assert!(matches!(
            chain.add(b1),
            Err(PeerError::Verify(VerifyError::BadDifficultyTarget))
        ));
        assert_eq!(chain.chain_head().unwrap().hash(), genesis.hash());
    }

    #[test]
    fn side_chain_that_overtakes_triggers_reorg() {
        let (chain, params, addr) = fresh_chain();
        let genesis = chain.full_block(&chain.chain_head().unwrap()).unwrap();

        // Main branch: genesis -> a1 -> a2
        let a1 = genesis.create_next_block(&addr, Some(genesis.header.time + 10), &params);
        chain.add(a1.clone()).unwrap();
        let a2 = a1.create_next_block(&addr, Some(a1.header.time + 10), &params);
        chain.add(a2.clone()).unwrap();
        assert_eq!(chain.chain_head().unwrap().hash(), a2.hash());

        // Side branch from genesis: b1 (same height as a1, doesn't overtake alone)
        let b1 = genesis.create_next_block(&addr, Some(genesis.header.time + 20), &params);
        assert!(chain.add(b1.clone()).unwrap());
        assert_eq!(chain.chain_head().unwrap().hash(), a2.hash(), "equal work side chain must not take the head");

        // Extend the side branch past the main branch's chain work.
        let b2 = b1.create_next_block(&addr, Some(b1.header.time + 10), &params);
        chain.add(b2.clone()).unwrap();
        let b3 = b2.create_next_block(&addr, Some(b2.header.time + 10), &params);
        chain.add(b3.clone()).unwrap();

        assert_eq!(chain.chain_head().unwrap().hash(), b3.hash());
        let head = chain.chain_head().unwrap();
        assert!(head.chain_work > StoredBlock::genesis(&genesis).chain_work);
    }

    #[test]
    fn retarget_boundary_recomputes_difficulty_and_rejects_unchanged_bits() {
        let (chain, params, addr) = fresh_chain();
        let mut prev = chain.full_block(&chain.chain_head().unwrap()).unwrap();

        // Mine interval-1 blocks, timestamps 2s apart, so the next block
        // lands exactly on the retarget boundary (spec.md §8 fixture 7).
        for _ in 0..(params.interval - 1) {
            let next = prev.create_next_block(&addr, Some(prev.header.time + 2), &params);
            assert!(chain.add(next.clone()).unwrap());
            prev = next;
        }
        assert_eq!(chain.chain_head().unwrap().height, params.interval - 1);

        let unchanged = prev.create_next_block(&addr, Some(prev.header.time + 2), &params);
        assert!(matches!(
            chain.add(unchanged),
            Err(PeerError::Verify(VerifyError::UnexpectedDifficultyChange))
        ));
        assert_eq!(chain.chain_head().unwrap().height, params.interval - 1);

        let retargeted = mine_block_with_bits(&prev, &addr, prev.header.time + 2, 0x201F_FFFF);
        assert!(chain.add(retargeted).unwrap());
        let head = chain.chain_head().unwrap();
        assert_eq!(head.height, params.interval);
        assert_eq!(head.header.bits, 0x201F_FFFF);
    }
}
