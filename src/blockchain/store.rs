//! Persistent header storage with an atomic chain-head pointer (spec.md
//! §4.6). `MemoryBlockStore` backs tests and the `in-memory` feature; a
//! RocksDB-backed store is available under the `persistent` feature,
//! grounded in the teacher's `database::UTXOStorage` trait-over-backends
//! shape.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::crypto::hash::Hash256;
use crate::error::StoreError;
use primitive_types::U256;

use crate::blockchain::block::{Block, BlockHeader};

/// A header plus the cumulative proof-of-work it and all its ancestors
/// represent, and its height from genesis (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredBlock {
    pub header: BlockHeader,
    pub chain_work: U256,
    pub height: u32,
}

impl StoredBlock {
    /// The genesis `StoredBlock`: height 0, chain work equal to its own
    /// block's contribution.
    pub fn genesis(block: &Block) -> Self {
        let work = crate::blockchain::difficulty::block_work(&crate::blockchain::difficulty::expand_compact(
            block.header.bits,
        ));
        Self {
            header: block.header,
            chain_work: work,
            height: 0,
        }
    }

    /// Builds the `StoredBlock` that results from accepting `block` as this
    /// block's successor (spec.md §4.7 step 4).
    pub fn build(&self, block: &Block) -> Self {
        let work = crate::blockchain::difficulty::block_work(&crate::blockchain::difficulty::expand_compact(
            block.header.bits,
        ));
        Self {
            header: block.header,
            chain_work: self.chain_work + work,
            height: self.height + 1,
        }
    }

    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }
}

/// Storage contract shared by the in-memory and persistent backends.
pub trait BlockStore: Send + Sync {
    fn put(&self, block: StoredBlock) -> Result<(), StoreError>;
    fn get(&self, hash: &Hash256) -> Result<Option<StoredBlock>, StoreError>;
    fn get_chain_head(&self) -> Result<StoredBlock, StoreError>;
    fn set_chain_head(&self, block: StoredBlock) -> Result<(), StoreError>;
}

/// An in-memory `BlockStore`, keyed by block hash.
pub struct MemoryBlockStore {
    blocks: RwLock<HashMap<Hash256, StoredBlock>>,
    chain_head: RwLock<Option<Hash256>>,
}

impl MemoryBlockStore {
    /// Creates a store seeded with `genesis` as both the sole entry and the
    /// initial chain head.
    pub fn new(genesis: StoredBlock) -> Self {
        let hash = genesis.hash();
        let mut blocks = HashMap::new();
        blocks.insert(hash, genesis);
        Self {
            blocks: RwLock::new(blocks),
            chain_head: RwLock::new(Some(hash)),
        }
    }
}

impl BlockStore for MemoryBlockStore {
    fn put(&self, block: StoredBlock) -> Result<(), StoreError> {
        self.blocks.write().insert(block.hash(), block);
        Ok(())
    }

    fn get(&self, hash: &Hash256) -> Result<Option<StoredBlock>, StoreError> {
        Ok(self.blocks.read().get(hash).copied())
    }

    fn get_chain_head(&self) -> Result<StoredBlock, StoreError> {
        let head_hash = self.chain_head.read().ok_or(StoreError::NoChainHead)?;
        self.blocks
            .read()
            .get(&head_hash)
            .copied()
            .ok_or_else(|| StoreError::NotFound(head_hash.to_string()))
    }

    fn set_chain_head(&self, block: StoredBlock) -> Result<(), StoreError> {
        let hash = block.hash();
        let mut blocks = self.blocks.write();
        blocks.insert(hash, block);
        *self.chain_head.write() = Some(hash);
        Ok(())
    }
}

#[cfg(feature = "persistent")]
pub mod persistent {
    //! A RocksDB-backed `BlockStore`. Blocks are serialized with `bincode`
    //! under their hash as key; the chain-head pointer lives under a
    //! dedicated sentinel key so `set_chain_head` commits atomically with
    //! respect to process crashes (RocksDB's single-`put` durability).

    use super::*;
    use rocksdb::DB;
    use serde::{Deserialize, Serialize};
    use std::path::Path;

    const CHAIN_HEAD_KEY: &[u8] = b"__chain_head__";

    #[derive(Serialize, Deserialize)]
    struct StoredBlockRecord {
        header_bytes: [u8; 80],
        chain_work_be: [u8; 32],
        height: u32,
    }

    impl From<StoredBlock> for StoredBlockRecord {
        fn from(b: StoredBlock) -> Self {
            let mut header_bytes = [0u8; 80];
            let mut cursor = &mut header_bytes[..];
            b.header.write(&mut cursor).expect("fixed-size write cannot fail");
            let mut chain_work_be = [0u8; 32];
            b.chain_work.to_big_endian(&mut chain_work_be);
            Self {
                header_bytes,
                chain_work_be,
                height: b.height,
            }
        }
    }

    impl StoredBlockRecord {
        fn into_stored(self) -> std::io::Result<StoredBlock> {
            let mut cursor = &self.header_bytes[..];
            let header = BlockHeader::read(&mut cursor)?;
            Ok(StoredBlock {
                header,
                chain_work: U256::from_big_endian(&self.chain_work_be),
                height: self.height,
            })
        }
    }

    pub struct RocksBlockStore {
        db: DB,
    }

    impl RocksBlockStore {
        pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
            let db = DB::open_default(path).map_err(|e| StoreError::NotFound(e.to_string()))?;
            Ok(Self { db })
        }

        /// Opens (or creates) the store, seeding it with `genesis` if empty.
        pub fn open_or_init(path: impl AsRef<Path>, genesis: StoredBlock) -> Result<Self, StoreError> {
            let store = Self::open(path)?;
            if store.get_chain_head().is_err() {
                store.set_chain_head(genesis)?;
            }
            Ok(store)
        }
    }

    impl BlockStore for RocksBlockStore {
        fn put(&self, block: StoredBlock) -> Result<(), StoreError> {
            let record = StoredBlockRecord::from(block);
            let bytes = bincode::serialize(&record)?;
            self.db.put(block.hash().as_bytes(), bytes).map_err(|e| StoreError::NotFound(e.to_string()))
        }

        fn get(&self, hash: &Hash256) -> Result<Option<StoredBlock>, StoreError> {
            match self.db.get(hash.as_bytes()).map_err(|e| StoreError::NotFound(e.to_string()))? {
                Some(bytes) => {
                    let record: StoredBlockRecord = bincode::deserialize(&bytes)?;
                    Ok(Some(record.into_stored()?))
                }
                None => Ok(None),
            }
        }

        fn get_chain_head(&self) -> Result<StoredBlock, StoreError> {
            let hash_bytes = self
                .db
                .get(CHAIN_HEAD_KEY)
                .map_err(|e| StoreError::NotFound(e.to_string()))?
                .ok_or(StoreError::NoChainHead)?;
            let mut hash = [0u8; 32];
            hash.copy_from_slice(&hash_bytes);
            self.get(&Hash256(hash))?.ok_or(StoreError::NoChainHead)
        }

        fn set_chain_head(&self, block: StoredBlock) -> Result<(), StoreError> {
            self.put(block)?;
            self.db
                .put(CHAIN_HEAD_KEY, block.hash().0)
                .map_err(|e| StoreError::NotFound(e.to_string()))
        }
    }
}
