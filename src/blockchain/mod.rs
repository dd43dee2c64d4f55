//! Blocks, transactions, the header store, the chain engine, and the
//! difficulty retarget algorithm.

pub mod block;
pub mod chain;
pub mod difficulty;
pub mod merkle;
pub mod store;
pub mod transaction;

pub use block::{Block, BlockHeader};
pub use chain::{Chain, ChainObserver, ConnectKind, NullObserver};
pub use store::{BlockStore, MemoryBlockStore, StoredBlock};
pub use transaction::{OutPoint, Transaction, TxIn, TxOut};
