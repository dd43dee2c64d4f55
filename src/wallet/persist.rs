//! Lossless wallet persistence: keys plus the four pools, bincode-encoded
//! (spec.md §9: wallets must survive a process restart).

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::blockchain::Transaction;
use crate::config::NetworkParams;
use crate::error::WalletError;
use crate::wallet::pool::{Pool, PoolEntry};
use crate::wallet::wallet::Wallet;

#[derive(Serialize, Deserialize)]
pub(crate) struct PoolEntrySnapshot {
    pub(crate) tx_bytes: Vec<u8>,
    pub(crate) spent_outputs: Vec<u32>,
}

/// The whole of a wallet's durable state (spec.md §4.8): an ordered key
/// list plus the four pools. Transactions are carried as their wire bytes
/// rather than a `serde` derive on [`Transaction`] itself, so the on-disk
/// format tracks the same encoding peers exchange on the network.
#[derive(Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub(crate) keys: Vec<[u8; 32]>,
    pub(crate) unspent: Vec<PoolEntrySnapshot>,
    pub(crate) spent: Vec<PoolEntrySnapshot>,
    pub(crate) pending: Vec<PoolEntrySnapshot>,
    pub(crate) dead: Vec<PoolEntrySnapshot>,
}

pub(crate) fn snapshot_pool(pool: &Pool) -> Vec<PoolEntrySnapshot> {
    pool.iter_ordered()
        .map(|(_, entry)| PoolEntrySnapshot {
            tx_bytes: entry.tx.to_bytes(),
            spent_outputs: entry.spent_outputs.iter().copied().collect(),
        })
        .collect()
}

pub(crate) fn restore_pool(snapshot: &[PoolEntrySnapshot]) -> Result<Pool, WalletError> {
    let mut pool = Pool::new();
    for entry in snapshot {
        let tx = Transaction::from_bytes(&entry.tx_bytes)?;
        let txid = tx.txid();
        let mut pool_entry = PoolEntry::new(Arc::new(tx));
        pool_entry.spent_outputs = entry.spent_outputs.iter().copied().collect();
        pool.insert(txid, pool_entry);
    }
    Ok(pool)
}

impl Wallet {
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), WalletError> {
        let file = File::create(path)?;
        bincode::serialize_into(BufWriter::new(file), &self.snapshot())?;
        Ok(())
    }

    pub fn load_from_file(params: NetworkParams, path: impl AsRef<Path>) -> Result<Wallet, WalletError> {
        let file = File::open(path)?;
        let snapshot: WalletSnapshot = bincode::deserialize_from(BufReader::new(file))?;
        Wallet::from_snapshot(params, snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::block::pay_to_address_script;
    use crate::blockchain::{ConnectKind, OutPoint, TxIn, TxOut};
    use crate::config::Network;
    use crate::crypto::hash::Hash256;
    use crate::crypto::key::EcKey;
    use crate::wallet::amount::Amount;
    use crate::wallet::wallet::BalanceKind;

    #[test]
    fn round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.dat");
        let params = NetworkParams::for_network(Network::Unittest);

        let wallet = Wallet::new(params);
        let key = EcKey::generate();
        let addr = key.to_address(&params);
        wallet.add_key(key);

        let fund = Transaction {
            version: 1,
            inputs: vec![TxIn {
                previous_output: OutPoint { txid: Hash256::of(b"source"), index: 0 },
                script_sig: vec![],
                sequence: 0xFFFF_FFFF,
            }],
            outputs: vec![TxOut {
                value: 100_000_000,
                script_pubkey: pay_to_address_script(&addr),
            }],
            lock_time: 0,
        };
        wallet.receive(&fund, ConnectKind::BestChain);
        wallet.save_to_file(&path).unwrap();

        let restored = Wallet::load_from_file(params, &path).unwrap();
        assert_eq!(restored.get_balance(BalanceKind::Available), Amount(100_000_000));
    }
}
