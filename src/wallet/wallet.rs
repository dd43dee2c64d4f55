//! The wallet: four transaction pools, balance calculation, coin
//! selection, transaction construction/signing, and reorg replay
//! (spec.md §4.8).

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::blockchain::block::{pay_to_address_script, script_pubkey_hash};
use crate::blockchain::{Block, ChainObserver, ConnectKind, OutPoint, Transaction, TxIn, TxOut};
use crate::config::NetworkParams;
use crate::crypto::address::Address;
use crate::crypto::hash::Hash256;
use crate::crypto::key::EcKey;
use crate::error::{PeerError, WalletError};
use crate::wallet::amount::Amount;
use crate::wallet::keychain::Keychain;
use crate::wallet::listener::WalletListener;
use crate::wallet::pool::{Pool, PoolEntry};

/// `SIGHASH_ALL`, the only signature-hash type this layer constructs
/// (spec.md §4.8 step 3).
const SIGHASH_ALL: u32 = 1;

/// Which balance figure [`Wallet::get_balance`] should compute (spec.md
/// §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceKind {
    Available,
    Estimated,
}

/// Broadcasts a signed transaction to the network. Implemented by
/// [`crate::network::Connection`]; kept as a trait here so the wallet does
/// not depend on the networking layer.
pub trait Broadcaster {
    fn broadcast(&self, tx: &Transaction) -> Result<(), PeerError>;
}

struct WalletState {
    keychain: Keychain,
    unspent: Pool,
    spent: Pool,
    pending: Pool,
    dead: Pool,
}

/// The wallet (spec.md §4.8). All pool and keychain mutations go through a
/// single lock so that balance reads observe a consistent snapshot and
/// concurrent chain-callback / application-thread mutation is mutually
/// exclusive (spec.md §5).
pub struct Wallet {
    params: NetworkParams,
    state: Mutex<WalletState>,
    listeners: RwLock<Vec<Arc<dyn WalletListener>>>,
}

#[derive(Clone, Copy)]
enum PoolName {
    Pending,
    Unspent,
    Spent,
}

fn my_output_indices(keychain: &Keychain, params: &NetworkParams, tx: &Transaction) -> Vec<u32> {
    tx.outputs
        .iter()
        .enumerate()
        .filter_map(|(i, out)| {
            script_pubkey_hash(&out.script_pubkey).and_then(|hash| {
                keychain
                    .keys()
                    .iter()
                    .any(|k| k.to_address(params).hash == hash)
                    .then_some(i as u32)
            })
        })
        .collect()
}

fn value_paid_to_us(keychain: &Keychain, params: &NetworkParams, tx: &Transaction) -> (Amount, Vec<u32>) {
    let indices = my_output_indices(keychain, params, tx);
    let amount = indices
        .iter()
        .fold(Amount::ZERO, |acc, &i| acc.checked_add(Amount(tx.outputs[i as usize].value)).unwrap_or(acc));
    (amount, indices)
}

impl Wallet {
    pub fn new(params: NetworkParams) -> Self {
        Self {
            params,
            state: Mutex::new(WalletState {
                keychain: Keychain::new(),
                unspent: Pool::new(),
                spent: Pool::new(),
                pending: Pool::new(),
                dead: Pool::new(),
            }),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn add_key(&self, key: EcKey) {
        self.state.lock().keychain.add(key);
    }

    pub fn add_listener(&self, listener: Arc<dyn WalletListener>) {
        self.listeners.write().push(listener);
    }

    /// Captures the current keychain and pool contents for persistence.
    pub fn snapshot(&self) -> crate::wallet::persist::WalletSnapshot {
        use crate::wallet::persist::{snapshot_pool, WalletSnapshot};
        let state = self.state.lock();
        WalletSnapshot {
            keys: state.keychain.keys().iter().map(EcKey::secret_bytes).collect(),
            unspent: snapshot_pool(&state.unspent),
            spent: snapshot_pool(&state.spent),
            pending: snapshot_pool(&state.pending),
            dead: snapshot_pool(&state.dead),
        }
    }

    /// Rebuilds a wallet from a snapshot taken by [`Wallet::snapshot`].
    pub fn from_snapshot(
        params: NetworkParams,
        snapshot: crate::wallet::persist::WalletSnapshot,
    ) -> Result<Wallet, WalletError> {
        use crate::wallet::persist::restore_pool;
        let wallet = Wallet::new(params);
        {
            let mut state = wallet.state.lock();
            for secret in &snapshot.keys {
                let key = EcKey::from_secret_bytes(*secret).map_err(|_| WalletError::InvalidKey)?;
                state.keychain.add(key);
            }
            state.unspent = restore_pool(&snapshot.unspent)?;
            state.spent = restore_pool(&snapshot.spent)?;
            state.pending = restore_pool(&snapshot.pending)?;
            state.dead = restore_pool(&snapshot.dead)?;
        }
        Ok(wallet)
    }

    fn confirmed_base(&self, state: &WalletState) -> Amount {
        let mut total = Amount::ZERO;
        for (_, entry) in state.unspent.iter() {
            for idx in my_output_indices(&state.keychain, &self.params, &entry.tx) {
                if !entry.spent_outputs.contains(&idx) {
                    total = total
                        .checked_add(Amount(entry.tx.outputs[idx as usize].value))
                        .unwrap_or(total);
                }
            }
        }
        total
    }

    fn pending_referenced_confirmed(&self, state: &WalletState) -> Amount {
        let mut total = Amount::ZERO;
        for (_, entry) in state.pending.iter() {
            for input in &entry.tx.inputs {
                if let Some(prev_entry) = state.unspent.get(&input.previous_output.txid) {
                    let idx = input.previous_output.index;
                    if !prev_entry.spent_outputs.contains(&idx)
                        && my_output_indices(&state.keychain, &self.params, &prev_entry.tx).contains(&idx)
                    {
                        total = total
                            .checked_add(Amount(prev_entry.tx.outputs[idx as usize].value))
                            .unwrap_or(total);
                    }
                }
            }
        }
        total
    }

    fn value_received_by_pending(&self, state: &WalletState) -> Amount {
        let mut total = Amount::ZERO;
        for (_, entry) in state.pending.iter() {
            for idx in my_output_indices(&state.keychain, &self.params, &entry.tx) {
                total = total
                    .checked_add(Amount(entry.tx.outputs[idx as usize].value))
                    .unwrap_or(total);
            }
        }
        total
    }

    fn available_locked(&self, state: &WalletState) -> Amount {
        self.confirmed_base(state)
            .checked_sub(self.pending_referenced_confirmed(state))
            .unwrap_or(Amount::ZERO)
    }

    fn estimated_locked(&self, state: &WalletState) -> Amount {
        self.available_locked(state)
            .checked_add(self.value_received_by_pending(state))
            .unwrap_or(Amount::ZERO)
    }

    /// `available` or `estimated`, per spec.md §3.
    pub fn get_balance(&self, kind: BalanceKind) -> Amount {
        let state = self.state.lock();
        match kind {
            BalanceKind::Available => self.available_locked(&state),
            BalanceKind::Estimated => self.estimated_locked(&state),
        }
    }

    /// Sum of our resolved, currently-confirmed inputs spent by `tx`
    /// (informative; not itself a pool-transition driver).
    pub fn value_sent_from_me(&self, tx: &Transaction) -> Amount {
        let state = self.state.lock();
        let mut total = Amount::ZERO;
        for input in &tx.inputs {
            let resolved = state
                .unspent
                .get(&input.previous_output.txid)
                .or_else(|| state.spent.get(&input.previous_output.txid));
            if let Some(entry) = resolved {
                let idx = input.previous_output.index;
                if my_output_indices(&state.keychain, &self.params, &entry.tx).contains(&idx) {
                    total = total
                        .checked_add(Amount(entry.tx.outputs[idx as usize].value))
                        .unwrap_or(total);
                }
            }
        }
        total
    }

    fn find_conflicting(state: &WalletState, outpoint: &OutPoint, exclude_txid: &Hash256) -> Vec<(Hash256, PoolName)> {
        let mut found = Vec::new();
        for (name, pool) in [
            (PoolName::Pending, &state.pending),
            (PoolName::Unspent, &state.unspent),
            (PoolName::Spent, &state.spent),
        ] {
            for (txid, entry) in pool.iter() {
                if txid != exclude_txid && entry.tx.inputs.iter().any(|i| &i.previous_output == outpoint) {
                    found.push((*txid, name));
                }
            }
        }
        found
    }

    fn remove_from_named_pool(state: &mut WalletState, name: PoolName, txid: &Hash256) -> Option<PoolEntry> {
        match name {
            PoolName::Pending => state.pending.remove(txid),
            PoolName::Unspent => state.unspent.remove(txid),
            PoolName::Spent => state.spent.remove(txid),
        }
    }

    /// `Receive(tx, kind)` (spec.md §4.8). `SideChain` is a no-op here: the
    /// chain engine caches side-chain blocks and replays them through
    /// `connect` (`BestChain`) if they later win a reorg.
    pub fn receive(&self, tx: &Transaction, kind: ConnectKind) {
        if kind == ConnectKind::SideChain {
            return;
        }

        let mut state = self.state.lock();
        let txid = tx.txid();
        let tx_arc = Arc::new(tx.clone());
        let value_to_me = value_paid_to_us(&state.keychain, &self.params, tx).0;

        // Step 2: the normal confirmation path.
        state.pending.remove(&txid);

        // Step 3: mark spent outputs on referenced confirmed transactions.
        for input in &tx.inputs {
            let prev_txid = input.previous_output.txid;
            let prev_index = input.previous_output.index;
            if let Some(entry) = state.unspent.get_mut(&prev_txid) {
                entry.spent_outputs.insert(prev_index);
                let fully_spent = my_output_indices(&state.keychain, &self.params, &entry.tx)
                    .iter()
                    .all(|i| entry.spent_outputs.contains(i));
                if fully_spent {
                    let moved = state.unspent.remove(&prev_txid).expect("just matched");
                    state.spent.insert(prev_txid, moved);
                }
            } else if let Some(entry) = state.spent.get_mut(&prev_txid) {
                entry.spent_outputs.insert(prev_index);
            }
        }

        // Step 4: double-spend (Finney attack) detection.
        let mut dead_events: Vec<Arc<Transaction>> = Vec::new();
        for input in &tx.inputs {
            for (conflict_txid, pool_name) in Self::find_conflicting(&state, &input.previous_output, &txid) {
                if let Some(entry) = Self::remove_from_named_pool(&mut state, pool_name, &conflict_txid) {
                    dead_events.push(entry.tx.clone());
                    state.dead.insert(conflict_txid, PoolEntry::new(entry.tx));
                }
            }
        }

        // Step 5: record coins paid to us. A transaction that newly pays us
        // always starts in `unspent`; nothing earlier in this function can
        // have populated its (just-created) `spent_outputs` set.
        let mut coins_event = None;
        if !value_to_me.is_zero() {
            let prev_balance = self.available_locked(&state);
            state.unspent.insert(txid, PoolEntry::new(tx_arc));
            let new_balance = self.available_locked(&state);
            coins_event = Some((prev_balance, new_balance));
        }

        drop(state);

        let listeners = self.listeners.read();
        if let Some((prev, new)) = coins_event {
            for listener in listeners.iter() {
                listener.coins_received(tx, prev, new);
            }
        }
        for dead_tx in &dead_events {
            for listener in listeners.iter() {
                listener.dead_transaction(dead_tx, tx);
            }
        }
    }

    /// Reverses `receive`'s pool transitions for a block that left the
    /// best chain. Dead-pool revival (reviving a transaction that lost a
    /// double-spend race in the disconnected block) is not attempted: the
    /// conflicting transaction would need to be replayed too, which this
    /// lightweight peer leaves to the caller re-announcing it.
    fn disconnect_tx(&self, tx: &Transaction) {
        let mut state = self.state.lock();
        let txid = tx.txid();

        for input in &tx.inputs {
            let prev_txid = input.previous_output.txid;
            let prev_index = input.previous_output.index;
            if let Some(entry) = state.spent.get_mut(&prev_txid) {
                entry.spent_outputs.remove(&prev_index);
                let moved = state.spent.remove(&prev_txid).expect("just matched");
                state.unspent.insert(prev_txid, moved);
            } else if let Some(entry) = state.unspent.get_mut(&prev_txid) {
                entry.spent_outputs.remove(&prev_index);
            }
        }

        if let Some(entry) = state.unspent.remove(&txid).or_else(|| state.spent.remove(&txid)) {
            state.pending.insert(txid, entry);
        }
    }

    /// Coin selection (insertion order of `unspent`), input/output
    /// construction, and signing (spec.md §4.8 `CreateSend`). Stateless:
    /// calling this twice over the same outputs returns two distinct,
    /// independently valid transactions; wallet state is untouched until
    /// [`Wallet::confirm_send`].
    pub fn create_send(
        &self,
        to: &Address,
        value: Amount,
        change_address: Option<&Address>,
    ) -> Result<Transaction, WalletError> {
        let state = self.state.lock();

        let mut selected: Vec<(Hash256, u32, Arc<Transaction>)> = Vec::new();
        let mut selected_value = Amount::ZERO;
        'outer: for (txid, entry) in state.unspent.iter_ordered() {
            for idx in my_output_indices(&state.keychain, &self.params, &entry.tx) {
                if entry.spent_outputs.contains(&idx) {
                    continue;
                }
                selected.push((*txid, idx, entry.tx.clone()));
                selected_value = selected_value
                    .checked_add(Amount(entry.tx.outputs[idx as usize].value))?;
                if selected_value >= value {
                    break 'outer;
                }
            }
        }
        if selected_value < value {
            return Err(WalletError::InsufficientFunds {
                requested: value.0,
                available: selected_value.0,
            });
        }

        let inputs = selected
            .iter()
            .map(|(txid, idx, _)| TxIn {
                previous_output: OutPoint { txid: *txid, index: *idx },
                script_sig: Vec::new(),
                sequence: 0xFFFF_FFFF,
            })
            .collect();

        let mut outputs = vec![TxOut {
            value: value.0,
            script_pubkey: pay_to_address_script(to),
        }];
        let change_value = selected_value.checked_sub(value)?;
        if !change_value.is_zero() {
            let change_addr = change_address
                .copied()
                .or_else(|| state.keychain.default_change_address(&self.params))
                .ok_or(WalletError::EmptyKeychain)?;
            outputs.push(TxOut {
                value: change_value.0,
                script_pubkey: pay_to_address_script(&change_addr),
            });
        }

        let mut tx = Transaction {
            version: 1,
            inputs,
            outputs,
            lock_time: 0,
        };

        for (i, (_, idx, prev_tx)) in selected.iter().enumerate() {
            let prev_out = &prev_tx.outputs[*idx as usize];
            let hash = script_pubkey_hash(&prev_out.script_pubkey).ok_or(WalletError::EmptyKeychain)?;
            let key = state
                .keychain
                .keys()
                .iter()
                .find(|k| k.to_address(&self.params).hash == hash)
                .ok_or(WalletError::EmptyKeychain)?;
            let sighash = signature_hash(&tx, i, &prev_out.script_pubkey);
            let der_sig = key.sign(&sighash.0);
            tx.inputs[i].script_sig = build_script_sig(&der_sig, &key.public_key_bytes());
        }

        Ok(tx)
    }

    /// Moves `tx` into `pending`, which also removes its inputs' referenced
    /// outputs from the `available` balance (spec.md §4.8 `ConfirmSend`).
    /// Emits no event.
    pub fn confirm_send(&self, tx: &Transaction) {
        let mut state = self.state.lock();
        state.pending.insert(tx.txid(), PoolEntry::new(Arc::new(tx.clone())));
    }

    /// `CreateSend`; `ConfirmSend`; broadcast (spec.md §4.8 `SendCoins`).
    pub fn send_coins(
        &self,
        to: &Address,
        value: Amount,
        change_address: Option<&Address>,
        peer: &dyn Broadcaster,
    ) -> Result<Transaction, PeerError> {
        let tx = self.create_send(to, value, change_address)?;
        self.confirm_send(&tx);
        peer.broadcast(&tx)?;
        Ok(tx)
    }
}

impl ChainObserver for Wallet {
    fn block_connected(&self, block: &Block, kind: ConnectKind) {
        for tx in &block.transactions {
            self.receive(tx, kind);
        }
    }

    fn block_disconnected(&self, block: &Block) {
        for tx in &block.transactions {
            self.disconnect_tx(tx);
        }
    }
}

/// `doubleDigest(serialization-with-script-substitution || SIGHASH_ALL-as-u32-LE)`
/// (spec.md §4.8 step 3): the input being signed has its `scriptSig`
/// temporarily replaced with the referenced output's `scriptPubKey`, and
/// every other input's `scriptSig` is blanked.
fn signature_hash(tx: &Transaction, input_index: usize, script_pubkey: &[u8]) -> Hash256 {
    let mut tx_copy = tx.clone();
    for (i, input) in tx_copy.inputs.iter_mut().enumerate() {
        input.script_sig = if i == input_index { script_pubkey.to_vec() } else { Vec::new() };
    }
    let mut bytes = tx_copy.to_bytes();
    bytes.extend_from_slice(&SIGHASH_ALL.to_le_bytes());
    Hash256::of(&bytes)
}

/// `<sigBytes||SIGHASH_ALL> <pubKey>` (spec.md §4.8 step 3), encoded as two
/// direct-length pushes — both operands fit under the 76-byte direct-push
/// limit.
fn build_script_sig(der_signature: &[u8], public_key: &[u8; 65]) -> Vec<u8> {
    let mut sig_with_type = der_signature.to_vec();
    sig_with_type.push(SIGHASH_ALL as u8);
    let mut script = Vec::with_capacity(1 + sig_with_type.len() + 1 + public_key.len());
    script.push(sig_with_type.len() as u8);
    script.extend_from_slice(&sig_with_type);
    script.push(public_key.len() as u8);
    script.extend_from_slice(public_key);
    script
}
