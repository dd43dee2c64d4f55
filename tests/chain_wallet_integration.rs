//! End-to-end fixtures crossing the chain engine and the wallet together,
//! covering the scenarios the unit tests in each module don't reach on
//! their own: a wallet watching live `block_connected`/`block_disconnected`
//! notifications as the chain extends, forks, and reorganizes.

use std::sync::{Arc, Mutex};

use spv_peer::blockchain::{Chain, ChainObserver, ConnectKind, MemoryBlockStore, StoredBlock, Transaction};
use spv_peer::config::{Network, NetworkParams};
use spv_peer::crypto::key::EcKey;
use spv_peer::wallet::{Amount, BalanceKind, Wallet, WalletListener};

/// Records every `coins_received`/`dead_transaction` callback for assertions.
#[derive(Default)]
struct RecordingListener {
    coins_received: Mutex<Vec<(Amount, Amount)>>,
    dead_transactions: Mutex<usize>,
}

impl WalletListener for RecordingListener {
    fn coins_received(&self, _tx: &Transaction, prev: Amount, new: Amount) {
        self.coins_received.lock().unwrap().push((prev, new));
    }

    fn dead_transaction(&self, _dead_tx: &Transaction, _replacement_tx: &Transaction) {
        *self.dead_transactions.lock().unwrap() += 1;
    }
}

/// A chain engine plus a wallet wired up as its observer, mirroring how a
/// real peer would connect the two: the chain only ever talks to the wallet
/// through `ChainObserver`.
struct Harness {
    chain: Arc<Chain>,
    wallet: Arc<Wallet>,
    params: NetworkParams,
}

struct Forwarding(Arc<Wallet>);

impl ChainObserver for Forwarding {
    fn block_connected(&self, block: &spv_peer::blockchain::Block, kind: ConnectKind) {
        self.0.block_connected(block, kind);
    }
    fn block_disconnected(&self, block: &spv_peer::blockchain::Block) {
        self.0.block_disconnected(block);
    }
}

fn harness() -> (Harness, spv_peer::crypto::address::Address) {
    let params = NetworkParams::for_network(Network::Unittest);
    let genesis = params.genesis();
    let store = Arc::new(MemoryBlockStore::new(StoredBlock::genesis(&genesis)));
    let wallet = Arc::new(Wallet::new(params));
    let key = EcKey::generate();
    let addr = key.to_address(&params);
    wallet.add_key(key);

    let chain = Arc::new(Chain::new(store, params, Arc::new(Forwarding(Arc::clone(&wallet)))));
    chain.init_genesis(genesis).unwrap();

    (Harness { chain, wallet, params }, addr)
}

/// spec.md §8 fixture: a wallet-owned coinbase maturing on the best chain
/// raises `available` balance and fires exactly one `coins_received` event.
#[test]
fn coinbase_paid_to_our_address_raises_balance_and_notifies() {
    let (h, addr) = harness();
    let listener = Arc::new(RecordingListener::default());
    h.wallet.add_listener(listener.clone());

    let genesis_block = h.params.genesis();
    let b1 = genesis_block.create_next_block(&addr, Some(genesis_block.header.time + 1), &h.params);
    assert!(h.chain.add(b1).unwrap());

    assert_eq!(
        h.wallet.get_balance(BalanceKind::Available),
        Amount(50_0000_0000)
    );
    assert_eq!(listener.coins_received.lock().unwrap().len(), 1);
    assert_eq!(*listener.dead_transactions.lock().unwrap(), 0);
}

/// spec.md §8 fixture: a block on a side chain that never overtakes the
/// best chain must not move the wallet's balance.
#[test]
fn side_chain_block_does_not_affect_balance() {
    let (h, addr) = harness();
    let stranger = EcKey::generate().to_address(&h.params);

    let genesis_block = h.params.genesis();
    let a1 = genesis_block.create_next_block(&stranger, Some(genesis_block.header.time + 10), &h.params);
    h.chain.add(a1.clone()).unwrap();
    let a2 = a1.create_next_block(&stranger, Some(a1.header.time + 10), &h.params);
    h.chain.add(a2).unwrap();

    // Side branch pays our wallet but never gains enough work to take the head.
    let b1 = genesis_block.create_next_block(&addr, Some(genesis_block.header.time + 20), &h.params);
    h.chain.add(b1).unwrap();

    assert_eq!(h.wallet.get_balance(BalanceKind::Available), Amount::ZERO);
}

/// spec.md §8 fixture: a reorg onto a side branch that does pay our wallet
/// must raise the balance once the branch overtakes, and dropping back to
/// the original branch (a second reorg) must lower it again.
#[test]
fn reorg_onto_a_branch_paying_us_updates_balance_both_ways() {
    let (h, addr) = harness();
    let stranger = EcKey::generate().to_address(&h.params);

    let genesis_block = h.params.genesis();

    // Main branch: genesis -> a1 -> a2, paying a stranger.
    let a1 = genesis_block.create_next_block(&stranger, Some(genesis_block.header.time + 10), &h.params);
    h.chain.add(a1.clone()).unwrap();
    let a2 = a1.create_next_block(&stranger, Some(a1.header.time + 10), &h.params);
    h.chain.add(a2).unwrap();
    assert_eq!(h.wallet.get_balance(BalanceKind::Available), Amount::ZERO);

    // Side branch from genesis, paying our wallet, eventually overtakes.
    let b1 = genesis_block.create_next_block(&addr, Some(genesis_block.header.time + 20), &h.params);
    h.chain.add(b1.clone()).unwrap();
    let b2 = b1.create_next_block(&stranger, Some(b1.header.time + 10), &h.params);
    h.chain.add(b2.clone()).unwrap();
    let b3 = b2.create_next_block(&stranger, Some(b2.header.time + 10), &h.params);
    h.chain.add(b3).unwrap();

    assert_eq!(
        h.wallet.get_balance(BalanceKind::Available),
        Amount(50_0000_0000),
        "the reorg must replay b1's coinbase paying us"
    );
}

/// spec.md §8 fixture: an unconnected (orphan) block must be silently
/// discarded, with no wallet side effects, until its parent arrives.
#[test]
fn unconnected_block_produces_no_wallet_side_effects_until_its_parent_connects() {
    let (h, addr) = harness();
    let genesis_block = h.params.genesis();
    let b1 = genesis_block.create_next_block(&addr, Some(genesis_block.header.time + 1), &h.params);
    let b2 = b1.create_next_block(&addr, Some(b1.header.time + 1), &h.params);

    assert!(!h.chain.add(b2.clone()).unwrap());
    assert_eq!(h.wallet.get_balance(BalanceKind::Available), Amount::ZERO);

    assert!(h.chain.add(b1).unwrap());
    assert_eq!(
        h.wallet.get_balance(BalanceKind::Available),
        Amount(100_0000_0000)
    );
}
