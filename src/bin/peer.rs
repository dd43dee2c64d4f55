//! An informative example binary (spec.md §6: "CLI surface of the example
//! collaborator ... not part of the core"). It brings up a chain engine and
//! an empty wallet on the requested network and reports their starting
//! state; it does not dial a peer or relay anything.

use std::sync::Arc;

use clap::Parser;
use log::info;

use spv_peer::blockchain::{Chain, MemoryBlockStore, NullObserver};
use spv_peer::config::{Network, NetworkParams};
use spv_peer::wallet::{BalanceKind, Wallet};

#[derive(Parser, Debug)]
#[command(name = "spv-peer", about = "A lightweight SPV Bitcoin peer")]
struct Args {
    /// Selects the test network instead of mainnet.
    #[arg(value_enum, default_value = "mainnet")]
    network: NetworkArg,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum NetworkArg {
    Mainnet,
    Testnet,
}

impl From<NetworkArg> for Network {
    fn from(arg: NetworkArg) -> Self {
        match arg {
            NetworkArg::Mainnet => Network::Mainnet,
            NetworkArg::Testnet => Network::Testnet,
        }
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    let params = NetworkParams::for_network(args.network.into());

    let genesis = params.genesis();
    let store = Arc::new(MemoryBlockStore::new(
        spv_peer::blockchain::StoredBlock::genesis(&genesis),
    ));
    let chain = Chain::new(store, params, Arc::new(NullObserver));
    chain.init_genesis(genesis).expect("fresh store accepts its own genesis");

    let wallet = Wallet::new(params);

    let head = chain.chain_head().expect("genesis was just set");
    info!(
        "network={:?} chain head={} height={} wallet available={} estimated={}",
        params.network,
        head.hash(),
        head.height,
        wallet.get_balance(BalanceKind::Available),
        wallet.get_balance(BalanceKind::Estimated),
    );
}
