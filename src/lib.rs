//! A lightweight SPV (simplified-payment-verification) Bitcoin-style peer:
//! a header-only block-chain engine, a four-pool wallet, and the
//! peer-to-peer wire codec that connects them to the network.

pub mod blockchain;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod network;
pub mod wallet;
