//! Crate-wide error types, one variant family per failure domain.

use thiserror::Error;

/// A malformed or unrecoverable wire-level failure (spec.md §7, kind 1).
///
/// The connection that produced this error is not recoverable: the caller of
/// `read_message` should drop it.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("connection closed before magic bytes were observed")]
    Disconnected,

    #[error("payload length {0} exceeds maximum message size")]
    PayloadTooLarge(u32),

    #[error("checksum mismatch for command {command:?}")]
    ChecksumMismatch { command: String },

    #[error("command field is not valid ASCII/NUL-padding")]
    BadCommand,

    #[error("inv/getdata entry count {0} exceeds the 50,000 cap")]
    TooManyInventoryItems(usize),

    #[error("truncated message body: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A block or transaction that fails consensus checks (spec.md §7, kind 2).
///
/// The offending block is rejected; the chain and store are left unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("Proof of work is bad")]
    BadProofOfWork,

    #[error("Difficulty target is bad")]
    BadDifficultyTarget,

    #[error("Unexpected change in difficulty")]
    UnexpectedDifficultyChange,

    #[error("Merkle root mismatch")]
    BadMerkleRoot,

    #[error("block header failed to parse")]
    MalformedHeader,

    #[error("transaction is not well-formed: {0}")]
    MalformedTransaction(String),
}

/// A failure in wallet bookkeeping.
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: i64, available: i64 },

    #[error("amount arithmetic overflowed")]
    AmountOverflow,

    #[error("no keys in keychain to receive change")]
    EmptyKeychain,

    #[error("stored key bytes do not decode to a valid secp256k1 secret key")]
    InvalidKey,

    #[error(transparent)]
    Serialization(#[from] bincode::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A failure reading or writing the persistent header store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("stored block {0} not found")]
    NotFound(String),

    #[error("chain head pointer is unset")]
    NoChainHead,

    #[error(transparent)]
    Backend(#[from] bincode::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Umbrella error for call sites (the CLI binary, the chain engine) that can
/// hit more than one failure domain.
#[derive(Error, Debug)]
pub enum PeerError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
