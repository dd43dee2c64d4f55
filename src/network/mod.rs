//! Message framing, typed protocol messages, and the threaded peer
//! connection (spec.md §4.2, §4.3, §5).

pub mod connection;
pub mod framing;
pub mod protocol;

pub use connection::{Connection, MessageHandler};
pub use protocol::Message;
