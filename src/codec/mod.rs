//! Wire-format primitives shared by every layer above (message framing,
//! protocol messages, blocks, transactions).

pub mod primitives;

pub use primitives::{
    decode_compact, double_sha256, encode_compact, hash160, read_var_int, read_var_str,
    var_int_len, write_var_int, write_var_str, VarInt,
};
