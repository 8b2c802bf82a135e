//! Binary encoding of registry records and transactions, plus the JSON-RPC
//! envelope shared by the client and the development ledger.
//!
//! All integers are big-endian and variable-length fields are length
//! prefixed, so a given value always encodes to the same bytes.

mod error;
mod hash;
mod wire;
mod record;
pub mod rpc;
mod transaction;

pub use error::CodecError;
pub use hash::{keccak256, payload_hash, tx_hash};
pub use record::{decode_record, encode_record, RECORD_FORMAT};
pub use transaction::{
    decode_transaction, encode_transaction, signing_bytes, SIGNING_DOMAIN, TRANSACTION_FORMAT,
};
