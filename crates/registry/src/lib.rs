//! Registry facade for DID documents and AnonCreds objects on a VDR ledger.
//!
//! Writes go builder -> key manager -> ledger client; reads go straight to
//! the ledger client. Along with [`Registry`], this crate re-exports the
//! record codec, which is the stable surface foreign-language bindings wrap.

mod anoncreds;
pub mod builder;
pub mod facade;
pub mod nonce;

pub use builder::{check_legal, BuiltTransaction, TransactionBuilder};
pub use facade::{PreparedTransaction, Registry, RegistryOperation};
pub use nonce::{NonceAllocator, NonceLease};

pub use vdr_client::{CancellationToken, ClientConfig};
pub use vdr_crypto::{Capabilities, KeyHandle, KeyManager};
pub use vdr_types::anoncreds::{
    Accumulator, CredentialDefinition, RegistryObject, RevocationRegistryEntry, Schema,
};
pub use vdr_types::{
    Address, Did, Record, RecordContent, RecordKind, RecordStatus, Transaction, VdrError,
    VdrResult,
};

/// Encode a record into its canonical bytes.
pub fn encode_record(record: &Record) -> VdrResult<Vec<u8>> {
    Ok(vdr_codec::encode_record(record)?)
}

/// Decode canonical record bytes. Any layout mismatch is `MalformedRecord`.
pub fn decode_record(bytes: &[u8]) -> VdrResult<Record> {
    Ok(vdr_codec::decode_record(bytes)?)
}
