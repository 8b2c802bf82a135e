use crate::{Address, Record};
use serde::{Deserialize, Serialize};

/// Acknowledgment that the ledger accepted a transaction for processing.
/// It says nothing about finality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// `0x`-prefixed keccak256 of the encoded signed transaction.
    pub tx_hash: String,
    pub from: Address,
    pub nonce: u64,
    /// `0x`-prefixed keccak256 of the transaction payload.
    pub payload_hash: String,
    /// Ledger height at the time the transaction was accepted.
    pub accepted_block: u64,
}

/// A transaction the ledger has included in a block, together with the
/// record state it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedTransaction {
    pub receipt: Receipt,
    pub block_number: u64,
    pub record: Record,
}
