//! Turns a proposed record state into an unsigned ledger transaction.

use crate::nonce::{NonceAllocator, NonceLease};
use tracing::debug;
use vdr_types::{
    Address, Did, OperationKind, Record, RecordStatus, Transaction, VdrError, VdrResult,
};

/// Check that `kind` may be applied to a record in state `current`.
pub fn check_legal(kind: OperationKind, target: &Did, current: Option<RecordStatus>) -> VdrResult<()> {
    match (kind, current) {
        (OperationKind::Register, None) => Ok(()),
        (OperationKind::Register, Some(_)) => Err(VdrError::InvalidOperation(format!(
            "{target} is already registered"
        ))),
        (_, None) => Err(VdrError::InvalidOperation(format!(
            "cannot {kind} {target}: no such record"
        ))),
        (_, Some(RecordStatus::Revoked)) => Err(VdrError::InvalidOperation(format!(
            "cannot {kind} {target}: record is revoked"
        ))),
        (_, Some(RecordStatus::Active)) => Ok(()),
    }
}

/// An unsigned transaction together with the nonce it holds.
///
/// Dropping it without [`commit`](BuiltTransaction::commit) hands the
/// nonce back to the allocator.
#[derive(Debug)]
pub struct BuiltTransaction {
    transaction: Transaction,
    lease: NonceLease,
}

impl BuiltTransaction {
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn transaction_mut(&mut self) -> &mut Transaction {
        &mut self.transaction
    }

    pub fn nonce(&self) -> u64 {
        self.lease.nonce()
    }

    pub fn signing_bytes(&self) -> VdrResult<Vec<u8>> {
        Ok(vdr_codec::signing_bytes(&self.transaction)?)
    }

    /// Keep the nonce consumed and release the transaction.
    pub fn commit(self) -> Transaction {
        self.lease.commit();
        self.transaction
    }

    pub fn into_parts(self) -> (Transaction, NonceLease) {
        (self.transaction, self.lease)
    }
}

pub struct TransactionBuilder {
    chain_id: u64,
    nonces: NonceAllocator,
}

impl TransactionBuilder {
    pub fn new(chain_id: u64) -> Self {
        Self::with_allocator(chain_id, NonceAllocator::new())
    }

    pub fn with_allocator(chain_id: u64, nonces: NonceAllocator) -> Self {
        Self { chain_id, nonces }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn nonces(&self) -> &NonceAllocator {
        &self.nonces
    }

    /// Build an unsigned transaction that moves `target` to `proposed`.
    ///
    /// Legality is checked before a nonce is taken, so a refused build
    /// leaves the account's nonce untouched.
    pub fn build(
        &self,
        kind: OperationKind,
        target: &Did,
        proposed: &Record,
        current: Option<RecordStatus>,
        account: Address,
    ) -> VdrResult<BuiltTransaction> {
        check_legal(kind, target, current)?;
        if &proposed.id != target {
            return Err(VdrError::InvalidOperation(format!(
                "payload is for {}, transaction targets {target}",
                proposed.id
            )));
        }
        let payload = vdr_codec::encode_record(proposed)?;

        let lease = self.nonces.lease(account)?;
        let transaction = Transaction::new(
            kind,
            target.clone(),
            account,
            self.chain_id,
            lease.nonce(),
            payload,
        );
        debug!(%kind, did = %target, %account, nonce = lease.nonce(), "transaction built");
        Ok(BuiltTransaction { transaction, lease })
    }
}
