//! Ledger state transitions, independent of the HTTP surface.

use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};
use vdr_codec::rpc::{
    codes, GetRecordResult, RpcError, SendTransactionResult, TransactionStatusResult, TxState,
};
use vdr_types::{Address, Did, OperationKind, Record, RecordStatus, Transaction};

struct TxEntry {
    tx: Transaction,
    state: TxState,
    accepted_block: u64,
    block_number: Option<u64>,
    reason: Option<String>,
    record: Option<Vec<u8>>,
}

/// Accounts, records and transactions of a single-node ledger.
///
/// Transactions are accepted into a pending queue and applied in
/// acceptance order when a block is produced. A transaction that fails to
/// apply is rejected but still consumes its nonce.
pub struct LedgerState {
    chain_id: u64,
    height: u64,
    block_lag: u64,
    records: HashMap<Did, Record>,
    nonces: HashMap<Address, u64>,
    txs: HashMap<String, TxEntry>,
    pending: VecDeque<String>,
}

impl LedgerState {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            height: 0,
            block_lag: 0,
            records: HashMap::new(),
            nonces: HashMap::new(),
            txs: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Height as reported to clients, lagging the real height when a lag is
    /// injected.
    pub fn block_number(&self) -> u64 {
        self.height.saturating_sub(self.block_lag)
    }

    pub fn set_block_lag(&mut self, lag: u64) {
        self.block_lag = lag;
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Next nonce for `address`, counting accepted transactions.
    pub fn transaction_count(&self, address: &Address) -> u64 {
        self.nonces.get(address).copied().unwrap_or(0)
    }

    pub fn submit(&mut self, encoded: &[u8]) -> Result<SendTransactionResult, RpcError> {
        let hash = vdr_codec::tx_hash(encoded);
        if let Some(entry) = self.txs.get(&hash) {
            debug!(%hash, "duplicate submission");
            return Ok(SendTransactionResult {
                hash,
                accepted_block: entry.accepted_block,
            });
        }

        let tx = vdr_codec::decode_transaction(encoded)
            .map_err(|err| RpcError::new(codes::INVALID_PARAMS, format!("invalid transaction: {err}")))?;
        if tx.chain_id() != self.chain_id {
            return Err(RpcError::new(
                codes::REJECTED,
                format!("wrong chain id {}, expected {}", tx.chain_id(), self.chain_id),
            ));
        }
        verify_signature(&tx)?;

        let expected = self.transaction_count(tx.from());
        if tx.nonce() < expected {
            return Err(RpcError::new(
                codes::NONCE_TOO_LOW,
                format!("nonce {} too low, next is {expected}", tx.nonce()),
            )
            .with_data(serde_json::json!({ "account": tx.from().to_string() })));
        }
        if tx.nonce() > expected {
            return Err(RpcError::new(
                codes::REJECTED,
                format!("nonce gap: expected {expected}, got {}", tx.nonce()),
            ));
        }

        self.nonces.insert(*tx.from(), expected + 1);
        self.pending.push_back(hash.clone());
        info!(%hash, kind = %tx.kind(), did = %tx.target(), nonce = tx.nonce(), "transaction accepted");
        self.txs.insert(
            hash.clone(),
            TxEntry {
                tx,
                state: TxState::Pending,
                accepted_block: self.height,
                block_number: None,
                reason: None,
                record: None,
            },
        );
        Ok(SendTransactionResult {
            hash,
            accepted_block: self.height,
        })
    }

    /// Produce a block applying every pending transaction.
    pub fn mine_block(&mut self) -> u64 {
        self.height += 1;
        let height = self.height;
        let mut confirmed = 0usize;
        while let Some(hash) = self.pending.pop_front() {
            let Some(entry) = self.txs.get(&hash) else {
                continue;
            };
            let outcome = apply(&self.records, &entry.tx);
            let Some(entry) = self.txs.get_mut(&hash) else {
                continue;
            };
            entry.block_number = Some(height);
            match outcome {
                Ok(record) => {
                    entry.state = TxState::Confirmed;
                    entry.record = vdr_codec::encode_record(&record).ok();
                    self.records.insert(record.id.clone(), record);
                    confirmed += 1;
                }
                Err(reason) => {
                    info!(%hash, %reason, "transaction rejected");
                    entry.state = TxState::Rejected;
                    entry.reason = Some(reason);
                }
            }
        }
        debug!(height, confirmed, "block produced");
        height
    }

    pub fn transaction_status(&self, hash: &str) -> Result<TransactionStatusResult, RpcError> {
        let entry = self
            .txs
            .get(hash)
            .ok_or_else(|| RpcError::new(codes::NOT_FOUND, format!("unknown transaction {hash}")))?;
        Ok(TransactionStatusResult {
            state: entry.state,
            block_number: entry.block_number,
            reason: entry.reason.clone(),
            record: entry.record.as_deref().map(vdr_codec::rpc::to_hex),
        })
    }

    pub fn record(&self, did: &Did, min_block: Option<u64>) -> Result<GetRecordResult, RpcError> {
        let observed = self.block_number();
        if let Some(required) = min_block {
            if required > observed {
                return Err(RpcError::stale(required, observed));
            }
        }
        let record = self
            .records
            .get(did)
            .ok_or_else(|| RpcError::new(codes::NOT_FOUND, did.to_string()))?;
        let encoded = vdr_codec::encode_record(record)
            .map_err(|err| RpcError::new(codes::INTERNAL, err.to_string()))?;
        Ok(GetRecordResult {
            record: vdr_codec::rpc::to_hex(&encoded),
            block_number: observed,
        })
    }
}

fn verify_signature(tx: &Transaction) -> Result<(), RpcError> {
    let signature = tx
        .signature()
        .ok_or_else(|| RpcError::new(codes::REJECTED, "transaction is not signed"))?;
    if signature.signer() != *tx.from() {
        return Err(RpcError::new(
            codes::REJECTED,
            format!("signature key does not control {}", tx.from()),
        ));
    }
    let message = vdr_codec::signing_bytes(tx)
        .map_err(|err| RpcError::new(codes::INVALID_PARAMS, err.to_string()))?;
    vdr_crypto::verify(signature, &message)
        .map_err(|_| RpcError::new(codes::REJECTED, "invalid signature"))
}

/// Validate a transaction against current records and return the record it
/// produces.
fn apply(records: &HashMap<Did, Record>, tx: &Transaction) -> Result<Record, String> {
    let proposed =
        vdr_codec::decode_record(tx.payload()).map_err(|err| format!("malformed payload: {err}"))?;
    if &proposed.id != tx.target() {
        return Err(format!(
            "payload id {} does not match target {}",
            proposed.id,
            tx.target()
        ));
    }

    let current = records.get(tx.target());
    match (tx.kind(), current) {
        (OperationKind::Register, Some(_)) => Err(format!("record {} already exists", tx.target())),
        (OperationKind::Register, None) => {
            if proposed.version != 1 || proposed.status != RecordStatus::Active {
                return Err("new record must be active at version 1".into());
            }
            if proposed.owner != *tx.from() {
                return Err("new record must be owned by the sender".into());
            }
            Ok(proposed)
        }
        (_, None) => Err(format!("record {} does not exist", tx.target())),
        (kind, Some(current)) => {
            if !current.is_active() {
                return Err(format!("record {} is revoked", current.id));
            }
            if current.owner != *tx.from() {
                return Err(format!("{} does not own {}", tx.from(), current.id));
            }
            if current.version.checked_add(1) != Some(proposed.version) {
                return Err(format!(
                    "version {} does not follow {}",
                    proposed.version, current.version
                ));
            }
            if proposed.owner != current.owner || proposed.kind != current.kind {
                return Err("owner and kind are immutable".into());
            }
            let expected_status = if kind == OperationKind::Revoke {
                RecordStatus::Revoked
            } else {
                RecordStatus::Active
            };
            if proposed.status != expected_status {
                return Err(format!("{kind} must leave the record {expected_status:?}"));
            }
            Ok(proposed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdr_crypto::{KeyHandle, KeyManager};
    use vdr_types::{RecordContent, RecordKind};

    const CHAIN: u64 = 1337;

    struct Signer {
        keys: KeyManager,
        handle: KeyHandle,
        address: Address,
    }

    impl Signer {
        fn new() -> Self {
            let keys = KeyManager::new();
            let handle = keys.generate();
            let address = keys.address(&handle).unwrap();
            Self {
                keys,
                handle,
                address,
            }
        }

        fn tx(&self, kind: OperationKind, record: &Record, nonce: u64) -> Vec<u8> {
            let mut tx = Transaction::new(
                kind,
                record.id.clone(),
                self.address,
                CHAIN,
                nonce,
                vdr_codec::encode_record(record).unwrap(),
            );
            let message = vdr_codec::signing_bytes(&tx).unwrap();
            tx.attach_signature(self.keys.sign(&self.handle, &message).unwrap())
                .unwrap();
            vdr_codec::encode_transaction(&tx).unwrap()
        }
    }

    fn record(owner: Address) -> Record {
        Record::new(
            Did::parse("did:example:123").unwrap(),
            RecordKind::DidDocument,
            owner,
            RecordContent::new(b"doc".to_vec()),
        )
    }

    #[test]
    fn register_then_revoke() {
        let signer = Signer::new();
        let mut ledger = LedgerState::new(CHAIN);
        let v1 = record(signer.address);

        let accepted = ledger.submit(&signer.tx(OperationKind::Register, &v1, 0)).unwrap();
        assert_eq!(
            ledger.transaction_status(&accepted.hash).unwrap().state,
            TxState::Pending
        );
        assert_eq!(ledger.transaction_count(&signer.address), 1);

        ledger.mine_block();
        let status = ledger.transaction_status(&accepted.hash).unwrap();
        assert_eq!(status.state, TxState::Confirmed);
        assert_eq!(status.block_number, Some(1));

        let v2 = v1.revoked().unwrap();
        let revoke = ledger.submit(&signer.tx(OperationKind::Revoke, &v2, 1)).unwrap();
        ledger.mine_block();
        assert_eq!(
            ledger.transaction_status(&revoke.hash).unwrap().state,
            TxState::Confirmed
        );

        let stored = ledger.record(&v1.id, None).unwrap();
        let decoded =
            vdr_codec::decode_record(&vdr_codec::rpc::from_hex(&stored.record).unwrap()).unwrap();
        assert_eq!(decoded, v2);
    }

    #[test]
    fn duplicate_submission_is_idempotent() {
        let signer = Signer::new();
        let mut ledger = LedgerState::new(CHAIN);
        let bytes = signer.tx(OperationKind::Register, &record(signer.address), 0);
        let first = ledger.submit(&bytes).unwrap();
        let second = ledger.submit(&bytes).unwrap();
        assert_eq!(first, second);
        assert_eq!(ledger.pending_count(), 1);
    }

    #[test]
    fn reused_nonce_is_too_low() {
        let signer = Signer::new();
        let mut ledger = LedgerState::new(CHAIN);
        let v1 = record(signer.address);
        ledger.submit(&signer.tx(OperationKind::Register, &v1, 0)).unwrap();

        let other = v1.updated(RecordContent::new(b"other".to_vec())).unwrap();
        let err = ledger.submit(&signer.tx(OperationKind::Update, &other, 0)).unwrap_err();
        assert_eq!(err.code, codes::NONCE_TOO_LOW);
    }

    #[test]
    fn duplicate_register_is_rejected_at_apply() {
        let signer = Signer::new();
        let mut ledger = LedgerState::new(CHAIN);
        let v1 = record(signer.address);
        ledger.submit(&signer.tx(OperationKind::Register, &v1, 0)).unwrap();
        let again = ledger.submit(&signer.tx(OperationKind::Register, &v1, 1)).unwrap();
        ledger.mine_block();

        let status = ledger.transaction_status(&again.hash).unwrap();
        assert_eq!(status.state, TxState::Rejected);
        assert!(status.reason.unwrap().contains("already exists"));
    }

    #[test]
    fn non_owner_update_is_rejected() {
        let owner = Signer::new();
        let intruder = Signer::new();
        let mut ledger = LedgerState::new(CHAIN);
        let v1 = record(owner.address);
        ledger.submit(&owner.tx(OperationKind::Register, &v1, 0)).unwrap();
        ledger.mine_block();

        let forged = v1.updated(RecordContent::new(b"forged".to_vec())).unwrap();
        let hash = ledger
            .submit(&intruder.tx(OperationKind::Update, &forged, 0))
            .unwrap()
            .hash;
        ledger.mine_block();
        assert_eq!(ledger.transaction_status(&hash).unwrap().state, TxState::Rejected);
    }

    #[test]
    fn tampered_signature_is_refused() {
        let signer = Signer::new();
        let mut ledger = LedgerState::new(CHAIN);
        let mut bytes = signer.tx(OperationKind::Register, &record(signer.address), 0);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let err = ledger.submit(&bytes).unwrap_err();
        assert_eq!(err.code, codes::REJECTED);
    }

    #[test]
    fn lagging_node_reports_stale_reads() {
        let signer = Signer::new();
        let mut ledger = LedgerState::new(CHAIN);
        let v1 = record(signer.address);
        ledger.submit(&signer.tx(OperationKind::Register, &v1, 0)).unwrap();
        ledger.mine_block();
        ledger.set_block_lag(1);

        assert_eq!(ledger.block_number(), 0);
        let err = ledger.record(&v1.id, Some(1)).unwrap_err();
        assert_eq!(err.code, codes::STALE);
        assert!(ledger.record(&v1.id, Some(0)).is_ok());
    }

    #[test]
    fn missing_record_is_not_found() {
        let ledger = LedgerState::new(CHAIN);
        let err = ledger
            .record(&Did::parse("did:example:999").unwrap(), None)
            .unwrap_err();
        assert_eq!(err.code, codes::NOT_FOUND);
    }
}
