use crate::retry::{self, RetryPolicy};
use crate::{CancellationToken, ClientConfig, HttpTransport, LedgerEndpoint, TransactionTracker, Transport};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use vdr_codec::rpc::{
    self, methods, AddressParams, GetRecordParams, GetRecordResult, HashParams, RpcRequest,
    SendTransactionParams, SendTransactionResult, TransactionStatusResult, TxState,
};
use vdr_types::{
    Address, ConfirmedTransaction, Did, Receipt, Record, Transaction, TransactionStatus,
    VdrError, VdrResult,
};

/// Client for a single ledger node.
pub struct LedgerClient {
    endpoint: LedgerEndpoint,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    poll_interval: Duration,
    tracker: TransactionTracker,
    next_id: AtomicU64,
}

impl LedgerClient {
    /// Build a client speaking JSON-RPC over HTTP to the configured node.
    pub fn new(config: &ClientConfig) -> VdrResult<Self> {
        config.validate()?;
        let endpoint = config.endpoint()?;
        let transport = HttpTransport::new(endpoint.clone(), config.pool_size)?;
        Ok(Self::with_transport(
            endpoint,
            Arc::new(transport),
            config.retry_policy(),
            config.poll_interval(),
        ))
    }

    /// Use a custom transport, e.g. an in-process test double.
    pub fn with_transport(
        endpoint: LedgerEndpoint,
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
        poll_interval: Duration,
    ) -> Self {
        Self {
            endpoint,
            transport,
            retry,
            poll_interval,
            tracker: TransactionTracker::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn endpoint(&self) -> &LedgerEndpoint {
        &self.endpoint
    }

    pub fn tracker(&self) -> &TransactionTracker {
        &self.tracker
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> VdrResult<T> {
        let request = RpcRequest::new(self.next_id.fetch_add(1, Ordering::Relaxed), method, params);
        let (transport, request) = (&self.transport, &request);
        let value = retry::run(self.retry, method, move || transport.call(request)).await?;
        serde_json::from_value(value).map_err(|err| {
            VdrError::MalformedRecord(format!("unexpected {method} result: {err}"))
        })
    }

    /// Chain id reported by the node.
    pub async fn chain_id(&self) -> VdrResult<u64> {
        self.call(methods::CHAIN_ID, Value::Null).await
    }

    pub async fn block_number(&self) -> VdrResult<u64> {
        self.call(methods::BLOCK_NUMBER, Value::Null).await
    }

    /// Next nonce the ledger expects from `address`, counting transactions
    /// it has accepted but not yet confirmed.
    pub async fn next_nonce(&self, address: &Address) -> VdrResult<u64> {
        let params = AddressParams {
            address: address.to_string(),
        };
        self.call(methods::GET_TRANSACTION_COUNT, json!(params)).await
    }

    /// Submit a signed transaction and return once the node has accepted it.
    pub async fn submit(&self, tx: &Transaction) -> VdrResult<Receipt> {
        if tx.signature().is_none() || tx.status() == TransactionStatus::Built {
            return Err(VdrError::InvalidOperation(
                "only signed transactions can be submitted".into(),
            ));
        }
        if tx.chain_id() != self.endpoint.chain_id {
            return Err(VdrError::InvalidOperation(format!(
                "transaction is for chain {}, endpoint serves chain {}",
                tx.chain_id(),
                self.endpoint.chain_id
            )));
        }

        let payload_hash = vdr_codec::payload_hash(tx.payload());
        if let Some(receipt) = self.tracker.check(tx.from(), tx.nonce(), &payload_hash)? {
            debug!(tx_hash = %receipt.tx_hash, "resubmission answered from tracker");
            return Ok(receipt);
        }

        let encoded = vdr_codec::encode_transaction(tx)?;
        let params = SendTransactionParams {
            tx: rpc::to_hex(&encoded),
        };
        let result: SendTransactionResult =
            self.call(methods::SEND_TRANSACTION, json!(params)).await?;

        let expected_hash = vdr_codec::tx_hash(&encoded);
        if result.hash != expected_hash {
            warn!(node = %result.hash, local = %expected_hash, "node reported a different tx hash");
        }
        let receipt = Receipt {
            tx_hash: expected_hash,
            from: *tx.from(),
            nonce: tx.nonce(),
            payload_hash,
            accepted_block: result.accepted_block,
        };
        self.tracker.record(&receipt);
        info!(
            tx_hash = %receipt.tx_hash,
            kind = %tx.kind(),
            did = %tx.target(),
            nonce = receipt.nonce,
            "transaction submitted"
        );
        Ok(receipt)
    }

    pub async fn transaction_status(&self, tx_hash: &str) -> VdrResult<TransactionStatusResult> {
        let params = HashParams {
            hash: tx_hash.to_string(),
        };
        self.call(methods::GET_TRANSACTION_STATUS, json!(params)).await
    }

    /// Poll until the transaction is final.
    ///
    /// Rejection yields `LedgerRejected` with the ledger's reason; running
    /// out of time or being cancelled yields `NetworkTimeout`. Giving up the
    /// wait leaves the transaction on the ledger.
    pub async fn await_confirmation(
        &self,
        receipt: &Receipt,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> VdrResult<ConfirmedTransaction> {
        let poll = async {
            loop {
                let status = self.transaction_status(&receipt.tx_hash).await?;
                match status.state {
                    TxState::Confirmed => return self.confirmed(receipt, status),
                    TxState::Rejected => {
                        let reason = status.reason.unwrap_or_default();
                        warn!(tx_hash = %receipt.tx_hash, %reason, "transaction rejected");
                        return Err(VdrError::LedgerRejected { reason });
                    }
                    TxState::Pending => {
                        debug!(tx_hash = %receipt.tx_hash, "transaction pending");
                        tokio::time::sleep(self.poll_interval).await;
                    }
                }
            }
        };

        tokio::select! {
            outcome = tokio::time::timeout(timeout, poll) => match outcome {
                Ok(result) => result,
                Err(_) => Err(VdrError::NetworkTimeout(format!(
                    "transaction {} not final after {timeout:?}",
                    receipt.tx_hash
                ))),
            },
            _ = wait_cancelled(cancel) => Err(VdrError::NetworkTimeout(format!(
                "wait for transaction {} cancelled",
                receipt.tx_hash
            ))),
        }
    }

    fn confirmed(
        &self,
        receipt: &Receipt,
        status: TransactionStatusResult,
    ) -> VdrResult<ConfirmedTransaction> {
        let block_number = status.block_number.ok_or_else(|| {
            VdrError::MalformedRecord("confirmed transaction without block number".into())
        })?;
        let raw = status.record.ok_or_else(|| {
            VdrError::MalformedRecord("confirmed transaction without record".into())
        })?;
        let record = decode_hex_record(&raw)?;
        info!(tx_hash = %receipt.tx_hash, block_number, version = record.version, "transaction confirmed");
        Ok(ConfirmedTransaction {
            receipt: receipt.clone(),
            block_number,
            record,
        })
    }

    /// Current record for `did`. With `min_block`, a node that has not yet
    /// reached that height answers `StaleRead`.
    pub async fn resolve(&self, did: &Did, min_block: Option<u64>) -> VdrResult<Record> {
        let params = GetRecordParams {
            did: did.to_string(),
            min_block,
        };
        let result: GetRecordResult = self.call(methods::GET_RECORD, json!(params)).await?;
        let record = decode_hex_record(&result.record)?;
        if &record.id != did {
            return Err(VdrError::MalformedRecord(format!(
                "asked for {did}, node returned {}",
                record.id
            )));
        }
        Ok(record)
    }
}

fn decode_hex_record(raw: &str) -> VdrResult<Record> {
    let bytes = rpc::from_hex(raw)
        .map_err(|err| VdrError::MalformedRecord(format!("record is not hex: {err}")))?;
    Ok(vdr_codec::decode_record(&bytes)?)
}

async fn wait_cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}
