use std::sync::Arc;
use std::time::Duration;
use vdr_client::{
    CancellationToken, ClientConfig, HttpTransport, LedgerClient, Transport,
};
use vdr_codec::rpc::{methods, RpcRequest};
use vdr_crypto::{KeyHandle, KeyManager};
use vdr_ledger::{spawn, LedgerConfig, LedgerHandle};
use vdr_types::{
    Address, Did, OperationKind, Record, RecordContent, RecordKind, RecordStatus, Transaction,
    VdrError,
};

struct Harness {
    ledger: LedgerHandle,
    client: LedgerClient,
    keys: KeyManager,
    key: KeyHandle,
    address: Address,
}

fn client_config(url: String, attempts: u32) -> ClientConfig {
    ClientConfig {
        endpoint_url: url,
        retry_max_attempts: attempts,
        retry_backoff_base_ms: 1,
        retry_backoff_max_ms: 5,
        poll_interval_ms: 10,
        ..ClientConfig::default()
    }
}

async fn harness(attempts: u32) -> Harness {
    let ledger = spawn(&LedgerConfig::ephemeral()).await.unwrap();
    let client = LedgerClient::new(&client_config(ledger.url(), attempts)).unwrap();
    let keys = KeyManager::new();
    let key = keys.generate();
    let address = keys.address(&key).unwrap();
    Harness {
        ledger,
        client,
        keys,
        key,
        address,
    }
}

impl Harness {
    fn signed(&self, kind: OperationKind, record: &Record, nonce: u64) -> Transaction {
        let mut tx = Transaction::new(
            kind,
            record.id.clone(),
            self.address,
            1337,
            nonce,
            vdr_codec::encode_record(record).unwrap(),
        );
        let message = vdr_codec::signing_bytes(&tx).unwrap();
        tx.attach_signature(self.keys.sign(&self.key, &message).unwrap())
            .unwrap();
        tx
    }

    fn record(&self, id: &str) -> Record {
        Record::new(
            Did::parse(id).unwrap(),
            RecordKind::Schema,
            self.address,
            RecordContent::json(&serde_json::json!({"name": "schema-v1"})),
        )
    }
}

#[tokio::test]
async fn submit_confirm_and_resolve() {
    let h = harness(5).await;
    assert_eq!(h.client.chain_id().await.unwrap(), 1337);
    assert_eq!(h.client.next_nonce(&h.address).await.unwrap(), 0);

    let record = h.record("did:example:123");
    let receipt = h
        .client
        .submit(&h.signed(OperationKind::Register, &record, 0))
        .await
        .unwrap();
    assert_eq!(receipt.nonce, 0);
    assert_eq!(h.client.next_nonce(&h.address).await.unwrap(), 1);

    h.ledger.mine_block();
    let confirmed = h
        .client
        .await_confirmation(&receipt, Duration::from_secs(2), None)
        .await
        .unwrap();
    assert_eq!(confirmed.block_number, 1);
    assert_eq!(confirmed.record, record);

    let resolved = h.client.resolve(&record.id, Some(1)).await.unwrap();
    assert_eq!(resolved.version, 1);
    assert_eq!(resolved.status, RecordStatus::Active);
}

#[tokio::test]
async fn missing_record_is_not_found() {
    let h = harness(5).await;
    let err = h
        .client
        .resolve(&Did::parse("did:example:999").unwrap(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, VdrError::NotFound(_)));
}

#[tokio::test]
async fn lagging_node_gives_stale_read() {
    let h = harness(5).await;
    let record = h.record("did:example:lag");
    let receipt = h
        .client
        .submit(&h.signed(OperationKind::Register, &record, 0))
        .await
        .unwrap();
    h.ledger.mine_block();
    h.client
        .await_confirmation(&receipt, Duration::from_secs(2), None)
        .await
        .unwrap();

    h.ledger.set_block_lag(1);
    let err = h.client.resolve(&record.id, Some(1)).await.unwrap_err();
    assert_eq!(
        err,
        VdrError::StaleRead {
            required: 1,
            observed: 0
        }
    );
}

#[tokio::test]
async fn transient_failures_recover_within_budget() {
    let h = harness(5).await;
    h.ledger.fail_next_requests(2);
    h.ledger.busy_next_requests(1);
    assert_eq!(h.client.block_number().await.unwrap(), 0);
    assert_eq!(h.ledger.request_count(), 4);
}

#[tokio::test]
async fn exhausted_retries_are_network_timeout() {
    let h = harness(3).await;
    h.ledger.fail_next_requests(10);
    let err = h.client.block_number().await.unwrap_err();
    assert!(matches!(err, VdrError::NetworkTimeout(_)));
    assert_eq!(h.ledger.request_count(), 3);
}

#[tokio::test]
async fn permanent_errors_are_not_retried() {
    let h = harness(5).await;
    let record = h.record("did:example:gap");
    let err = h
        .client
        .submit(&h.signed(OperationKind::Register, &record, 7))
        .await
        .unwrap_err();
    assert!(matches!(err, VdrError::LedgerRejected { ref reason } if reason.contains("nonce gap")));
    assert_eq!(h.ledger.request_count(), 1);
}

#[tokio::test]
async fn identical_resubmission_is_answered_locally() {
    let h = harness(5).await;
    let tx = h.signed(OperationKind::Register, &h.record("did:example:dup"), 0);
    let first = h.client.submit(&tx).await.unwrap();
    let requests = h.ledger.request_count();

    let second = h.client.submit(&tx).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(h.ledger.request_count(), requests);
    assert_eq!(h.ledger.pending_count(), 1);
}

#[tokio::test]
async fn stale_nonce_conflicts_before_network() {
    let h = harness(5).await;
    let record = h.record("did:example:conflict");
    h.client
        .submit(&h.signed(OperationKind::Register, &record, 0))
        .await
        .unwrap();
    let requests = h.ledger.request_count();

    let other = h.signed(
        OperationKind::Register,
        &h.record("did:example:other"),
        0,
    );
    let err = h.client.submit(&other).await.unwrap_err();
    assert!(matches!(err, VdrError::NonceConflict { .. }));
    assert_eq!(h.ledger.request_count(), requests);
}

#[tokio::test]
async fn unsigned_transactions_are_refused() {
    let h = harness(5).await;
    let record = h.record("did:example:unsigned");
    let tx = Transaction::new(
        OperationKind::Register,
        record.id.clone(),
        h.address,
        1337,
        0,
        vdr_codec::encode_record(&record).unwrap(),
    );
    assert!(matches!(
        h.client.submit(&tx).await,
        Err(VdrError::InvalidOperation(_))
    ));
    assert_eq!(h.ledger.request_count(), 0);
}

#[tokio::test]
async fn confirmation_wait_times_out_then_completes() {
    let h = harness(5).await;
    let receipt = h
        .client
        .submit(&h.signed(OperationKind::Register, &h.record("did:example:slow"), 0))
        .await
        .unwrap();

    let err = h
        .client
        .await_confirmation(&receipt, Duration::from_millis(60), None)
        .await
        .unwrap_err();
    assert!(matches!(err, VdrError::NetworkTimeout(_)));

    h.ledger.mine_block();
    let confirmed = h
        .client
        .await_confirmation(&receipt, Duration::from_secs(2), None)
        .await
        .unwrap();
    assert_eq!(confirmed.record.version, 1);
}

#[tokio::test]
async fn cancelled_wait_leaves_transaction_pending() {
    let h = harness(5).await;
    let receipt = h
        .client
        .submit(&h.signed(OperationKind::Register, &h.record("did:example:cancel"), 0))
        .await
        .unwrap();

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        canceller.cancel();
    });
    let err = h
        .client
        .await_confirmation(&receipt, Duration::from_secs(10), Some(&token))
        .await
        .unwrap_err();
    assert!(matches!(err, VdrError::NetworkTimeout(ref msg) if msg.contains("cancelled")));
    assert_eq!(h.ledger.pending_count(), 1);
}

#[tokio::test]
async fn rejected_transaction_carries_ledger_reason() {
    let h = harness(5).await;
    let record = h.record("did:example:twice");
    h.client
        .submit(&h.signed(OperationKind::Register, &record, 0))
        .await
        .unwrap();
    let again = h
        .client
        .submit(&h.signed(OperationKind::Register, &record, 1))
        .await
        .unwrap();
    h.ledger.mine_block();

    let err = h
        .client
        .await_confirmation(&again, Duration::from_secs(2), None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        VdrError::LedgerRejected {
            reason: "record did:example:twice already exists".into()
        }
    );
}

#[tokio::test]
async fn failed_call_returns_pooled_connection() {
    let ledger = spawn(&LedgerConfig::ephemeral()).await.unwrap();
    let config = client_config(ledger.url(), 1);
    let transport = Arc::new(HttpTransport::new(config.endpoint().unwrap(), 2).unwrap());

    ledger.fail_next_requests(1);
    let request = RpcRequest::new(1, methods::BLOCK_NUMBER, serde_json::Value::Null);
    assert!(transport.call(&request).await.is_err());
    assert_eq!(transport.pool().available(), 2);
    assert_eq!(transport.pool().idle(), 1);

    assert!(transport.call(&request).await.is_ok());
    assert_eq!(transport.pool().idle(), 1);
}
