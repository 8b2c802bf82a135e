use serde_json::{json, Value};
use vdr_ledger::{spawn, LedgerConfig};

async fn rpc(url: &str, method: &str, params: Value) -> (u16, Value) {
    let response = reqwest::Client::new()
        .post(url)
        .json(&json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params}))
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    let body = response.json::<Value>().await.unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn serves_chain_id_and_height() {
    let ledger = spawn(&LedgerConfig::ephemeral()).await.unwrap();
    let url = ledger.url();

    let (_, body) = rpc(&url, "vdr_chainId", Value::Null).await;
    assert_eq!(body["result"], 1337);

    ledger.mine_block();
    let (_, body) = rpc(&url, "vdr_blockNumber", Value::Null).await;
    assert_eq!(body["result"], 1);
    assert_eq!(ledger.request_count(), 2);

    ledger.shutdown().await;
}

#[tokio::test]
async fn unknown_method_and_bad_params_are_rpc_errors() {
    let ledger = spawn(&LedgerConfig::ephemeral()).await.unwrap();
    let url = ledger.url();

    let (status, body) = rpc(&url, "vdr_nope", Value::Null).await;
    assert_eq!(status, 200);
    assert_eq!(body["error"]["code"], -32601);

    let (_, body) = rpc(&url, "vdr_getRecord", json!({"did": "not-a-did"})).await;
    assert_eq!(body["error"]["code"], -32602);

    let (_, body) = rpc(&url, "vdr_getRecord", json!({"did": "did:example:999"})).await;
    assert_eq!(body["error"]["code"], -32001);

    ledger.shutdown().await;
}

#[tokio::test]
async fn injected_faults_are_consumed_in_order() {
    let ledger = spawn(&LedgerConfig::ephemeral()).await.unwrap();
    let url = ledger.url();
    ledger.fail_next_requests(1);
    ledger.busy_next_requests(1);

    let (status, _) = rpc(&url, "vdr_chainId", Value::Null).await;
    assert_eq!(status, 503);

    let (_, body) = rpc(&url, "vdr_chainId", Value::Null).await;
    assert_eq!(body["error"]["code"], -32005);

    let (_, body) = rpc(&url, "vdr_chainId", Value::Null).await;
    assert_eq!(body["result"], 1337);

    ledger.shutdown().await;
}

#[test]
fn block_producer_mines_on_schedule() {
    tokio_test::block_on(async {
        let config = LedgerConfig {
            block_time_ms: 20,
            ..LedgerConfig::ephemeral()
        };
        let ledger = spawn(&config).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(120)).await;
        let (_, body) = rpc(&ledger.url(), "vdr_blockNumber", Value::Null).await;
        assert!(body["result"].as_u64().unwrap() >= 2);
        ledger.shutdown().await;
    });
}
