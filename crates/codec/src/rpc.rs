//! JSON-RPC 2.0 wire types shared by the ledger client and the development
//! ledger node.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vdr_types::VdrError;

pub const JSONRPC_VERSION: &str = "2.0";

pub mod methods {
    pub const CHAIN_ID: &str = "vdr_chainId";
    pub const BLOCK_NUMBER: &str = "vdr_blockNumber";
    pub const GET_TRANSACTION_COUNT: &str = "vdr_getTransactionCount";
    pub const SEND_TRANSACTION: &str = "vdr_sendTransaction";
    pub const GET_TRANSACTION_STATUS: &str = "vdr_getTransactionStatus";
    pub const GET_RECORD: &str = "vdr_getRecord";
}

pub mod codes {
    pub const NOT_FOUND: i64 = -32001;
    pub const NONCE_TOO_LOW: i64 = -32002;
    pub const REJECTED: i64 = -32003;
    pub const STALE: i64 = -32004;
    /// Node is overloaded; the request may be retried.
    pub const BUSY: i64 = -32005;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL: i64 = -32603;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn stale(required: u64, observed: u64) -> Self {
        Self::new(
            codes::STALE,
            format!("node at block {observed}, required {required}"),
        )
        .with_data(serde_json::json!({ "required": required, "observed": observed }))
    }

    pub fn is_busy(&self) -> bool {
        self.code == codes::BUSY
    }

    fn data_field<T: for<'de> Deserialize<'de>>(&self, field: &str) -> Option<T> {
        self.data
            .as_ref()
            .and_then(|data| data.get(field))
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Map a node error onto the client error taxonomy. `LedgerRejected`
    /// carries the node's message unchanged.
    pub fn into_vdr_error(self) -> VdrError {
        match self.code {
            codes::NOT_FOUND => VdrError::NotFound(self.message),
            codes::NONCE_TOO_LOW => {
                let account = self
                    .data_field::<String>("account")
                    .unwrap_or_else(|| "unknown".to_string());
                VdrError::NonceConflict {
                    account,
                    reason: self.message,
                }
            }
            codes::REJECTED => VdrError::LedgerRejected {
                reason: self.message,
            },
            codes::STALE => VdrError::StaleRead {
                required: self.data_field("required").unwrap_or_default(),
                observed: self.data_field("observed").unwrap_or_default(),
            },
            codes::BUSY => VdrError::NetworkTimeout(self.message),
            codes::INVALID_REQUEST | codes::METHOD_NOT_FOUND | codes::INVALID_PARAMS => {
                VdrError::InvalidOperation(self.message)
            }
            code => VdrError::LedgerRejected {
                reason: format!("rpc error {code}: {}", self.message),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressParams {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendTransactionParams {
    /// `0x`-prefixed hex of the encoded signed transaction.
    pub tx: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashParams {
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRecordParams {
    pub did: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_block: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTransactionResult {
    pub hash: String,
    pub accepted_block: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    Pending,
    Confirmed,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatusResult {
    pub state: TxState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    /// Raw rejection reason reported by the ledger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// `0x`-prefixed encoded record produced by a confirmed transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRecordResult {
    /// `0x`-prefixed encoded record.
    pub record: String,
    pub block_number: u64,
}

pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn from_hex(value: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(value.strip_prefix("0x").unwrap_or(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_keeps_raw_reason() {
        let err = RpcError::new(codes::REJECTED, "record already exists").into_vdr_error();
        assert_eq!(
            err,
            VdrError::LedgerRejected {
                reason: "record already exists".into()
            }
        );
    }

    #[test]
    fn stale_error_carries_heights() {
        let err = RpcError::stale(10, 4).into_vdr_error();
        assert_eq!(
            err,
            VdrError::StaleRead {
                required: 10,
                observed: 4
            }
        );
    }

    #[test]
    fn nonce_error_names_account() {
        let err = RpcError::new(codes::NONCE_TOO_LOW, "nonce 3 already used")
            .with_data(serde_json::json!({"account": "0xabc"}))
            .into_vdr_error();
        assert!(matches!(err, VdrError::NonceConflict { ref account, .. } if account == "0xabc"));
    }

    #[test]
    fn response_omits_absent_members() {
        let response = RpcResponse::success(Value::from(1), Value::from(7));
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["result"], 7);
    }

    #[test]
    fn hex_helpers_accept_optional_prefix() {
        assert_eq!(from_hex("0x0102").unwrap(), vec![1, 2]);
        assert_eq!(from_hex("0102").unwrap(), vec![1, 2]);
        assert_eq!(to_hex(&[0xff]), "0xff");
    }
}
