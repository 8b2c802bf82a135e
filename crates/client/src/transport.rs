use crate::{ConnectionPool, LedgerEndpoint};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use vdr_codec::rpc::{RpcError, RpcRequest, RpcResponse};
use vdr_types::{VdrError, VdrResult};

/// Failure talking to the ledger node, before it is mapped onto
/// [`VdrError`].
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("http status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("rpc error {}: {}", .0.code, .0.message)]
    Rpc(RpcError),
    #[error("invalid response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Whether the same request may succeed if sent again.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Timeout | TransportError::Connect(_) => true,
            TransportError::Status { status, .. } => *status == 429 || *status >= 500,
            TransportError::Rpc(error) => error.is_busy(),
            TransportError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            TransportError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            TransportError::Connect(err.to_string())
        }
    }
}

impl From<TransportError> for VdrError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Rpc(error) => error.into_vdr_error(),
            TransportError::Decode(message) => {
                VdrError::MalformedRecord(format!("invalid node response: {message}"))
            }
            transient if transient.is_transient() => VdrError::NetworkTimeout(transient.to_string()),
            TransportError::Status { status, body } => VdrError::LedgerRejected {
                reason: format!("http {status}: {body}"),
            },
            other => VdrError::NetworkTimeout(other.to_string()),
        }
    }
}

/// One JSON-RPC round trip. Implementations perform a single attempt;
/// retries live in the client.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, request: &RpcRequest) -> Result<Value, TransportError>;
}

/// JSON-RPC over HTTP POST using pooled reqwest clients.
pub struct HttpTransport {
    endpoint: LedgerEndpoint,
    pool: ConnectionPool<reqwest::Client>,
}

impl HttpTransport {
    pub fn new(endpoint: LedgerEndpoint, pool_size: usize) -> VdrResult<Self> {
        let timeout = endpoint.request_timeout;
        // Each pooled client keeps at most one idle connection, so the pool
        // size bounds the sockets held open to the node.
        let pool = ConnectionPool::new(pool_size, move || {
            reqwest::Client::builder()
                .timeout(timeout)
                .pool_max_idle_per_host(1)
                .build()
                .map_err(|err| TransportError::Connect(err.to_string()))
        })
        .map_err(|err| VdrError::Config(err.to_string()))?;
        Ok(Self { endpoint, pool })
    }

    pub fn endpoint(&self) -> &LedgerEndpoint {
        &self.endpoint
    }

    pub fn pool(&self) -> &ConnectionPool<reqwest::Client> {
        &self.pool
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, request: &RpcRequest) -> Result<Value, TransportError> {
        let http = self.pool.checkout().await?;
        let response = http
            .post(self.endpoint.url.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: RpcResponse = response.json().await?;
        if let Some(error) = envelope.error {
            return Err(TransportError::Rpc(error));
        }
        envelope
            .result
            .ok_or_else(|| TransportError::Decode("response has neither result nor error".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdr_codec::rpc::codes;

    #[test]
    fn transient_classification() {
        assert!(TransportError::Timeout.is_transient());
        assert!(TransportError::Connect("refused".into()).is_transient());
        assert!(TransportError::Status {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(TransportError::Status {
            status: 429,
            body: String::new()
        }
        .is_transient());
        assert!(!TransportError::Status {
            status: 400,
            body: String::new()
        }
        .is_transient());
        assert!(TransportError::Rpc(RpcError::new(codes::BUSY, "busy")).is_transient());
        assert!(!TransportError::Rpc(RpcError::new(codes::REJECTED, "no")).is_transient());
    }

    #[test]
    fn rpc_errors_map_through_codes() {
        let err: VdrError =
            TransportError::Rpc(RpcError::new(codes::NOT_FOUND, "did:example:999")).into();
        assert_eq!(err, VdrError::NotFound("did:example:999".into()));

        let err: VdrError = TransportError::Timeout.into();
        assert!(matches!(err, VdrError::NetworkTimeout(_)));
    }
}
