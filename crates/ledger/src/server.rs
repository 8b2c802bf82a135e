use crate::{LedgerConfig, LedgerState};
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use vdr_codec::rpc::{
    codes, methods, AddressParams, GetRecordParams, HashParams, RpcError, RpcRequest,
    RpcResponse, SendTransactionParams, JSONRPC_VERSION,
};
use vdr_types::{Address, Did};

/// Failures injected ahead of normal request handling.
#[derive(Default)]
struct Faults {
    unavailable: AtomicU32,
    busy: AtomicU32,
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

struct Shared {
    ledger: Mutex<LedgerState>,
    faults: Faults,
    requests: AtomicU64,
}

type SharedState = Arc<Shared>;

/// A running development ledger.
pub struct LedgerHandle {
    addr: SocketAddr,
    shared: SharedState,
    shutdown: watch::Sender<bool>,
    server: JoinHandle<()>,
    producer: Option<JoinHandle<()>>,
}

impl LedgerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// JSON-RPC endpoint URL.
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn chain_id(&self) -> u64 {
        self.shared.ledger.lock().chain_id()
    }

    pub fn mine_block(&self) -> u64 {
        self.shared.ledger.lock().mine_block()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.ledger.lock().pending_count()
    }

    /// Answer the next `n` requests with HTTP 503.
    pub fn fail_next_requests(&self, n: u32) {
        self.shared.faults.unavailable.store(n, Ordering::SeqCst);
    }

    /// Answer the next `n` requests with the node-busy RPC error.
    pub fn busy_next_requests(&self, n: u32) {
        self.shared.faults.busy.store(n, Ordering::SeqCst);
    }

    /// Report a block height `lag` blocks behind the real one.
    pub fn set_block_lag(&self, lag: u64) {
        self.shared.ledger.lock().set_block_lag(lag);
    }

    /// Number of JSON-RPC requests received so far, including failed ones.
    pub fn request_count(&self) -> u64 {
        self.shared.requests.load(Ordering::SeqCst)
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Some(producer) = self.producer {
            producer.abort();
        }
        let _ = self.server.await;
    }
}

/// Bind the configured address and serve in the background.
pub async fn spawn(config: &LedgerConfig) -> Result<LedgerHandle> {
    let listener = bind_listener(&config.listen_addr).await?;
    let addr = listener.local_addr()?;
    let shared = Arc::new(Shared {
        ledger: Mutex::new(LedgerState::new(config.chain_id)),
        faults: Faults::default(),
        requests: AtomicU64::new(0),
    });

    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let app = build_router(Arc::clone(&shared));
    let server = tokio::spawn(async move {
        let graceful = async move {
            let _ = shutdown_rx.changed().await;
        };
        if let Err(err) = axum::serve(listener, app)
            .with_graceful_shutdown(graceful)
            .await
        {
            warn!(error = %err, "ledger server terminated unexpectedly");
        }
    });

    let producer = config.block_time().map(|block_time| {
        let shared = Arc::clone(&shared);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(block_time);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                shared.ledger.lock().mine_block();
            }
        })
    });

    info!(%addr, chain_id = config.chain_id, "development ledger listening");
    Ok(LedgerHandle {
        addr,
        shared,
        shutdown,
        server,
        producer,
    })
}

async fn bind_listener(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind ledger listener on {addr}"))
}

fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", post(handle_rpc))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_health(State(state): State<SharedState>) -> Json<Value> {
    let ledger = state.ledger.lock();
    Json(serde_json::json!({
        "status": "ok",
        "chainId": ledger.chain_id(),
        "blockNumber": ledger.block_number(),
    }))
}

async fn handle_rpc(State(state): State<SharedState>, Json(body): Json<Value>) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    let id = body.get("id").cloned().unwrap_or(Value::Null);

    if take_one(&state.faults.unavailable) {
        debug!("injected unavailable response");
        return (StatusCode::SERVICE_UNAVAILABLE, "injected failure").into_response();
    }
    if take_one(&state.faults.busy) {
        let error = RpcError::new(codes::BUSY, "node busy");
        return Json(RpcResponse::failure(id, error)).into_response();
    }

    let request: RpcRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(err) => {
            let error = RpcError::new(codes::INVALID_REQUEST, err.to_string());
            return Json(RpcResponse::failure(id, error)).into_response();
        }
    };
    if request.jsonrpc != JSONRPC_VERSION {
        let error = RpcError::new(codes::INVALID_REQUEST, "jsonrpc must be \"2.0\"");
        return Json(RpcResponse::failure(id, error)).into_response();
    }

    let response = match dispatch(&state, &request) {
        Ok(result) => RpcResponse::success(id, result),
        Err(error) => {
            debug!(method = %request.method, code = error.code, message = %error.message, "rpc error");
            RpcResponse::failure(id, error)
        }
    };
    Json(response).into_response()
}

fn dispatch(state: &Shared, request: &RpcRequest) -> Result<Value, RpcError> {
    match request.method.as_str() {
        methods::CHAIN_ID => Ok(Value::from(state.ledger.lock().chain_id())),
        methods::BLOCK_NUMBER => Ok(Value::from(state.ledger.lock().block_number())),
        methods::GET_TRANSACTION_COUNT => {
            let params: AddressParams = params(request)?;
            let address: Address = params
                .address
                .parse()
                .map_err(|err| invalid_params(format!("invalid address: {err}")))?;
            Ok(Value::from(state.ledger.lock().transaction_count(&address)))
        }
        methods::SEND_TRANSACTION => {
            let params: SendTransactionParams = params(request)?;
            let bytes = vdr_codec::rpc::from_hex(&params.tx)
                .map_err(|err| invalid_params(format!("tx is not hex: {err}")))?;
            let result = state.ledger.lock().submit(&bytes)?;
            to_value(result)
        }
        methods::GET_TRANSACTION_STATUS => {
            let params: HashParams = params(request)?;
            let result = state.ledger.lock().transaction_status(&params.hash)?;
            to_value(result)
        }
        methods::GET_RECORD => {
            let params: GetRecordParams = params(request)?;
            let did = Did::parse(params.did).map_err(|err| invalid_params(err.to_string()))?;
            let result = state.ledger.lock().record(&did, params.min_block)?;
            to_value(result)
        }
        other => Err(RpcError::new(
            codes::METHOD_NOT_FOUND,
            format!("unknown method {other}"),
        )),
    }
}

fn params<T: DeserializeOwned>(request: &RpcRequest) -> Result<T, RpcError> {
    serde_json::from_value(request.params.clone()).map_err(|err| invalid_params(err.to_string()))
}

fn invalid_params(message: impl Into<String>) -> RpcError {
    RpcError::new(codes::INVALID_PARAMS, message)
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|err| RpcError::new(codes::INTERNAL, err.to_string()))
}
