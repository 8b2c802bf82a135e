//! Ledger access for the VDR registry: JSON-RPC over HTTP with retries, a
//! bounded connection pool, confirmation polling and in-flight tracking.

mod cancel;
mod client;
mod config;
mod pool;
mod retry;
mod tracker;
mod transport;

pub use cancel::CancellationToken;
pub use client::LedgerClient;
pub use config::{ClientConfig, LedgerEndpoint};
pub use pool::{ConnectionPool, PooledConnection};
pub use retry::{RetryMachine, RetryPolicy, RetryState, RetryStep};
pub use tracker::{TransactionTracker, RETAINED_RECEIPTS};
pub use transport::{HttpTransport, Transport, TransportError};
