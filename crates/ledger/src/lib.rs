//! In-memory ledger node for local development and integration tests.
//!
//! Speaks the same JSON-RPC protocol as a production node, produces blocks
//! on a timer or on demand, and can inject transient failures and block
//! height lag.

mod config;
mod server;
mod state;

pub use config::LedgerConfig;
pub use server::{spawn, LedgerHandle};
pub use state::LedgerState;
