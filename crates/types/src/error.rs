//! Error taxonomy shared by every VDR crate.

use thiserror::Error;

/// Every public registry operation fails with exactly one of these kinds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VdrError {
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("signing error: {0}")]
    SigningError(String),

    #[error("nonce conflict for {account}: {reason}")]
    NonceConflict { account: String, reason: String },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("unauthorized: {account} does not own {did}")]
    Unauthorized { did: String, account: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("stale read: node is at block {observed}, required at least {required}")]
    StaleRead { required: u64, observed: u64 },

    #[error("network timeout: {0}")]
    NetworkTimeout(String),

    #[error("ledger rejected transaction: {reason}")]
    LedgerRejected { reason: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl VdrError {
    pub fn nonce_conflict(account: impl ToString, reason: impl Into<String>) -> Self {
        VdrError::NonceConflict {
            account: account.to_string(),
            reason: reason.into(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        VdrError::LedgerRejected {
            reason: reason.into(),
        }
    }

    /// Stable machine-readable name of the error kind, used by the CLI and
    /// by foreign-language wrappers that map kinds to exception classes.
    pub fn kind(&self) -> &'static str {
        match self {
            VdrError::MalformedRecord(_) => "MalformedRecord",
            VdrError::KeyNotFound(_) => "KeyNotFound",
            VdrError::SigningError(_) => "SigningError",
            VdrError::NonceConflict { .. } => "NonceConflict",
            VdrError::InvalidOperation(_) => "InvalidOperation",
            VdrError::Unauthorized { .. } => "Unauthorized",
            VdrError::NotFound(_) => "NotFound",
            VdrError::StaleRead { .. } => "StaleRead",
            VdrError::NetworkTimeout(_) => "NetworkTimeout",
            VdrError::LedgerRejected { .. } => "LedgerRejected",
            VdrError::Config(_) => "Config",
        }
    }
}

pub type VdrResult<T> = std::result::Result<T, VdrError>;
