//! Per-account nonce allocation.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use vdr_types::{Address, VdrError, VdrResult};

#[derive(Default)]
struct AccountNonce {
    next: u64,
    leased: bool,
}

/// Hands out nonces one account at a time.
///
/// Each account has a single writer: while a [`NonceLease`] is outstanding,
/// another lease for the same account fails with `NonceConflict` instead of
/// waiting. A lease dropped without [`NonceLease::commit`] gives its nonce
/// back, so nonces stay gap-free.
#[derive(Clone, Default)]
pub struct NonceAllocator {
    accounts: Arc<Mutex<HashMap<Address, AccountNonce>>>,
}

impl NonceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the next nonce to what the ledger expects. Never lowers it.
    pub fn seed(&self, account: Address, ledger_next: u64) {
        let mut accounts = self.accounts.lock();
        let entry = accounts.entry(account).or_default();
        if !entry.leased && ledger_next > entry.next {
            debug!(%account, from = entry.next, to = ledger_next, "nonce raised from ledger");
            entry.next = ledger_next;
        }
    }

    /// Force the next nonce, e.g. after a prepared transaction was abandoned.
    pub fn reset(&self, account: Address, next: u64) -> VdrResult<()> {
        let mut accounts = self.accounts.lock();
        let entry = accounts.entry(account).or_default();
        if entry.leased {
            return Err(VdrError::nonce_conflict(
                account,
                "cannot reset while a build is in progress",
            ));
        }
        entry.next = next;
        Ok(())
    }

    pub fn peek(&self, account: &Address) -> u64 {
        self.accounts
            .lock()
            .get(account)
            .map_or(0, |entry| entry.next)
    }

    pub fn lease(&self, account: Address) -> VdrResult<NonceLease> {
        let mut accounts = self.accounts.lock();
        let entry = accounts.entry(account).or_default();
        if entry.leased {
            return Err(VdrError::nonce_conflict(
                account,
                "another transaction for this account is being built",
            ));
        }
        let nonce = entry.next;
        entry.next = nonce
            .checked_add(1)
            .ok_or_else(|| VdrError::nonce_conflict(account, "nonce space exhausted"))?;
        entry.leased = true;
        Ok(NonceLease {
            accounts: Arc::clone(&self.accounts),
            account,
            nonce,
            committed: false,
        })
    }
}

/// Exclusive claim on one nonce of one account.
pub struct NonceLease {
    accounts: Arc<Mutex<HashMap<Address, AccountNonce>>>,
    account: Address,
    nonce: u64,
    committed: bool,
}

impl NonceLease {
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn account(&self) -> &Address {
        &self.account
    }

    /// The nonce reached the ledger; keep it consumed.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for NonceLease {
    fn drop(&mut self) {
        let mut accounts = self.accounts.lock();
        if let Some(entry) = accounts.get_mut(&self.account) {
            entry.leased = false;
            if !self.committed && self.nonce.checked_add(1) == Some(entry.next) {
                debug!(account = %self.account, nonce = self.nonce, "nonce released");
                entry.next = self.nonce;
            }
        }
    }
}

impl std::fmt::Debug for NonceLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceLease")
            .field("account", &self.account)
            .field("nonce", &self.nonce)
            .field("committed", &self.committed)
            .finish()
    }
}
