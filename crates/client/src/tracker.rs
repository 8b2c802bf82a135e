use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use vdr_types::{Address, Receipt, VdrError, VdrResult};

/// Receipts kept per account, counting back from the highest accepted nonce.
pub const RETAINED_RECEIPTS: u64 = 64;

#[derive(Default)]
struct AccountLog {
    highest_nonce: Option<u64>,
    receipts: BTreeMap<u64, Receipt>,
}

/// Remembers which `(account, nonce)` pairs this client already got
/// accepted by the ledger, so resubmissions are answered locally.
///
/// Only the last [`RETAINED_RECEIPTS`] nonces of an account keep their
/// receipt. Older nonces are still refused as stale through the high-water
/// mark.
#[derive(Default)]
pub struct TransactionTracker {
    accounts: Mutex<HashMap<Address, AccountLog>>,
}

impl TransactionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a submission before it goes to the network.
    ///
    /// Returns the original receipt for an identical resubmission and
    /// `NonceConflict` for a different payload under a nonce this client has
    /// already used.
    pub fn check(
        &self,
        from: &Address,
        nonce: u64,
        payload_hash: &str,
    ) -> VdrResult<Option<Receipt>> {
        let accounts = self.accounts.lock();
        let Some(log) = accounts.get(from) else {
            return Ok(None);
        };
        if let Some(receipt) = log.receipts.get(&nonce) {
            if receipt.payload_hash == payload_hash {
                return Ok(Some(receipt.clone()));
            }
            return Err(VdrError::nonce_conflict(
                from,
                format!("nonce {nonce} already carries payload {}", receipt.payload_hash),
            ));
        }
        match log.highest_nonce {
            Some(highest) if nonce <= highest => Err(VdrError::nonce_conflict(
                from,
                format!("nonce {nonce} is stale, {highest} already accepted"),
            )),
            _ => Ok(None),
        }
    }

    pub fn record(&self, receipt: &Receipt) {
        let mut accounts = self.accounts.lock();
        let log = accounts.entry(receipt.from).or_default();
        let highest = log.highest_nonce.map_or(receipt.nonce, |n| n.max(receipt.nonce));
        log.highest_nonce = Some(highest);
        log.receipts.insert(receipt.nonce, receipt.clone());

        let floor = highest.saturating_sub(RETAINED_RECEIPTS - 1);
        if log.receipts.first_key_value().is_some_and(|(&oldest, _)| oldest < floor) {
            log.receipts = log.receipts.split_off(&floor);
        }
    }

    pub fn lookup(&self, from: &Address, nonce: u64) -> Option<Receipt> {
        self.accounts
            .lock()
            .get(from)
            .and_then(|log| log.receipts.get(&nonce).cloned())
    }
}
