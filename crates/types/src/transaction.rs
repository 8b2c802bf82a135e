use crate::{Address, Did, VdrError, VdrResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Registry operation carried by a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Register,
    Update,
    Revoke,
}

impl OperationKind {
    pub fn tag(self) -> u8 {
        match self {
            OperationKind::Register => 1,
            OperationKind::Update => 2,
            OperationKind::Revoke => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(OperationKind::Register),
            2 => Some(OperationKind::Update),
            3 => Some(OperationKind::Revoke),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            OperationKind::Register => "register",
            OperationKind::Update => "update",
            OperationKind::Revoke => "revoke",
        };
        f.write_str(value)
    }
}

/// Transaction lifecycle.
///
/// `Built -> Signed -> Submitted -> {Confirmed, Rejected, TimedOut}`. A
/// timed-out transaction is still pending on the ledger, so a later poll may
/// move it to `Confirmed` or `Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Built,
    Signed,
    Submitted,
    Confirmed,
    Rejected,
    TimedOut,
}

impl TransactionStatus {
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Built, Signed)
                | (Signed, Submitted)
                | (Submitted, Confirmed)
                | (Submitted, Rejected)
                | (Submitted, TimedOut)
                | (TimedOut, Confirmed)
                | (TimedOut, Rejected)
        )
    }

    pub fn is_final(self) -> bool {
        matches!(self, TransactionStatus::Confirmed | TransactionStatus::Rejected)
    }
}

/// Ed25519 signature together with the public key that produced it. The
/// ledger checks that the key hashes to the transaction sender.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub public_key: [u8; 32],
    pub bytes: [u8; 64],
}

impl Signature {
    pub fn signer(&self) -> Address {
        Address::from_public_key(&self.public_key)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("public_key", &hex::encode(self.public_key))
            .field("bytes", &hex::encode(&self.bytes[..8]))
            .finish()
    }
}

/// A registry write on its way to the ledger.
///
/// Fields are private: once signed, only the status may change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    kind: OperationKind,
    target: Did,
    from: Address,
    chain_id: u64,
    nonce: u64,
    payload: Vec<u8>,
    signature: Option<Signature>,
    status: TransactionStatus,
}

impl Transaction {
    /// Create an unsigned transaction in `Built` status.
    pub fn new(
        kind: OperationKind,
        target: Did,
        from: Address,
        chain_id: u64,
        nonce: u64,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            kind,
            target,
            from,
            chain_id,
            nonce,
            payload,
            signature: None,
            status: TransactionStatus::Built,
        }
    }

    /// Reassemble a transaction received over the wire. A signed transaction
    /// comes back in `Signed` status.
    pub fn from_parts(
        kind: OperationKind,
        target: Did,
        from: Address,
        chain_id: u64,
        nonce: u64,
        payload: Vec<u8>,
        signature: Option<Signature>,
    ) -> Self {
        let status = if signature.is_some() {
            TransactionStatus::Signed
        } else {
            TransactionStatus::Built
        };
        Self {
            kind,
            target,
            from,
            chain_id,
            nonce,
            payload,
            signature,
            status,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn target(&self) -> &Did {
        &self.target
    }

    pub fn from(&self) -> &Address {
        &self.from
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Attach a signature produced over the transaction's signing bytes.
    pub fn attach_signature(&mut self, signature: Signature) -> VdrResult<()> {
        if self.status != TransactionStatus::Built {
            return Err(VdrError::InvalidOperation(format!(
                "cannot sign a transaction in {:?} status",
                self.status
            )));
        }
        if signature.signer() != self.from {
            return Err(VdrError::SigningError(format!(
                "signing key controls {}, transaction is from {}",
                signature.signer(),
                self.from
            )));
        }
        self.signature = Some(signature);
        self.status = TransactionStatus::Signed;
        Ok(())
    }

    /// Advance the lifecycle. Illegal transitions are rejected.
    pub fn set_status(&mut self, next: TransactionStatus) -> VdrResult<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(VdrError::InvalidOperation(format!(
                "illegal transaction transition {:?} -> {:?}",
                self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }
}
