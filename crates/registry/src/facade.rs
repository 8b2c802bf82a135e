//! High-level registry operations composed from the builder, the key
//! manager and the ledger client.

use crate::builder::TransactionBuilder;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use vdr_client::{CancellationToken, ClientConfig, LedgerClient};
use vdr_crypto::{KeyHandle, KeyManager};
use vdr_types::{
    Address, Did, OperationKind, Record, RecordContent, RecordKind, Receipt, Transaction,
    TransactionStatus, VdrError, VdrResult,
};

/// Requested change to a record, used for detached signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryOperation {
    Register {
        kind: RecordKind,
        content: RecordContent,
    },
    Update {
        content: RecordContent,
    },
    Revoke,
}

impl RegistryOperation {
    pub fn kind(&self) -> OperationKind {
        match self {
            RegistryOperation::Register { .. } => OperationKind::Register,
            RegistryOperation::Update { .. } => OperationKind::Update,
            RegistryOperation::Revoke => OperationKind::Revoke,
        }
    }
}

/// Transaction awaiting an external signature.
#[derive(Debug, Clone)]
pub struct PreparedTransaction {
    pub transaction: Transaction,
    pub signing_bytes: Vec<u8>,
}

pub struct Registry {
    client: Arc<LedgerClient>,
    keys: KeyManager,
    builder: TransactionBuilder,
    confirmation_timeout: Duration,
}

impl Registry {
    pub fn new(config: &ClientConfig, keys: KeyManager) -> VdrResult<Self> {
        let client = LedgerClient::new(config)?;
        Ok(Self::with_client(
            Arc::new(client),
            keys,
            config.confirmation_timeout(),
        ))
    }

    pub fn with_client(
        client: Arc<LedgerClient>,
        keys: KeyManager,
        confirmation_timeout: Duration,
    ) -> Self {
        let builder = TransactionBuilder::new(client.endpoint().chain_id);
        Self {
            client,
            keys,
            builder,
            confirmation_timeout,
        }
    }

    pub fn client(&self) -> &LedgerClient {
        &self.client
    }

    pub fn keys(&self) -> &KeyManager {
        &self.keys
    }

    pub fn builder(&self) -> &TransactionBuilder {
        &self.builder
    }

    /// Create a new record owned by the signer's address.
    pub async fn register(
        &self,
        did: &Did,
        kind: RecordKind,
        content: RecordContent,
        signer: &KeyHandle,
    ) -> VdrResult<Record> {
        let account = self.keys.address(signer)?;
        let current = self.lookup(did).await?;
        let proposed = Record::new(did.clone(), kind, account, content);
        self.write(OperationKind::Register, did, proposed, current.as_ref(), signer, account)
            .await
    }

    pub async fn resolve(&self, did: &Did) -> VdrResult<Record> {
        self.client.resolve(did, None).await
    }

    /// Resolve from a node that has reached at least `min_block`.
    pub async fn resolve_at(&self, did: &Did, min_block: u64) -> VdrResult<Record> {
        self.client.resolve(did, Some(min_block)).await
    }

    pub async fn update(
        &self,
        did: &Did,
        content: RecordContent,
        signer: &KeyHandle,
    ) -> VdrResult<Record> {
        let account = self.keys.address(signer)?;
        let current = self.client.resolve(did, None).await?;
        authorize(&current, &account)?;
        let proposed = current.updated(content)?;
        self.write(OperationKind::Update, did, proposed, Some(&current), signer, account)
            .await
    }

    pub async fn revoke(&self, did: &Did, signer: &KeyHandle) -> VdrResult<Record> {
        let account = self.keys.address(signer)?;
        let current = self.client.resolve(did, None).await?;
        authorize(&current, &account)?;
        let proposed = current.revoked()?;
        self.write(OperationKind::Revoke, did, proposed, Some(&current), signer, account)
            .await
    }

    /// Build a transaction for `account` to sign elsewhere.
    ///
    /// The nonce is consumed as soon as the transaction is handed out. If it
    /// is never submitted, call [`resync_nonce`](Self::resync_nonce).
    pub async fn prepare(
        &self,
        operation: RegistryOperation,
        did: &Did,
        account: Address,
    ) -> VdrResult<PreparedTransaction> {
        let current = self.lookup(did).await?;
        if let Some(current) = &current {
            if !matches!(operation, RegistryOperation::Register { .. }) {
                authorize(current, &account)?;
            }
        }
        let kind = operation.kind();
        let proposed = match (operation, &current) {
            (RegistryOperation::Register { kind, content }, _) => {
                Record::new(did.clone(), kind, account, content)
            }
            (RegistryOperation::Update { content }, Some(current)) => current.updated(content)?,
            (RegistryOperation::Revoke, Some(current)) => current.revoked()?,
            (_, None) => return Err(VdrError::NotFound(did.to_string())),
        };

        self.sync_nonce(account).await?;
        let built = self.builder.build(
            kind,
            did,
            &proposed,
            current.as_ref().map(|record| record.status),
            account,
        )?;
        let signing_bytes = built.signing_bytes()?;
        Ok(PreparedTransaction {
            transaction: built.commit(),
            signing_bytes,
        })
    }

    /// Submit a transaction signed outside this registry and wait for it to
    /// be final. Resubmitting an already accepted transaction is safe.
    pub async fn submit_signed(&self, tx: &Transaction) -> VdrResult<Record> {
        let receipt = self.client.submit(tx).await?;
        let mut tx = mark_submitted(tx)?;
        self.confirm(&mut tx, &receipt, None).await
    }

    /// Like [`submit_signed`](Self::submit_signed) but the wait can be
    /// abandoned through `cancel`.
    pub async fn submit_signed_with_cancel(
        &self,
        tx: &Transaction,
        cancel: &CancellationToken,
    ) -> VdrResult<Record> {
        let receipt = self.client.submit(tx).await?;
        let mut tx = mark_submitted(tx)?;
        self.confirm(&mut tx, &receipt, Some(cancel)).await
    }

    /// Reset the local nonce for `account` to the ledger's count.
    pub async fn resync_nonce(&self, account: Address) -> VdrResult<u64> {
        let next = self.client.next_nonce(&account).await?;
        self.builder.nonces().reset(account, next)?;
        Ok(next)
    }

    pub(crate) async fn lookup(&self, did: &Did) -> VdrResult<Option<Record>> {
        match self.client.resolve(did, None).await {
            Ok(record) => Ok(Some(record)),
            Err(VdrError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn sync_nonce(&self, account: Address) -> VdrResult<()> {
        let next = self.client.next_nonce(&account).await?;
        self.builder.nonces().seed(account, next);
        Ok(())
    }

    async fn write(
        &self,
        kind: OperationKind,
        did: &Did,
        proposed: Record,
        current: Option<&Record>,
        signer: &KeyHandle,
        account: Address,
    ) -> VdrResult<Record> {
        self.sync_nonce(account).await?;
        let built = self.builder.build(
            kind,
            did,
            &proposed,
            current.map(|record| record.status),
            account,
        )?;
        let message = built.signing_bytes()?;
        let (mut tx, lease) = built.into_parts();
        tx.attach_signature(self.keys.sign(signer, &message)?)?;

        // An error here drops the lease and releases the nonce.
        let receipt = self.client.submit(&tx).await?;
        lease.commit();
        tx.set_status(TransactionStatus::Submitted)?;

        self.confirm(&mut tx, &receipt, None).await
    }

    async fn confirm(
        &self,
        tx: &mut Transaction,
        receipt: &Receipt,
        cancel: Option<&CancellationToken>,
    ) -> VdrResult<Record> {
        match self
            .client
            .await_confirmation(receipt, self.confirmation_timeout, cancel)
            .await
        {
            Ok(confirmed) => {
                tx.set_status(TransactionStatus::Confirmed)?;
                info!(
                    did = %confirmed.record.id,
                    version = confirmed.record.version,
                    block = confirmed.block_number,
                    "registry write confirmed"
                );
                Ok(confirmed.record)
            }
            Err(err) => {
                let status = match &err {
                    VdrError::LedgerRejected { .. } => TransactionStatus::Rejected,
                    _ => TransactionStatus::TimedOut,
                };
                warn!(tx_hash = %receipt.tx_hash, error = %err, ?status, "registry write not confirmed");
                tx.set_status(status)?;
                Err(err)
            }
        }
    }
}

fn mark_submitted(tx: &Transaction) -> VdrResult<Transaction> {
    let mut tx = tx.clone();
    if tx.status() == TransactionStatus::Signed {
        tx.set_status(TransactionStatus::Submitted)?;
    }
    Ok(tx)
}

fn authorize(record: &Record, account: &Address) -> VdrResult<()> {
    if record.owner != *account {
        return Err(VdrError::Unauthorized {
            did: record.id.to_string(),
            account: account.to_string(),
        });
    }
    Ok(())
}
