use ed25519_dalek::{Signer, SigningKey};
use parking_lot::RwLock;
use rand_core::OsRng;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;
use vdr_types::{Address, Signature, VdrError, VdrResult};
use zeroize::Zeroizing;

/// What a handle is allowed to do with its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capabilities {
    pub sign: bool,
    pub dispose: bool,
}

impl Capabilities {
    pub const ALL: Capabilities = Capabilities {
        sign: true,
        dispose: true,
    };
    pub const SIGN_ONLY: Capabilities = Capabilities {
        sign: true,
        dispose: false,
    };

    pub fn intersect(self, other: Capabilities) -> Capabilities {
        Capabilities {
            sign: self.sign && other.sign,
            dispose: self.dispose && other.dispose,
        }
    }
}

/// Opaque reference to a key held by a [`KeyManager`].
///
/// A handle carries no key material and cannot be serialized. It becomes
/// invalid once its key is disposed.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct KeyHandle {
    id: Uuid,
}

impl fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyHandle({})", self.id)
    }
}

struct HandleEntry {
    key_id: Uuid,
    capabilities: Capabilities,
}

/// `SigningKey` zeroizes itself on drop.
struct StoredKey {
    signing_key: SigningKey,
    address: Address,
}

#[derive(Default)]
struct KeyTable {
    keys: HashMap<Uuid, Arc<StoredKey>>,
    handles: HashMap<Uuid, HandleEntry>,
}

/// In-memory key custody.
#[derive(Default, Clone)]
pub struct KeyManager {
    table: Arc<RwLock<KeyTable>>,
}

impl KeyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh ed25519 key with full capabilities.
    pub fn generate(&self) -> KeyHandle {
        self.insert(SigningKey::generate(&mut OsRng))
    }

    /// Import a key from its 32-byte seed. The seed buffer is wiped by the
    /// caller's `Zeroizing` wrapper.
    pub fn import_seed(&self, seed: Zeroizing<[u8; 32]>) -> KeyHandle {
        self.insert(SigningKey::from_bytes(&seed))
    }

    pub(crate) fn insert(&self, signing_key: SigningKey) -> KeyHandle {
        let address = Address::from_public_key(&signing_key.verifying_key().to_bytes());
        let key_id = Uuid::new_v4();
        let handle = KeyHandle { id: Uuid::new_v4() };

        let mut table = self.table.write();
        table.keys.insert(
            key_id,
            Arc::new(StoredKey {
                signing_key,
                address,
            }),
        );
        table.handles.insert(
            handle.id,
            HandleEntry {
                key_id,
                capabilities: Capabilities::ALL,
            },
        );
        debug!(%address, handle = ?handle, "key added to manager");
        handle
    }

    fn lookup(&self, handle: &KeyHandle) -> VdrResult<(Arc<StoredKey>, Capabilities)> {
        let table = self.table.read();
        let entry = table
            .handles
            .get(&handle.id)
            .ok_or_else(|| VdrError::KeyNotFound(format!("{handle:?}")))?;
        let key = table
            .keys
            .get(&entry.key_id)
            .ok_or_else(|| VdrError::KeyNotFound(format!("{handle:?}")))?;
        Ok((Arc::clone(key), entry.capabilities))
    }

    pub fn capabilities(&self, handle: &KeyHandle) -> VdrResult<Capabilities> {
        Ok(self.lookup(handle)?.1)
    }

    pub fn sign(&self, handle: &KeyHandle, message: &[u8]) -> VdrResult<Signature> {
        let (key, capabilities) = self.lookup(handle)?;
        if !capabilities.sign {
            return Err(VdrError::SigningError(format!(
                "{handle:?} lacks the sign capability"
            )));
        }
        let signature = key.signing_key.try_sign(message).map_err(|err| {
            VdrError::SigningError(format!("ed25519 signing failed: {err}"))
        })?;
        Ok(Signature {
            public_key: key.signing_key.verifying_key().to_bytes(),
            bytes: signature.to_bytes(),
        })
    }

    pub fn public_key(&self, handle: &KeyHandle) -> VdrResult<[u8; 32]> {
        Ok(self.lookup(handle)?.0.signing_key.verifying_key().to_bytes())
    }

    pub fn address(&self, handle: &KeyHandle) -> VdrResult<Address> {
        Ok(self.lookup(handle)?.0.address)
    }

    /// Derive a handle to the same key with at most `capabilities`.
    pub fn restrict(
        &self,
        handle: &KeyHandle,
        capabilities: Capabilities,
    ) -> VdrResult<KeyHandle> {
        let mut table = self.table.write();
        let entry = table
            .handles
            .get(&handle.id)
            .ok_or_else(|| VdrError::KeyNotFound(format!("{handle:?}")))?;
        let derived = HandleEntry {
            key_id: entry.key_id,
            capabilities: entry.capabilities.intersect(capabilities),
        };
        let restricted = KeyHandle { id: Uuid::new_v4() };
        table.handles.insert(restricted.id, derived);
        Ok(restricted)
    }

    /// Drop the key behind `handle` and invalidate every handle to it.
    pub fn dispose(&self, handle: &KeyHandle) -> VdrResult<()> {
        let mut table = self.table.write();
        let entry = table
            .handles
            .get(&handle.id)
            .ok_or_else(|| VdrError::KeyNotFound(format!("{handle:?}")))?;
        if !entry.capabilities.dispose {
            return Err(VdrError::InvalidOperation(format!(
                "{handle:?} lacks the dispose capability"
            )));
        }
        let key_id = entry.key_id;
        table.handles.retain(|_, entry| entry.key_id != key_id);
        if let Some(key) = table.keys.remove(&key_id) {
            debug!(address = %key.address, "key disposed");
        }
        Ok(())
    }

    pub(crate) fn with_signing_key<T>(
        &self,
        handle: &KeyHandle,
        f: impl FnOnce(&SigningKey) -> T,
    ) -> VdrResult<T> {
        let (key, _) = self.lookup(handle)?;
        Ok(f(&key.signing_key))
    }
}
