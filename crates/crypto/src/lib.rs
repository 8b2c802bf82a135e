//! Key custody and signing for the VDR client.
//!
//! Private keys never leave the [`KeyManager`]: callers hold opaque
//! [`KeyHandle`]s and ask the manager to sign on their behalf. Keys can be
//! persisted only as password-encrypted key files.

pub mod keyfile;
mod manager;

pub use keyfile::{KeyFile, KeyFileError};
pub use manager::{Capabilities, KeyHandle, KeyManager};

use ed25519_dalek::{Signature as DalekSignature, Verifier, VerifyingKey};
use vdr_types::{Signature, VdrError, VdrResult};

/// Verify an ed25519 signature over `message`.
pub fn verify(signature: &Signature, message: &[u8]) -> VdrResult<()> {
    let key = VerifyingKey::from_bytes(&signature.public_key)
        .map_err(|err| VdrError::SigningError(format!("invalid public key: {err}")))?;
    let sig = DalekSignature::from_bytes(&signature.bytes);
    key.verify(message, &sig)
        .map_err(|_| VdrError::SigningError("signature verification failed".into()))
}
