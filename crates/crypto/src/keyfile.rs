//! Password-encrypted key files.
//!
//! The seed is sealed with AES-256-GCM under a key derived from the password
//! with argon2id. Plaintext key files are not supported.

use crate::{KeyHandle, KeyManager};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ed25519_dalek::SigningKey;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use vdr_types::{Address, VdrError, VdrResult};
use zeroize::Zeroizing;

const KEYFILE_VERSION: u8 = 1;
const KDF_LABEL: &str = "argon2id-v1";

#[derive(Debug, Error)]
pub enum KeyFileError {
    #[error("key file not found: {0}")]
    NotFound(PathBuf),
    #[error("key file {0} already exists")]
    AlreadyExists(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid key file: {0}")]
    Format(String),
    #[error("unsupported key file version {0}")]
    Version(u8),
    #[error("key file decryption failed")]
    Decrypt,
    #[error("key file encryption failed: {0}")]
    Encrypt(String),
}

impl From<KeyFileError> for VdrError {
    fn from(err: KeyFileError) -> Self {
        match err {
            KeyFileError::NotFound(path) => VdrError::KeyNotFound(path.display().to_string()),
            KeyFileError::AlreadyExists(_) => VdrError::InvalidOperation(err.to_string()),
            other => VdrError::SigningError(other.to_string()),
        }
    }
}

/// On-disk key file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyFile {
    pub version: u8,
    pub address: String,
    pub public_key_hex: String,
    pub kdf: String,
    pub salt: String,
    pub nonce: String,
    pub ciphertext: String,
}

impl KeyFile {
    fn seal(signing_key: &SigningKey, password: &str) -> Result<Self, KeyFileError> {
        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);

        let key = derive_key(password, &salt)?;
        let cipher = Aes256Gcm::new_from_slice(key.as_slice())
            .map_err(|err| KeyFileError::Encrypt(err.to_string()))?;
        let seed = Zeroizing::new(signing_key.to_bytes());
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), seed.as_slice())
            .map_err(|err| KeyFileError::Encrypt(err.to_string()))?;

        let public_key = signing_key.verifying_key().to_bytes();
        Ok(Self {
            version: KEYFILE_VERSION,
            address: Address::from_public_key(&public_key).to_string(),
            public_key_hex: hex::encode(public_key),
            kdf: KDF_LABEL.to_string(),
            salt: BASE64.encode(salt),
            nonce: BASE64.encode(nonce_bytes),
            ciphertext: BASE64.encode(ciphertext),
        })
    }

    fn open(&self, password: &str) -> Result<SigningKey, KeyFileError> {
        if self.version != KEYFILE_VERSION {
            return Err(KeyFileError::Version(self.version));
        }
        if self.kdf != KDF_LABEL {
            return Err(KeyFileError::Format(format!("unknown kdf `{}`", self.kdf)));
        }
        let salt = decode_field("salt", &self.salt)?;
        let nonce: [u8; 12] = decode_field("nonce", &self.nonce)?
            .as_slice()
            .try_into()
            .map_err(|_| KeyFileError::Format("nonce must be 12 bytes".into()))?;
        let ciphertext = decode_field("ciphertext", &self.ciphertext)?;

        let key = derive_key(password, &salt)?;
        let cipher =
            Aes256Gcm::new_from_slice(key.as_slice()).map_err(|_| KeyFileError::Decrypt)?;
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
                .map_err(|_| KeyFileError::Decrypt)?,
        );
        let seed: Zeroizing<[u8; 32]> = Zeroizing::new(
            plaintext
                .as_slice()
                .try_into()
                .map_err(|_| KeyFileError::Format("sealed seed must be 32 bytes".into()))?,
        );

        let signing_key = SigningKey::from_bytes(&seed);
        if hex::encode(signing_key.verifying_key().to_bytes()) != self.public_key_hex {
            return Err(KeyFileError::Format(
                "public key does not match sealed seed".into(),
            ));
        }
        Ok(signing_key)
    }

    pub fn save(&self, path: &Path) -> Result<(), KeyFileError> {
        if path.exists() {
            return Err(KeyFileError::AlreadyExists(path.to_path_buf()));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)
            .map_err(|err| KeyFileError::Format(err.to_string()))?;
        let tmp = tmp_path(path);
        fs::write(&tmp, data)?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, KeyFileError> {
        let data = fs::read(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => KeyFileError::NotFound(path.to_path_buf()),
            _ => KeyFileError::Io(err),
        })?;
        serde_json::from_slice(&data).map_err(|err| KeyFileError::Format(err.to_string()))
    }
}

impl KeyManager {
    /// Generate a key, write it to `path` encrypted under `password`, and
    /// return a handle to it.
    pub fn generate_to_file(&self, path: &Path, password: &str) -> VdrResult<KeyHandle> {
        let signing_key = SigningKey::generate(&mut OsRng);
        let keyfile = KeyFile::seal(&signing_key, password)?;
        keyfile.save(path)?;
        info!(address = %keyfile.address, path = %path.display(), "key file written");
        Ok(self.insert(signing_key))
    }

    /// Write the key behind `handle` to an encrypted key file.
    pub fn export_to_file(&self, handle: &KeyHandle, path: &Path, password: &str) -> VdrResult<()> {
        let keyfile = self.with_signing_key(handle, |key| KeyFile::seal(key, password))??;
        keyfile.save(path)?;
        Ok(())
    }

    pub fn import_file(&self, path: &Path, password: &str) -> VdrResult<KeyHandle> {
        let signing_key = KeyFile::load(path)?.open(password)?;
        Ok(self.insert(signing_key))
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, KeyFileError> {
    BASE64
        .decode(value)
        .map_err(|err| KeyFileError::Format(format!("invalid {name}: {err}")))
}

fn derive_key(password: &str, salt: &[u8]) -> Result<Zeroizing<[u8; 32]>, KeyFileError> {
    let mut key = Zeroizing::new([0u8; 32]);
    argon2::Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut key[..])
        .map_err(|err| KeyFileError::Format(format!("key derivation failed: {err}")))?;
    Ok(key)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
