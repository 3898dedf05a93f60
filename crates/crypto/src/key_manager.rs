//! File-backed custody of the validator's BLS key.
//!
//! Exactly one `KeyManager` is constructed per process and handed to the
//! components that sign. `load_or_generate` is idempotent: it reuses the
//! keyfile when present and creates one otherwise.

use crate::bls::{self, PrivateKey, PublicKey, Signature};
use crate::DomainTag;
use crosslink_types::error::CryptoError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use zeroize::Zeroizing;

const KEY_FILE: &str = "bls.key";

/// Owns the validator's BLS keypair.
pub struct KeyManager {
    private: PrivateKey,
    public: PublicKey,
    key_path: PathBuf,
}

impl KeyManager {
    /// Loads the key from `keys_dir/bls.key`, generating and persisting a
    /// fresh one when the file does not exist.
    pub fn load_or_generate(keys_dir: &Path) -> Result<Self, CryptoError> {
        fs::create_dir_all(keys_dir)
            .map_err(|e| CryptoError::KeyIo(format!("create {}: {}", keys_dir.display(), e)))?;
        let key_path = keys_dir.join(KEY_FILE);

        if key_path.exists() {
            let raw = Zeroizing::new(
                fs::read(&key_path)
                    .map_err(|e| CryptoError::KeyIo(format!("read {}: {}", key_path.display(), e)))?,
            );
            let private = PrivateKey::from_bytes(&raw)?;
            let public = private.public_key();
            info!(target: "crypto", key = %key_path.display(), "loaded validator key");
            return Ok(KeyManager {
                private,
                public,
                key_path,
            });
        }

        let (private, public) = bls::generate_keypair()?;
        let bytes = private.to_bytes();
        fs::write(&key_path, bytes.as_ref())
            .map_err(|e| CryptoError::KeyIo(format!("write {}: {}", key_path.display(), e)))?;
        restrict_permissions(&key_path)?;
        info!(target: "crypto", key = %key_path.display(), "generated validator key");
        Ok(KeyManager {
            private,
            public,
            key_path,
        })
    }

    /// The validator's public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Path of the backing keyfile.
    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Signs `domain ∥ msg` with the validator key.
    pub fn sign_with_domain(
        &self,
        domain: DomainTag,
        msg: &[u8],
    ) -> Result<Signature, CryptoError> {
        self.private.sign_with_domain(domain, msg)
    }

    /// Signs a raw message with the validator key.
    pub fn sign(&self, msg: &[u8]) -> Result<Signature, CryptoError> {
        self.private.sign(msg)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), CryptoError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|e| CryptoError::KeyIo(format!("chmod {}: {}", path.display(), e)))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), CryptoError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_then_reloads_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let a = KeyManager::load_or_generate(dir.path()).unwrap();
        let b = KeyManager::load_or_generate(dir.path()).unwrap();
        assert_eq!(a.public_key().to_bytes(), b.public_key().to_bytes());
    }

    #[test]
    fn signatures_verify_under_loaded_key() {
        let dir = tempfile::tempdir().unwrap();
        let km = KeyManager::load_or_generate(dir.path()).unwrap();
        let sig = km.sign_with_domain(DomainTag::Attestation, b"batch").unwrap();
        assert!(km
            .public_key()
            .verify_with_domain(DomainTag::Attestation, &sig, b"batch"));
    }

    #[cfg(unix)]
    #[test]
    fn keyfile_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let km = KeyManager::load_or_generate(dir.path()).unwrap();
        let mode = fs::metadata(km.key_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
