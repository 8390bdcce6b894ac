use std::fs;
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use anyhow::{anyhow, Context, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

const NONCE_LEN: usize = 12;

/// Encrypted at-rest cache for ingested files. Each stored file is
/// `nonce || ciphertext`; the integrity hash is a sha256 over the plaintext.
pub struct FileVault {
    cipher: Aes256Gcm,
    cache_dir: PathBuf,
}

impl FileVault {
    pub fn new(secret: &str, cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let key_bytes = Sha256::digest(secret.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)
            .with_context(|| format!("failed to create cache dir {}", cache_dir.display()))?;
        Ok(Self {
            cipher: Aes256Gcm::new(key),
            cache_dir,
        })
    }

    /// Encrypts `plaintext` into the cache and returns the stored path plus
    /// the plaintext integrity hash (hex).
    pub fn store(&self, plaintext: &[u8]) -> Result<(PathBuf, String)> {
        let integrity_hash = hex::encode(Sha256::digest(plaintext));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|err| anyhow!("encryption failed: {err}"))?;

        let mut contents = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        contents.extend_from_slice(&nonce_bytes);
        contents.extend_from_slice(&ciphertext);

        let path = self.cache_dir.join(format!("{}.bin", Uuid::new_v4()));
        fs::write(&path, &contents)
            .with_context(|| format!("failed to write cache file {}", path.display()))?;

        Ok((path, integrity_hash))
    }

    pub fn load(&self, path: &Path) -> Result<Vec<u8>> {
        let contents = fs::read(path)
            .with_context(|| format!("failed to read cache file {}", path.display()))?;
        if contents.len() <= NONCE_LEN {
            return Err(anyhow!("cache file {} is truncated", path.display()));
        }

        let (nonce_bytes, ciphertext) = contents.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|err| anyhow!("decryption failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileVault::new("unit-test-secret", dir.path()).unwrap();

        let (path, hash) = vault.store(b"compliance report body").unwrap();
        assert_eq!(hash.len(), 64);
        assert_ne!(fs::read(&path).unwrap(), b"compliance report body");

        let plain = vault.load(&path).unwrap();
        assert_eq!(plain, b"compliance report body");
    }

    #[test]
    fn load_rejects_wrong_key() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileVault::new("secret-a", dir.path()).unwrap();
        let (path, _) = vault.store(b"payload").unwrap();

        let other = FileVault::new("secret-b", dir.path()).unwrap();
        assert!(other.load(&path).is_err());
    }
}
