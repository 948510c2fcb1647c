//! Secret Vault: symmetric encryption of per-user secrets at rest.
//!
//! Ciphertexts are `base64(nonce || sealed)` using ChaCha20-Poly1305 with a
//! fresh random 96-bit nonce per encryption.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("encryption key must be exactly {KEY_LEN} bytes, got {0}")]
    InvalidKey(usize),

    #[error("ciphertext is not valid: {0}")]
    Encoding(String),

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed (wrong key or corrupted ciphertext)")]
    Decrypt,
}

/// Process-wide cipher, built once from configuration.
#[derive(Clone)]
pub struct SecretVault {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for SecretVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretVault").finish_non_exhaustive()
    }
}

impl SecretVault {
    /// Build a vault from a 32-byte key.
    pub fn new(key: &str) -> Result<Self, VaultError> {
        let bytes = key.as_bytes();
        if bytes.len() != KEY_LEN {
            return Err(VaultError::InvalidKey(bytes.len()));
        }

        Ok(Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(bytes)),
        })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, VaultError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| VaultError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);

        Ok(STANDARD.encode(out))
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>, VaultError> {
        let raw = STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| VaultError::Encoding(e.to_string()))?;

        if raw.len() <= NONCE_LEN {
            return Err(VaultError::Encoding(format!(
                "expected more than {NONCE_LEN} bytes, got {}",
                raw.len()
            )));
        }

        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| VaultError::Decrypt)
    }

    /// Decrypt and require the plaintext to be UTF-8.
    pub fn decrypt_string(&self, ciphertext: &str) -> Result<String, VaultError> {
        let bytes = self.decrypt(ciphertext)?;
        String::from_utf8(bytes).map_err(|e| VaultError::Encoding(e.to_string()))
    }
}
