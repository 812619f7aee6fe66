// vendabot-core/src/crypto/mod.rs
//
// Marketplace access/refresh tokens are stored encrypted; the database never
// sees plaintext credentials. Storage format is base64(nonce || ciphertext).

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::rngs::OsRng;
use rand_core::TryRngCore;
use std::sync::Arc;

use crate::Error;

const NONCE_LEN: usize = 12;

#[derive(Clone)]
pub struct Encryptor {
    cipher: Arc<Aes256Gcm>,
}

impl Encryptor {
    /// Builds an AES-256-GCM encryptor from a raw 32-byte key.
    pub fn new(key_bytes: &[u8]) -> Result<Self, Error> {
        if key_bytes.len() != 32 {
            return Err(Error::KeyDerivation(format!(
                "AES-256 key must be 32 bytes, got {}",
                key_bytes.len()
            )));
        }
        let key = Key::<Aes256Gcm>::clone_from_slice(key_bytes);
        Ok(Self {
            cipher: Arc::new(Aes256Gcm::new(&key)),
        })
    }

    /// Convenience constructor for a base64-encoded 32-byte key (the form the
    /// key takes in configuration).
    pub fn from_base64_key(encoded: &str) -> Result<Self, Error> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| Error::KeyDerivation(format!("key is not valid base64: {e}")))?;
        Self::new(&bytes)
    }

    /// Encrypts `data` under a fresh random 12-byte nonce.
    pub fn encrypt(&self, data: &str) -> Result<String, Error> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        let mut rng = OsRng;
        rng.try_fill_bytes(&mut nonce_bytes)
            .map_err(|e| Error::Encryption(e.to_string()))?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, data.as_bytes())
            .map_err(|e| Error::Encryption(e.to_string()))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend(ciphertext);
        Ok(BASE64.encode(combined))
    }

    /// Decrypts base64(nonce || ciphertext) back into a `String`.
    pub fn decrypt(&self, encrypted_data: &str) -> Result<String, Error> {
        let data = BASE64
            .decode(encrypted_data)
            .map_err(|e| Error::Decryption(e.to_string()))?;

        if data.len() < NONCE_LEN {
            return Err(Error::Decryption(
                "ciphertext too short (missing nonce)".to_owned(),
            ));
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| Error::Decryption(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| Error::Decryption(e.to_string()))
    }
}
