use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use anyhow::{Result, anyhow};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::keys::KEY_LEN;

const NONCE_LEN: usize = 12;

/// Symmetric encryption of message bodies before they are stored.
pub trait ContentCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String>;
    fn decrypt(&self, ciphertext: &str) -> Result<String>;
}

/// AES-256-GCM. Output is `base64(nonce || ciphertext || tag)`.
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }
}

impl ContentCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| anyhow!("Encryption failed: {}", e))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&sealed);
        Ok(BASE64.encode(blob))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let blob = BASE64.decode(ciphertext)?;
        if blob.len() < NONCE_LEN {
            return Err(anyhow!("Ciphertext too short"));
        }

        let (nonce_bytes, sealed) = blob.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|e| anyhow!("Decryption failed: {}", e))?;

        Ok(String::from_utf8(plaintext)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_key;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let cipher = AesGcmCipher::new(&generate_key());
        let message = "Hello from Parley!";

        let sealed = cipher.encrypt(message).unwrap();
        assert!(!sealed.contains(message));
        assert_eq!(cipher.decrypt(&sealed).unwrap(), message);
    }

    #[test]
    fn same_plaintext_gets_fresh_nonce() {
        let cipher = AesGcmCipher::new(&generate_key());
        assert_ne!(cipher.encrypt("hi").unwrap(), cipher.encrypt("hi").unwrap());
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = AesGcmCipher::new(&generate_key()).encrypt("Secret").unwrap();
        assert!(AesGcmCipher::new(&generate_key()).decrypt(&sealed).is_err());
    }

    #[test]
    fn truncated_blob_fails() {
        let cipher = AesGcmCipher::new(&generate_key());
        assert!(cipher.decrypt(&BASE64.encode([1u8; 4])).is_err());
    }
}
