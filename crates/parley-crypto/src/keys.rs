use aes_gcm::aead::OsRng;
use aes_gcm::aead::rand_core::RngCore;
use anyhow::{Result, anyhow};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

pub const KEY_LEN: usize = 32;

/// Generate a random 256-bit key for AES-256-GCM.
pub fn generate_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    key
}

/// Decode a base64 key.
pub fn key_from_base64(encoded: &str) -> Result<[u8; KEY_LEN]> {
    let bytes = BASE64.decode(encoded.trim())?;
    bytes
        .try_into()
        .map_err(|_| anyhow!("Invalid key length, expected {} bytes", KEY_LEN))
}

/// Accept either a base64-encoded key or a raw 32-byte secret string.
pub fn key_from_secret(secret: &str) -> Result<[u8; KEY_LEN]> {
    if let Ok(key) = key_from_base64(secret) {
        return Ok(key);
    }
    let raw = secret.as_bytes();
    raw.try_into().map_err(|_| {
        anyhow!(
            "Encryption secret must be {} raw bytes or base64 of {} bytes (got {} bytes)",
            KEY_LEN,
            KEY_LEN,
            raw.len()
        )
    })
}
