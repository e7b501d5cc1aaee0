/// Parley Crypto Library
///
/// Message bodies are encrypted at rest with one process-wide AES-256-GCM key.
/// The rest of the server only sees the `ContentCipher` trait, so the key and
/// algorithm are injected at startup rather than read from global state.
pub mod cipher;
pub mod keys;

pub use cipher::{AesGcmCipher, ContentCipher};
