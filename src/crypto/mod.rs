//! Authenticated encryption for biometric payloads.
//!
//! AES-128-EAX with a fresh random nonce per call. Stored envelopes use the
//! fixed layout `nonce(16) || tag(16) || ciphertext`.

pub mod envelope;
pub mod keys;

pub use envelope::{CryptoEnvelope, NONCE_LEN, TAG_LEN};
pub use keys::{load_or_generate_key, KEY_LEN};
