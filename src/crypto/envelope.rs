use aes::Aes128;
use eax::{
    aead::{generic_array::GenericArray, AeadInPlace, KeyInit},
    Eax,
};
use rand::RngCore;
use std::path::Path;

use crate::common::error::{FaceGateError, Result};
use crate::crypto::keys::{load_or_generate_key, KEY_LEN};

/// Nonce length in the stored envelope (EAX over AES uses the block size).
pub const NONCE_LEN: usize = 16;
/// Authentication tag length in the stored envelope.
pub const TAG_LEN: usize = 16;

type Aes128Eax = Eax<Aes128>;

/// Authenticated-encryption primitive shared by everything that persists
/// biometric bytes. One key per process lifetime.
pub struct CryptoEnvelope {
    key: [u8; KEY_LEN],
}

impl CryptoEnvelope {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Load the key from `path`, generating one if absent.
    pub fn load_or_generate(path: &Path) -> Result<Self> {
        Ok(Self::new(load_or_generate_key(path)?))
    }

    /// Encrypt `plaintext` into a `nonce || tag || ciphertext` envelope with
    /// a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes128Eax::new(GenericArray::from_slice(&self.key));

        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let mut buffer = plaintext.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(GenericArray::from_slice(&nonce), b"", &mut buffer)
            .map_err(|_| FaceGateError::EncryptionFailed)?;

        let mut envelope = Vec::with_capacity(NONCE_LEN + TAG_LEN + buffer.len());
        envelope.extend_from_slice(&nonce);
        envelope.extend_from_slice(tag.as_slice());
        envelope.extend_from_slice(&buffer);
        Ok(envelope)
    }

    /// Decrypt an envelope, verifying the tag. Fails closed: a truncated
    /// envelope, a tampered byte, or a wrong key all yield
    /// `DecryptionFailed` and never partial plaintext.
    pub fn decrypt(&self, envelope: &[u8]) -> Result<Vec<u8>> {
        if envelope.len() < NONCE_LEN + TAG_LEN {
            return Err(FaceGateError::DecryptionFailed);
        }

        let nonce = &envelope[..NONCE_LEN];
        let tag = &envelope[NONCE_LEN..NONCE_LEN + TAG_LEN];
        let ciphertext = &envelope[NONCE_LEN + TAG_LEN..];

        let cipher = Aes128Eax::new(GenericArray::from_slice(&self.key));
        let mut buffer = ciphertext.to_vec();
        cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice(nonce),
                b"",
                &mut buffer,
                GenericArray::from_slice(tag),
            )
            .map_err(|_| FaceGateError::DecryptionFailed)?;

        Ok(buffer)
    }
}
