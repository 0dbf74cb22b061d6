use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::common::error::Result;
use crate::crypto::CryptoEnvelope;
use crate::storage::EncryptedBiometricStore;

/// Unauthorized-probe record with its evidence image recovered.
#[derive(Debug, Clone)]
pub struct UnauthorizedRecord {
    pub id: i64,
    pub image: Vec<u8>,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only recorder for unauthorized probes and attack diagnostics.
/// Evidence images are encrypted before they reach the store.
pub struct AuditLog {
    store: Arc<EncryptedBiometricStore>,
    crypto: Arc<CryptoEnvelope>,
}

impl AuditLog {
    pub fn new(store: Arc<EncryptedBiometricStore>, crypto: Arc<CryptoEnvelope>) -> Self {
        Self { store, crypto }
    }

    pub fn record_unauthorized(&self, image_bytes: &[u8]) -> Result<()> {
        let envelope = self.crypto.encrypt(BASE64.encode(image_bytes).as_bytes())?;
        self.store.write_unauthorized(&envelope)
    }

    pub fn record_attack(&self, diagnostic: &str, image_bytes: Option<&[u8]>) -> Result<()> {
        let envelope = match image_bytes {
            Some(bytes) => Some(self.crypto.encrypt(BASE64.encode(bytes).as_bytes())?),
            None => None,
        };
        self.store.write_attack(diagnostic, envelope.as_deref())
    }

    /// All unauthorized-probe records with evidence decrypted. A record that
    /// no longer decrypts is skipped with a warning rather than failing the
    /// whole listing.
    pub fn list_unauthorized(&self) -> Result<Vec<UnauthorizedRecord>> {
        let stored = self.store.read_unauthorized()?;
        let mut records = Vec::with_capacity(stored.len());

        for row in stored {
            let image = self
                .crypto
                .decrypt(&row.envelope)
                .and_then(|base64_image| {
                    BASE64
                        .decode(&base64_image)
                        .map_err(|e| crate::common::FaceGateError::InvalidImage(e.to_string()))
                });
            match image {
                Ok(image) => records.push(UnauthorizedRecord {
                    id: row.id,
                    image,
                    recorded_at: row.recorded_at,
                }),
                Err(e) => {
                    tracing::warn!("Skipping unreadable audit record {}: {}", row.id, e);
                }
            }
        }

        Ok(records)
    }
}
