use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::common::error::Result;
use crate::core::capabilities::{Embedding, FaceRegion, FeatureExtractor};
use crate::crypto::CryptoEnvelope;
use crate::storage::EncryptedBiometricStore;

#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub embedding: Embedding,
    pub loaded_at: DateTime<Utc>,
}

/// Process-wide cache of username -> embedding, rebuilt from the encrypted
/// store at startup and extended on registration. Entries are never removed
/// during the process lifetime.
pub struct FeatureIndex {
    entries: RwLock<HashMap<String, IndexEntry>>,
}

impl Default for FeatureIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureIndex {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Rebuild the index from every durable identity record: decrypt, decode
    /// the recovered image, re-extract features. Fail-soft per record — a
    /// record that fails any step is skipped with a warning and the rest
    /// load normally. Returns the number of entries loaded.
    pub fn rebuild(
        &self,
        store: &EncryptedBiometricStore,
        extractor: &dyn FeatureExtractor,
        crypto: &CryptoEnvelope,
    ) -> Result<usize> {
        let identities = store.read_all_identities()?;
        let mut loaded = HashMap::with_capacity(identities.len());

        for (username, envelope) in identities {
            match Self::recover_embedding(&envelope, extractor, crypto) {
                Ok(Some(embedding)) => {
                    loaded.insert(
                        username,
                        IndexEntry {
                            embedding,
                            loaded_at: Utc::now(),
                        },
                    );
                }
                Ok(None) => {
                    tracing::warn!("No features recovered for {}, skipping", username);
                }
                Err(e) => {
                    tracing::warn!("Failed to load identity {}: {}", username, e);
                }
            }
        }

        let count = loaded.len();
        *self.entries.write() = loaded;
        Ok(count)
    }

    fn recover_embedding(
        envelope: &[u8],
        extractor: &dyn FeatureExtractor,
        crypto: &CryptoEnvelope,
    ) -> Result<Option<Embedding>> {
        let base64_image = crypto.decrypt(envelope)?;
        let image_bytes = BASE64
            .decode(&base64_image)
            .map_err(|e| crate::common::FaceGateError::InvalidImage(e.to_string()))?;
        let image = image::load_from_memory(&image_bytes)?;

        // Stored images are already face crops; no re-detection needed.
        extractor.extract(&FaceRegion::whole(image))
    }

    /// Add or overwrite an entry after a successful registration.
    pub fn insert(&self, username: &str, embedding: Embedding) {
        self.entries.write().insert(
            username.to_string(),
            IndexEntry {
                embedding,
                loaded_at: Utc::now(),
            },
        );
    }

    /// Read-only view consumed by the matcher.
    pub fn snapshot(&self) -> Vec<(String, Embedding)> {
        self.entries
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.embedding.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains(&self, username: &str) -> bool {
        self.entries.read().contains_key(username)
    }
}
