use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::io::Cursor;
use std::sync::Arc;

use crate::common::error::{FaceGateError, Result};
use crate::common::Config;
use crate::core::audit::{AuditLog, UnauthorizedRecord};
use crate::core::capabilities::{FaceLocalizer, FaceRegion, FeatureExtractor, LivenessGate};
use crate::core::index::FeatureIndex;
use crate::core::matcher::{self, MatchOutcome};
use crate::crypto::CryptoEnvelope;
use crate::storage::EncryptedBiometricStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    NoFaceDetected,
    FeatureExtractionFailed,
    NotRegistered,
    EmptyRegistry,
    LivenessFailed,
    InternalError,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    Accepted {
        username: String,
        distance: f32,
    },
    Rejected {
        reason: RejectionReason,
        distance: Option<f32>,
    },
}

/// The face-authentication subsystem behind the (external) HTTP layer.
/// Constructed explicitly with its collaborators injected; construction runs
/// the one-time index rebuild, so a service that exists is ready for
/// traffic.
pub struct FaceGateService {
    config: Config,
    store: Arc<EncryptedBiometricStore>,
    crypto: Arc<CryptoEnvelope>,
    index: FeatureIndex,
    audit: AuditLog,
    localizer: Box<dyn FaceLocalizer>,
    extractor: Box<dyn FeatureExtractor>,
    liveness: Box<dyn LivenessGate>,
}

impl FaceGateService {
    pub fn new(
        config: Config,
        store: Arc<EncryptedBiometricStore>,
        crypto: Arc<CryptoEnvelope>,
        localizer: Box<dyn FaceLocalizer>,
        extractor: Box<dyn FeatureExtractor>,
        liveness: Box<dyn LivenessGate>,
    ) -> Result<Self> {
        let index = FeatureIndex::new();
        let loaded = index.rebuild(&store, extractor.as_ref(), &crypto)?;
        tracing::info!("Feature index ready with {} enrolled identities", loaded);

        let audit = AuditLog::new(Arc::clone(&store), Arc::clone(&crypto));

        Ok(Self {
            config,
            store,
            crypto,
            index,
            audit,
            localizer,
            extractor,
            liveness,
        })
    }

    /// Verify a presented face against the enrolled population.
    ///
    /// Recoverable conditions come back as tagged rejections; anything
    /// unexpected is recorded as an attack with the raw bytes as evidence
    /// and surfaced as a generic internal rejection, never a fault.
    pub fn verify(&self, image_bytes: &[u8]) -> VerifyOutcome {
        match self.verify_inner(image_bytes) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Verification fault: {}", e);
                if let Err(audit_err) = self
                    .audit
                    .record_attack(&e.to_string(), Some(image_bytes))
                {
                    tracing::error!("Failed to record attack: {}", audit_err);
                }
                VerifyOutcome::Rejected {
                    reason: RejectionReason::InternalError,
                    distance: None,
                }
            }
        }
    }

    fn verify_inner(&self, image_bytes: &[u8]) -> Result<VerifyOutcome> {
        let image = image::load_from_memory(image_bytes)
            .map_err(|e| FaceGateError::InvalidImage(e.to_string()))?;

        let region = match self.localizer.detect(&image)? {
            Some(region) => region,
            None => {
                return Ok(VerifyOutcome::Rejected {
                    reason: RejectionReason::NoFaceDetected,
                    distance: None,
                })
            }
        };

        if self.config.matching.enforce_liveness_on_verify && !self.liveness_passes(&region)? {
            return Ok(VerifyOutcome::Rejected {
                reason: RejectionReason::LivenessFailed,
                distance: None,
            });
        }

        let probe = match self.extractor.extract(&region)? {
            Some(embedding) => embedding,
            None => {
                return Ok(VerifyOutcome::Rejected {
                    reason: RejectionReason::FeatureExtractionFailed,
                    distance: None,
                })
            }
        };

        let snapshot = self.index.snapshot();
        let outcome = matcher::classify(
            &probe,
            &snapshot,
            self.config.matching.distance_threshold,
            self.config.matching.match_tolerance,
        );

        match outcome {
            MatchOutcome::Accepted { username, distance } => {
                tracing::info!("Accepted {} at distance {:.4}", username, distance);
                Ok(VerifyOutcome::Accepted { username, distance })
            }
            MatchOutcome::RejectedKnownPopulation { distance } => {
                tracing::info!("Rejected probe at distance {:.4}", distance);
                self.audit.record_unauthorized(image_bytes)?;
                Ok(VerifyOutcome::Rejected {
                    reason: RejectionReason::NotRegistered,
                    distance: Some(distance),
                })
            }
            MatchOutcome::RejectedEmptyPopulation => {
                tracing::info!("Rejected probe against empty registry");
                self.audit.record_unauthorized(image_bytes)?;
                Ok(VerifyOutcome::Rejected {
                    reason: RejectionReason::EmptyRegistry,
                    distance: None,
                })
            }
        }
    }

    /// Enroll a new identity. Uniqueness is checked before any encryption
    /// work; the face image is persisted encrypted, then the feature index
    /// picks up the new embedding without a reload.
    pub fn register(&self, username: &str, image_bytes: &[u8]) -> Result<()> {
        if self.store.username_exists(username)? {
            return Err(FaceGateError::UsernameTaken(username.to_string()));
        }

        let image = image::load_from_memory(image_bytes)
            .map_err(|e| FaceGateError::InvalidImage(e.to_string()))?;

        let region = self
            .localizer
            .detect(&image)?
            .ok_or(FaceGateError::NoFaceDetected)?;

        if !self.liveness_passes(&region)? {
            return Err(FaceGateError::LivenessFailed);
        }

        let mut face_png = Vec::new();
        region
            .image
            .write_to(&mut Cursor::new(&mut face_png), image::ImageOutputFormat::Png)?;
        let envelope = self.crypto.encrypt(BASE64.encode(&face_png).as_bytes())?;
        self.store.write_identity(username, &envelope)?;

        // The identity is durable at this point. If extraction fails the
        // index lags until the next rebuild retries this record.
        match self.extractor.extract(&region) {
            Ok(Some(embedding)) => self.index.insert(username, embedding),
            Ok(None) => {
                tracing::warn!("No features extracted for {}; index will lag", username)
            }
            Err(e) => tracing::warn!("Feature extraction failed for {}: {}", username, e),
        }

        tracing::info!("Registered identity {}", username);
        Ok(())
    }

    pub fn username_exists(&self, username: &str) -> Result<bool> {
        self.store.username_exists(username)
    }

    /// Duplicate check: is a face within the loose match tolerance of any
    /// enrolled identity? The primary threshold does not apply here.
    pub fn face_exists(&self, image_bytes: &[u8]) -> Result<bool> {
        let image = image::load_from_memory(image_bytes)
            .map_err(|e| FaceGateError::InvalidImage(e.to_string()))?;

        let region = self
            .localizer
            .detect(&image)?
            .ok_or(FaceGateError::NoFaceDetected)?;

        if !self.liveness_passes(&region)? {
            return Err(FaceGateError::LivenessFailed);
        }

        let probe = match self.extractor.extract(&region)? {
            Some(embedding) => embedding,
            None => return Ok(false),
        };

        Ok(matcher::nearest_within(
            &probe,
            &self.index.snapshot(),
            self.config.matching.match_tolerance,
        ))
    }

    pub fn record_attack(&self, diagnostic: &str, image_bytes: Option<&[u8]>) -> Result<()> {
        self.audit.record_attack(diagnostic, image_bytes)
    }

    pub fn list_unauthorized(&self) -> Result<Vec<UnauthorizedRecord>> {
        self.audit.list_unauthorized()
    }

    pub fn enrolled_count(&self) -> usize {
        self.index.len()
    }

    /// Explicit lifecycle end: drops the storage handle and key material.
    pub fn shutdown(self) {
        tracing::info!("Face gate service shutting down");
        drop(self);
    }

    /// Both a sub-threshold probability and an unavailable service count as
    /// a failed liveness gate; only genuinely unexpected errors propagate.
    fn liveness_passes(&self, region: &FaceRegion) -> Result<bool> {
        match self.liveness.check(region) {
            Ok(probability) => Ok(probability > self.config.liveness.probability_threshold),
            Err(FaceGateError::LivenessUnavailable(msg)) => {
                tracing::warn!("Liveness service unavailable: {}", msg);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
