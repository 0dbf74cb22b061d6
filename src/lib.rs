// Core modules
pub mod common;
pub mod core;
pub mod crypto;
pub mod storage;

// Re-export commonly used types
pub use common::{Config, FaceGateError, Result};
pub use core::{
    BoundingBox, Embedding, FaceGateService, FaceLocalizer, FaceRegion, FeatureExtractor,
    FeatureIndex, HttpLivenessGate, LivenessGate, MatchOutcome, OnnxFaceLocalizer,
    OnnxFeatureExtractor, RejectionReason, UnauthorizedRecord, VerifyOutcome,
};
pub use crypto::CryptoEnvelope;
pub use storage::EncryptedBiometricStore;
