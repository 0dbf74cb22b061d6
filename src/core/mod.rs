pub mod audit;
pub mod capabilities;
pub mod detector;
pub mod extractor;
pub mod index;
pub mod liveness;
pub mod matcher;
pub mod service;

pub use audit::{AuditLog, UnauthorizedRecord};
pub use capabilities::{BoundingBox, Embedding, FaceLocalizer, FaceRegion, FeatureExtractor, LivenessGate};
pub use detector::OnnxFaceLocalizer;
pub use extractor::OnnxFeatureExtractor;
pub use index::FeatureIndex;
pub use liveness::HttpLivenessGate;
pub use matcher::{classify, euclidean_distance, nearest_within, MatchOutcome};
pub use service::{FaceGateService, RejectionReason, VerifyOutcome};
