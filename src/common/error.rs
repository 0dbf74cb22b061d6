use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceGateError {
    #[error("No face detected")]
    NoFaceDetected,

    #[error("Feature extraction failed")]
    FeatureExtractionFailed,

    #[error("Decryption failed: envelope rejected")]
    DecryptionFailed,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Username already registered: {0}")]
    UsernameTaken(String),

    #[error("Liveness check failed")]
    LivenessFailed,

    #[error("Liveness service unavailable: {0}")]
    LivenessUnavailable(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Key error: {0}")]
    Key(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::OrtError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for FaceGateError {
    fn from(e: rusqlite::Error) -> Self {
        FaceGateError::StorageUnavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FaceGateError>;
