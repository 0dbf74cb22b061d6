pub mod config;
pub mod error;

pub use config::{Config, LivenessConfig, MatchingConfig, StorageConfig};
pub use error::{FaceGateError, Result};
