use crate::common::error::{FaceGateError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub models: ModelConfig,
    pub detector: DetectorConfig,
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    pub detector_path: PathBuf,
    pub extractor_path: PathBuf,
    #[serde(default = "default_optimization_level")]
    pub optimization_level: u32,
}

fn default_optimization_level() -> u32 { 3 }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectorConfig {
    pub input_width: u32,
    pub input_height: u32,
    #[serde(default = "default_detection_confidence")]
    pub detection_confidence: f32,
}

fn default_detection_confidence() -> f32 { 0.5 }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExtractorConfig {
    pub input_size: u32,
    pub normalization_value: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MatchingConfig {
    /// Strict maximum distance for final acceptance.
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f32,
    /// Looser per-entry acceptance radius used as the conjunctive gate.
    #[serde(default = "default_match_tolerance")]
    pub match_tolerance: f32,
    #[serde(default)]
    pub enforce_liveness_on_verify: bool,
}

fn default_distance_threshold() -> f32 { 0.6 }
fn default_match_tolerance() -> f32 { 0.5 }

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            distance_threshold: default_distance_threshold(),
            match_tolerance: default_match_tolerance(),
            enforce_liveness_on_verify: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LivenessConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_probability_threshold")]
    pub probability_threshold: f32,
    #[serde(default = "default_liveness_timeout")]
    pub timeout_ms: u64,
}

fn default_probability_threshold() -> f32 { 0.8 }
fn default_liveness_timeout() -> u64 { 5000 }

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            probability_threshold: default_probability_threshold(),
            timeout_ms: default_liveness_timeout(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    pub key_path: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = "configs/facegate.toml";
        Self::load_from_path(&std::path::PathBuf::from(config_path))
    }

    pub fn load_from_path(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Err(FaceGateError::Other(anyhow::anyhow!(
                "Config file not found: {}. Please create it from the example.", path.display()
            )));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| FaceGateError::Other(anyhow::anyhow!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.detector.input_width == 0 || self.detector.input_width > 4096 {
            return Err(FaceGateError::Other(anyhow::anyhow!(
                "Detector input width must be between 1 and 4096, got {}",
                self.detector.input_width
            )));
        }
        if self.detector.input_height == 0 || self.detector.input_height > 4096 {
            return Err(FaceGateError::Other(anyhow::anyhow!(
                "Detector input height must be between 1 and 4096, got {}",
                self.detector.input_height
            )));
        }

        if self.detector.detection_confidence < 0.0 || self.detector.detection_confidence > 1.0 {
            return Err(FaceGateError::Other(anyhow::anyhow!(
                "Detection confidence must be between 0.0 and 1.0, got {}",
                self.detector.detection_confidence
            )));
        }

        if self.extractor.input_size == 0 || self.extractor.input_size > 1024 {
            return Err(FaceGateError::Other(anyhow::anyhow!(
                "Extractor input size must be between 1 and 1024, got {}",
                self.extractor.input_size
            )));
        }

        if self.matching.distance_threshold <= 0.0 {
            return Err(FaceGateError::Other(anyhow::anyhow!(
                "Distance threshold must be positive, got {}",
                self.matching.distance_threshold
            )));
        }
        if self.matching.match_tolerance <= 0.0 {
            return Err(FaceGateError::Other(anyhow::anyhow!(
                "Match tolerance must be positive, got {}",
                self.matching.match_tolerance
            )));
        }

        if self.liveness.probability_threshold < 0.0 || self.liveness.probability_threshold > 1.0 {
            return Err(FaceGateError::Other(anyhow::anyhow!(
                "Liveness probability threshold must be between 0.0 and 1.0, got {}",
                self.liveness.probability_threshold
            )));
        }
        if self.liveness.timeout_ms == 0 {
            return Err(FaceGateError::Other(anyhow::anyhow!(
                "Liveness timeout must be greater than zero"
            )));
        }

        Ok(())
    }
}
