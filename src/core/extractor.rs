use crate::common::error::{FaceGateError, Result};
use crate::common::Config;
use crate::core::capabilities::{Embedding, FaceRegion, FeatureExtractor};
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array4, CowArray};
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder, Value};
use std::sync::Arc;

/// ONNX-backed embedding extractor for cropped face regions.
pub struct OnnxFeatureExtractor {
    session: Session,
    _environment: Arc<Environment>,
    config: Config,
}

impl OnnxFeatureExtractor {
    pub fn new(config: &Config) -> Result<Self> {
        let environment = Arc::new(
            Environment::builder()
                .with_name("feature_extractor")
                .build()
                .map_err(|e| FaceGateError::Model(format!("Failed to create environment: {}", e)))?,
        );

        let model_path = &config.models.extractor_path;
        if !model_path.exists() {
            return Err(FaceGateError::Model(format!(
                "Extractor model not found at: {:?}",
                model_path
            )));
        }

        let mut session_builder = SessionBuilder::new(&environment)?;
        let opt_level = match config.models.optimization_level {
            0 => GraphOptimizationLevel::Disable,
            1 => GraphOptimizationLevel::Level1,
            2 => GraphOptimizationLevel::Level2,
            _ => GraphOptimizationLevel::Level3,
        };
        session_builder = session_builder.with_optimization_level(opt_level)?;

        let session = session_builder.with_model_from_file(model_path)?;

        Ok(Self {
            session,
            _environment: environment,
            config: config.clone(),
        })
    }

    fn preprocess_face(&self, img: &DynamicImage) -> Array4<f32> {
        // Single-channel input with ArcFace-style normalization.
        let gray = img.to_luma8();
        let size = self.config.extractor.input_size as usize;
        let mut array = Array4::<f32>::zeros((1, 1, size, size));

        let norm_val = self.config.extractor.normalization_value;
        for y in 0..size {
            for x in 0..size {
                let pixel = gray.get_pixel(x as u32, y as u32);
                array[[0, 0, y, x]] = (pixel[0] as f32 - norm_val) / norm_val;
            }
        }

        array
    }
}

impl FeatureExtractor for OnnxFeatureExtractor {
    fn extract(&self, region: &FaceRegion) -> Result<Option<Embedding>> {
        let resized = region.image.resize_exact(
            self.config.extractor.input_size,
            self.config.extractor.input_size,
            FilterType::Triangle,
        );

        let input_array = self.preprocess_face(&resized);
        let cow_array = CowArray::from(input_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;

        let outputs = self.session.run(vec![input_tensor])?;

        let embedding = outputs[0]
            .try_extract::<f32>()?
            .view()
            .to_owned()
            .into_raw_vec();
        if embedding.is_empty() {
            return Ok(None);
        }

        Ok(Some(embedding))
    }
}
