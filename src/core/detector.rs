use crate::common::error::{FaceGateError, Result};
use crate::common::Config;
use crate::core::capabilities::{BoundingBox, FaceLocalizer, FaceRegion};
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array4, CowArray};
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder, Value};
use std::sync::Arc;

/// ONNX-backed face localizer. The detector model is consumed as a black
/// box producing candidate boxes; we keep only the best box above the
/// configured confidence.
pub struct OnnxFaceLocalizer {
    session: Session,
    _environment: Arc<Environment>,
    config: Config,
}

impl OnnxFaceLocalizer {
    pub fn new(config: &Config) -> Result<Self> {
        let environment = Arc::new(
            Environment::builder()
                .with_name("face_localizer")
                .build()
                .map_err(|e| FaceGateError::Model(format!("Failed to create environment: {}", e)))?,
        );

        let model_path = &config.models.detector_path;
        if !model_path.exists() {
            return Err(FaceGateError::Model(format!(
                "Detector model not found at: {:?}",
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

    fn image_to_array(&self, img: &DynamicImage) -> Array4<f32> {
        let rgb = img.to_rgb8();
        let width = rgb.width() as usize;
        let height = rgb.height() as usize;
        let mut array = Array4::<f32>::zeros((1, 3, height, width));

        let norm_factor = 1.0 / 255.0;
        for y in 0..height {
            for x in 0..width {
                let pixel = rgb.get_pixel(x as u32, y as u32);
                array[[0, 0, y, x]] = pixel[0] as f32 * norm_factor;
                array[[0, 1, y, x]] = pixel[1] as f32 * norm_factor;
                array[[0, 2, y, x]] = pixel[2] as f32 * norm_factor;
            }
        }

        array
    }

    fn parse_detections(&self, outputs: &[Value]) -> Result<Vec<BoundingBox>> {
        let mut boxes = Vec::new();

        if outputs.is_empty() {
            return Ok(boxes);
        }

        let output = outputs[0].try_extract::<f32>()?.view().to_owned();
        let output_array = match output.as_slice() {
            Some(slice) => slice,
            None => return Ok(boxes),
        };
        let shape = output.shape().to_vec();

        // Detector output is either [1, N, 5] or the transposed [1, 5, N],
        // rows of [x_center, y_center, width, height, confidence].
        let (num_predictions, prediction_length, is_transposed) = if shape.len() >= 3 {
            if shape[2] > shape[1] && shape[1] <= 10 {
                (shape[2], shape[1], true)
            } else {
                (shape[1], shape[2], false)
            }
        } else if shape.len() == 2 {
            (shape[0], shape[1], false)
        } else {
            tracing::warn!("Unexpected detector output shape: {:?}", shape);
            return Ok(boxes);
        };

        let input_w = self.config.detector.input_width as f32;
        let input_h = self.config.detector.input_height as f32;

        for i in 0..num_predictions {
            let (xc_raw, yc_raw, w_raw, h_raw, confidence) = if is_transposed {
                let stride = num_predictions;
                (
                    output_array[i],
                    output_array[stride + i],
                    output_array[2 * stride + i],
                    output_array[3 * stride + i],
                    if prediction_length > 4 {
                        output_array[4 * stride + i]
                    } else {
                        0.0
                    },
                )
            } else {
                let base_idx = i * prediction_length;
                (
                    output_array[base_idx],
                    output_array[base_idx + 1],
                    output_array[base_idx + 2],
                    output_array[base_idx + 3],
                    if prediction_length > 4 {
                        output_array[base_idx + 4]
                    } else {
                        0.0
                    },
                )
            };

            // Coordinates may arrive normalized or already in pixel space.
            let scale = if xc_raw > 1.0 || yc_raw > 1.0 || w_raw > 1.0 || h_raw > 1.0 {
                1.0
            } else {
                input_w
            };

            let x_center = xc_raw * scale;
            let y_center = yc_raw * scale;
            let width = w_raw * scale;
            let height = h_raw * scale;

            if confidence > 0.001 {
                let x1 = (x_center - width / 2.0).max(0.0);
                let y1 = (y_center - height / 2.0).max(0.0);
                let x2 = (x_center + width / 2.0).min(input_w);
                let y2 = (y_center + height / 2.0).min(input_h);

                if x2 > x1 && y2 > y1 && (x2 - x1) > 10.0 && (y2 - y1) > 10.0 {
                    boxes.push(BoundingBox {
                        x1,
                        y1,
                        x2,
                        y2,
                        confidence,
                    });
                }
            }
        }

        boxes = apply_nms(boxes, 0.45);
        boxes.retain(|b| b.confidence >= self.config.detector.detection_confidence);
        boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        Ok(boxes)
    }
}

impl FaceLocalizer for OnnxFaceLocalizer {
    fn detect(&self, image: &DynamicImage) -> Result<Option<FaceRegion>> {
        let orig_width = image.width() as f32;
        let orig_height = image.height() as f32;

        let img_array = if image.width() == self.config.detector.input_width
            && image.height() == self.config.detector.input_height
        {
            self.image_to_array(image)
        } else {
            let resized = image.resize_exact(
                self.config.detector.input_width,
                self.config.detector.input_height,
                FilterType::Nearest,
            );
            self.image_to_array(&resized)
        };

        let cow_array = CowArray::from(img_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let mut boxes = self.parse_detections(&outputs)?;

        // Scale back to original image coordinates.
        let scale_x = orig_width / self.config.detector.input_width as f32;
        let scale_y = orig_height / self.config.detector.input_height as f32;
        for b in &mut boxes {
            b.x1 *= scale_x;
            b.x2 *= scale_x;
            b.y1 *= scale_y;
            b.y2 *= scale_y;
        }

        let best = match boxes.into_iter().next() {
            Some(b) => b,
            None => return Ok(None),
        };

        let x = best.x1.max(0.0) as u32;
        let y = best.y1.max(0.0) as u32;
        let width = (best.x2 - best.x1).max(1.0) as u32;
        let height = (best.y2 - best.y1).max(1.0) as u32;
        let crop = image.crop_imm(x, y, width, height);

        Ok(Some(FaceRegion {
            image: crop,
            bbox: best,
        }))
    }
}

fn apply_nms(mut boxes: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    if boxes.is_empty() {
        return boxes;
    }

    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep = Vec::new();
    let mut indices: Vec<usize> = (0..boxes.len()).collect();

    while !indices.is_empty() {
        let i = indices[0];
        keep.push(boxes[i].clone());

        indices = indices[1..]
            .iter()
            .filter(|&&j| calculate_iou(&boxes[i], &boxes[j]) < iou_threshold)
            .copied()
            .collect();
    }

    keep
}

fn calculate_iou(box1: &BoundingBox, box2: &BoundingBox) -> f32 {
    let x1 = box1.x1.max(box2.x1);
    let y1 = box1.y1.max(box2.y1);
    let x2 = box1.x2.min(box2.x2);
    let y2 = box1.y2.min(box2.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1.x2 - box1.x1) * (box1.y2 - box1.y1);
    let area2 = (box2.x2 - box2.x1) * (box2.y2 - box2.y1);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
