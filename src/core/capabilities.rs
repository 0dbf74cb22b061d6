use crate::common::error::Result;
use image::DynamicImage;

pub type Embedding = Vec<f32>;

#[derive(Debug, Clone)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

/// Cropped face with the bounding box it came from, in original image
/// coordinates.
pub struct FaceRegion {
    pub image: DynamicImage,
    pub bbox: BoundingBox,
}

impl FaceRegion {
    /// Region covering a whole image, used when the stored image is already
    /// a face crop.
    pub fn whole(image: DynamicImage) -> Self {
        let (w, h) = (image.width() as f32, image.height() as f32);
        Self {
            image,
            bbox: BoundingBox {
                x1: 0.0,
                y1: 0.0,
                x2: w,
                y2: h,
                confidence: 1.0,
            },
        }
    }
}

/// Finds the most prominent face in a raw image, or nothing.
pub trait FaceLocalizer: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Result<Option<FaceRegion>>;
}

/// Turns a face region into a fixed-length embedding, or nothing when no
/// features can be computed.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, region: &FaceRegion) -> Result<Option<Embedding>>;
}

/// External liveness capability. Returns the liveness probability in [0, 1];
/// transport or service failures surface as `LivenessUnavailable`.
pub trait LivenessGate: Send + Sync {
    fn check(&self, region: &FaceRegion) -> Result<f32>;
}
