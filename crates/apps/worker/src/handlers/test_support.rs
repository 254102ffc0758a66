use common_types::BoundingBox;
use face_engine::{
    DetectedFace, FaceBox, FaceDetector, FaceEmbedder, FaceEngine, InferenceError, RetryPolicy,
    l2_normalize,
};
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

struct FixedDetector(Vec<DetectedFace>);

impl FaceDetector for FixedDetector {
    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<DetectedFace>, InferenceError> {
        Ok(self.0.clone())
    }
}

/// Embeds a box as the normalized direction of its top-left corner.
struct CornerEmbedder;

impl FaceEmbedder for CornerEmbedder {
    fn dimension(&self) -> usize {
        4
    }

    fn embed(&mut self, _image: &RgbImage, bbox: &BoundingBox) -> Result<Vec<f32>, InferenceError> {
        Ok(l2_normalize(vec![
            bbox.x1 as f32 + 1.0,
            bbox.y1 as f32 + 1.0,
            0.0,
            0.0,
        ]))
    }
}

pub fn detected(x1: f32, y1: f32, x2: f32, y2: f32) -> DetectedFace {
    DetectedFace {
        bbox: FaceBox { x1, y1, x2, y2 },
        landmarks: [[x1, y1]; 5],
        confidence: 0.97,
    }
}

pub fn engine_with(faces: Vec<DetectedFace>) -> Arc<FaceEngine> {
    Arc::new(FaceEngine::new(
        Box::new(FixedDetector(faces)),
        Box::new(CornerEmbedder),
        RetryPolicy::new(1, Duration::ZERO),
        1024,
    ))
}

pub fn png_bytes(width: u32, height: u32) -> color_eyre::Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    RgbImage::new(width, height).write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}
