use crate::InferenceError;
use common_types::BoundingBox;
use image::RgbImage;

pub trait FaceEmbedder: Send {
    /// Length of every vector returned by [`FaceEmbedder::embed`].
    fn dimension(&self) -> usize;

    /// Computes the identity embedding of the face inside `bbox` of the full `image`.
    fn embed(&mut self, image: &RgbImage, bbox: &BoundingBox) -> Result<Vec<f32>, InferenceError>;
}

/// Scales a vector to unit length; zero vectors are returned unchanged.
pub fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}
