use crate::retinaface::{load_session, runtime_error};
use crate::{FaceEmbedder, InferenceError, l2_normalize};
use common_types::BoundingBox;
use image::RgbImage;
use image::imageops::{self, FilterType};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use tracing::info;

const INPUT_SIZE: u32 = 112;

/// SFace recognition model: 112x112 RGB crop in, identity vector out.
pub struct SFaceEmbedder {
    session: Session,
    output_name: String,
    dimension: usize,
}

impl SFaceEmbedder {
    pub fn new(
        model_path: &Path,
        dimension: usize,
        intra_threads: usize,
    ) -> Result<Self, InferenceError> {
        info!("Loading face embedding model from {:?}", model_path);
        let session = load_session(model_path, intra_threads)?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| InferenceError::Model("embedding model has no outputs".into()))?;
        Ok(Self {
            session,
            output_name,
            dimension,
        })
    }
}

impl FaceEmbedder for SFaceEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&mut self, image: &RgbImage, bbox: &BoundingBox) -> Result<Vec<f32>, InferenceError> {
        let region = bbox.clamped(image.width(), image.height());
        if region.width() <= 0 || region.height() <= 0 {
            return Err(InferenceError::InvalidInput(format!(
                "face region {region:?} is empty inside {}x{} image",
                image.width(),
                image.height()
            )));
        }
        let crop = imageops::crop_imm(
            image,
            region.x1 as u32,
            region.y1 as u32,
            region.width() as u32,
            region.height() as u32,
        )
        .to_image();
        let resized = imageops::resize(&crop, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);

        let size = INPUT_SIZE as usize;
        let mut input = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                input[[0, c, y, x]] = f32::from(pixel.0[c]);
            }
        }

        let tensor = TensorRef::from_array_view(input.view()).map_err(runtime_error)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(runtime_error)?;
        let value = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| InferenceError::Model("embedding output missing".into()))?;
        let (_, data) = value.try_extract_tensor::<f32>().map_err(runtime_error)?;
        if data.len() != self.dimension {
            return Err(InferenceError::ShapeMismatch(format!(
                "embedding has {} values, expected {}",
                data.len(),
                self.dimension
            )));
        }
        Ok(l2_normalize(data.to_vec()))
    }
}
