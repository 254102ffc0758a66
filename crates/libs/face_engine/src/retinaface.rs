use crate::anchors::{Prior, decode_box, decode_landmarks, generate_priors};
use crate::nms::non_max_suppression;
use crate::{DetectedFace, FaceBox, FaceDetector, InferenceError};
use image::RgbImage;
use image::imageops::{self, FilterType};
use ndarray::Array4;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::TensorRef;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const MEAN_BGR: [f32; 3] = [104.0, 117.0, 123.0];

pub(crate) fn runtime_error(error: impl Display) -> InferenceError {
    InferenceError::from_runtime(error.to_string())
}

pub(crate) fn load_session(path: &Path, intra_threads: usize) -> Result<Session, InferenceError> {
    let builder = Session::builder().map_err(runtime_error)?;
    let builder = builder
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(runtime_error)?;
    let builder = builder
        .with_intra_threads(intra_threads)
        .map_err(runtime_error)?;
    builder.commit_from_file(path).map_err(runtime_error)
}

/// RetinaFace detector exported to ONNX with a fixed square input.
///
/// Outputs are recognized by their last dimension: 4 for box regressions, 2 for
/// class scores (softmaxed) and 10 for landmark regressions.
pub struct RetinaFaceDetector {
    session: Session,
    output_names: Vec<String>,
    model_path: PathBuf,
    intra_threads: usize,
    input_size: u32,
    priors: Vec<Prior>,
    confidence_threshold: f32,
    nms_threshold: f32,
}

impl RetinaFaceDetector {
    pub fn new(
        model_path: &Path,
        input_size: u32,
        confidence_threshold: f32,
        nms_threshold: f32,
        intra_threads: usize,
    ) -> Result<Self, InferenceError> {
        info!("Loading RetinaFace model from {:?}", model_path);
        if input_size == 0 {
            return Err(InferenceError::InvalidInput(
                "detector input size must be positive".into(),
            ));
        }
        let session = load_session(model_path, intra_threads)?;
        let output_names = session.outputs.iter().map(|o| o.name.clone()).collect();
        let priors = generate_priors(input_size, input_size);
        info!(
            "RetinaFace loaded (input {}x{}, {} priors)",
            input_size,
            input_size,
            priors.len()
        );

        Ok(Self {
            session,
            output_names,
            model_path: model_path.to_path_buf(),
            intra_threads,
            input_size,
            priors,
            confidence_threshold,
            nms_threshold,
        })
    }

    /// Letterboxes the image into the square input in BGR mean-subtracted CHW layout.
    /// Returns the tensor and the resize factor applied to the image.
    fn preprocess(&self, image: &RgbImage) -> (Array4<f32>, f32) {
        let (width, height) = image.dimensions();
        let size = self.input_size;
        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
        let new_width = ((width as f32 * scale).round() as u32).clamp(1, size);
        let new_height = ((height as f32 * scale).round() as u32).clamp(1, size);
        let resized = imageops::resize(image, new_width, new_height, FilterType::Triangle);

        let mut input = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let [r, g, b] = pixel.0;
            let (x, y) = (x as usize, y as usize);
            input[[0, 0, y, x]] = f32::from(b) - MEAN_BGR[0];
            input[[0, 1, y, x]] = f32::from(g) - MEAN_BGR[1];
            input[[0, 2, y, x]] = f32::from(r) - MEAN_BGR[2];
        }
        (input, scale)
    }
}

impl FaceDetector for RetinaFaceDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, InferenceError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(InferenceError::InvalidInput("empty image".into()));
        }
        let (input, scale) = self.preprocess(image);
        let tensor = TensorRef::from_array_view(input.view()).map_err(runtime_error)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(runtime_error)?;

        let mut loc = None;
        let mut conf = None;
        let mut landm = None;
        for name in &self.output_names {
            let Some(value) = outputs.get(name.as_str()) else {
                continue;
            };
            let (shape, data) = value.try_extract_tensor::<f32>().map_err(runtime_error)?;
            match shape.last().copied() {
                Some(4) => loc = Some(data),
                Some(2) => conf = Some(data),
                Some(10) => landm = Some(data),
                _ => {}
            }
        }
        let (Some(loc), Some(conf), Some(landm)) = (loc, conf, landm) else {
            return Err(InferenceError::ShapeMismatch(format!(
                "expected box, score and landmark outputs, got {:?}",
                self.output_names
            )));
        };

        let n = self.priors.len();
        if loc.len() != n * 4 || conf.len() != n * 2 || landm.len() != n * 10 {
            return Err(InferenceError::ShapeMismatch(format!(
                "{} priors but outputs of length {}/{}/{}",
                n,
                loc.len(),
                conf.len(),
                landm.len()
            )));
        }

        let to_pixels = self.input_size as f32 / scale;
        let mut faces = Vec::new();
        for (i, prior) in self.priors.iter().enumerate() {
            let confidence = conf[i * 2 + 1];
            if confidence < self.confidence_threshold {
                continue;
            }
            let [x1, y1, x2, y2] = decode_box(prior, &loc[i * 4..i * 4 + 4]);
            let mut landmarks = decode_landmarks(prior, &landm[i * 10..i * 10 + 10]);
            for point in &mut landmarks {
                point[0] *= to_pixels;
                point[1] *= to_pixels;
            }
            faces.push(DetectedFace {
                bbox: FaceBox {
                    x1: x1 * to_pixels,
                    y1: y1 * to_pixels,
                    x2: x2 * to_pixels,
                    y2: y2 * to_pixels,
                },
                landmarks,
                confidence,
            });
        }

        let faces = non_max_suppression(faces, self.nms_threshold);
        debug!(
            "RetinaFace found {} faces in {}x{} image",
            faces.len(),
            image.width(),
            image.height()
        );
        Ok(faces)
    }

    fn release_cached_state(&mut self) -> Result<(), InferenceError> {
        info!("Reloading RetinaFace session from {:?}", self.model_path);
        self.session = load_session(&self.model_path, self.intra_threads)?;
        Ok(())
    }
}
