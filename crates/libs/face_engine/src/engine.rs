use crate::{
    DetectedFace, FaceDetector, FaceEmbedder, InferenceError, RetinaFaceDetector, RetryPolicy,
    SFaceEmbedder,
};
use app_state::FaceSettings;
use common_types::{BoundingBox, FacialLandmarks};
use image::RgbImage;
use image::imageops::{self, FilterType};
use std::cell::RefCell;
use std::sync::{Mutex, PoisonError};
use tracing::{error, info, warn};

/// A detected face with a valid box and a computed embedding, in original image pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedFace {
    /// Position in the detector output, stable for identical input.
    pub face_index: u32,
    pub bbox: BoundingBox,
    pub landmarks: FacialLandmarks,
    pub confidence: f32,
    pub embedding: Vec<f32>,
}

/// Detector and embedder shared by all jobs of one worker.
///
/// All methods block; call them from `spawn_blocking` in async code.
pub struct FaceEngine {
    detector: Mutex<Box<dyn FaceDetector>>,
    embedder: Mutex<Box<dyn FaceEmbedder>>,
    retry: RetryPolicy,
    max_image_side: u32,
    dimension: usize,
}

impl FaceEngine {
    pub fn new(
        detector: Box<dyn FaceDetector>,
        embedder: Box<dyn FaceEmbedder>,
        retry: RetryPolicy,
        max_image_side: u32,
    ) -> Self {
        let dimension = embedder.dimension();
        Self {
            detector: Mutex::new(detector),
            embedder: Mutex::new(embedder),
            retry,
            max_image_side,
            dimension,
        }
    }

    /// Loads the ONNX detector and embedder named in the settings.
    pub fn from_settings(settings: &FaceSettings, dimension: usize) -> Result<Self, InferenceError> {
        let detector = RetinaFaceDetector::new(
            &settings.detector_model,
            settings.detector_input_size,
            settings.confidence_threshold,
            settings.nms_threshold,
            settings.intra_threads,
        )?;
        let embedder = SFaceEmbedder::new(&settings.embedder_model, dimension, settings.intra_threads)?;
        info!("Face engine ready ({dimension}-d embeddings)");
        Ok(Self::new(
            Box::new(detector),
            Box::new(embedder),
            RetryPolicy::from(&settings.retry),
            settings.max_image_side,
        ))
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Runs detection under the retry policy. Failures are logged and yield no faces.
    pub fn detect(&self, image: &RgbImage) -> Vec<DetectedFace> {
        let detector = RefCell::new(self.detector.lock().unwrap_or_else(PoisonError::into_inner));
        let result = self.retry.run(
            || detector.borrow_mut().detect(image),
            || {
                if let Err(e) = detector.borrow_mut().release_cached_state() {
                    warn!("Failed to release detector state: {e}");
                }
            },
        );
        match result {
            Ok(faces) => faces,
            Err(e) => {
                error!("Face detection failed, treating image as faceless: {e}");
                Vec::new()
            }
        }
    }

    /// Detects faces and embeds every face with a valid box.
    ///
    /// With `downscale`, detection runs on a copy whose longest side is at most
    /// `max_image_side`; boxes and landmarks are mapped back to `image` and
    /// embeddings are computed on `image` itself.
    pub fn analyze(&self, image: &RgbImage, downscale: bool) -> Vec<AnalyzedFace> {
        let (width, height) = image.dimensions();
        let longest = width.max(height);
        let resized;
        let shrink = downscale && self.max_image_side > 0 && longest > self.max_image_side;
        let (detect_on, to_original) = if shrink {
            let factor = self.max_image_side as f32 / longest as f32;
            let new_width = ((width as f32 * factor).round() as u32).max(1);
            let new_height = ((height as f32 * factor).round() as u32).max(1);
            resized = imageops::resize(image, new_width, new_height, FilterType::Triangle);
            (&resized, 1.0 / factor)
        } else {
            (image, 1.0)
        };

        let detections = self.detect(detect_on);
        if detections.is_empty() {
            return Vec::new();
        }

        let mut embedder = self.embedder.lock().unwrap_or_else(PoisonError::into_inner);
        let mut faces = Vec::with_capacity(detections.len());
        for (face_index, detection) in detections.iter().enumerate() {
            let face_index = face_index as u32;
            let b = detection.bbox;
            let bbox = BoundingBox::new(
                (b.x1 * to_original).round() as i32,
                (b.y1 * to_original).round() as i32,
                (b.x2 * to_original).round() as i32,
                (b.y2 * to_original).round() as i32,
            );
            if !bbox.is_valid() {
                warn!("Skipping face {face_index} with malformed box {bbox:?}");
                continue;
            }
            let bbox = bbox.clamped(width, height);

            match embedder.embed(image, &bbox) {
                Ok(embedding) if embedding.len() == self.dimension => faces.push(AnalyzedFace {
                    face_index,
                    bbox,
                    landmarks: FacialLandmarks::from_points(detection.landmarks).scaled(to_original),
                    confidence: detection.confidence,
                    embedding,
                }),
                Ok(embedding) => warn!(
                    "Skipping face {face_index}: embedding has {} values, expected {}",
                    embedding.len(),
                    self.dimension
                ),
                Err(e) => warn!("Skipping face {face_index}, embedding failed: {e}"),
            }
        }
        faces
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FaceBox;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Detector returning a fixed list of faces, failing first `failures` calls.
    pub struct ScriptedDetector {
        pub faces: Vec<DetectedFace>,
        pub failures: Vec<InferenceError>,
        pub seen_sizes: Arc<Mutex<Vec<(u32, u32)>>>,
        pub releases: Arc<AtomicUsize>,
    }

    impl ScriptedDetector {
        pub fn new(faces: Vec<DetectedFace>) -> Self {
            Self {
                faces,
                failures: Vec::new(),
                seen_sizes: Arc::default(),
                releases: Arc::default(),
            }
        }
    }

    impl FaceDetector for ScriptedDetector {
        fn detect(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, InferenceError> {
            self.seen_sizes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(image.dimensions());
            if !self.failures.is_empty() {
                return Err(self.failures.remove(0));
            }
            Ok(self.faces.clone())
        }

        fn release_cached_state(&mut self) -> Result<(), InferenceError> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Embedder encoding the box position, failing for boxes wider than `fail_wider_than`.
    pub struct BoxEmbedder {
        pub dimension: usize,
        pub fail_wider_than: i32,
    }

    impl FaceEmbedder for BoxEmbedder {
        fn dimension(&self) -> usize {
            self.dimension
        }

        fn embed(&mut self, _image: &RgbImage, bbox: &BoundingBox) -> Result<Vec<f32>, InferenceError> {
            if bbox.width() > self.fail_wider_than {
                return Err(InferenceError::InvalidInput("too wide".into()));
            }
            let mut v = vec![0.0; self.dimension];
            v[0] = bbox.x1 as f32;
            v[1] = bbox.y1 as f32;
            Ok(v)
        }
    }

    pub fn face(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> DetectedFace {
        DetectedFace {
            bbox: FaceBox { x1, y1, x2, y2 },
            landmarks: [[x1, y1]; 5],
            confidence,
        }
    }

    fn engine(detector: ScriptedDetector, max_side: u32) -> FaceEngine {
        FaceEngine::new(
            Box::new(detector),
            Box::new(BoxEmbedder {
                dimension: 4,
                fail_wider_than: 500,
            }),
            RetryPolicy::new(3, Duration::ZERO),
            max_side,
        )
    }

    #[test]
    fn no_detections_means_no_faces() {
        let engine = engine(ScriptedDetector::new(vec![]), 1024);
        assert!(engine.analyze(&RgbImage::new(64, 64), true).is_empty());
    }

    #[test]
    fn malformed_boxes_are_skipped_but_keep_indices() {
        let detector = ScriptedDetector::new(vec![
            face(10.0, 10.0, 40.0, 40.0, 0.99),
            face(50.0, 10.0, 20.0, 40.0, 0.98),
            face(5.0, 5.0, 25.0, 30.0, 0.97),
        ]);
        let faces = engine(detector, 1024).analyze(&RgbImage::new(100, 100), true);
        let indices: Vec<u32> = faces.iter().map(|f| f.face_index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(faces[0].bbox, BoundingBox::new(10, 10, 40, 40));
    }

    #[test]
    fn failed_embedding_skips_only_that_face() {
        let detector = ScriptedDetector::new(vec![
            face(0.0, 0.0, 900.0, 900.0, 0.99),
            face(10.0, 10.0, 30.0, 30.0, 0.95),
        ]);
        let faces = engine(detector, 2048).analyze(&RgbImage::new(1000, 1000), true);
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].face_index, 1);
    }

    #[test]
    fn downscaled_detections_map_back_to_original_pixels() {
        let detector = ScriptedDetector::new(vec![face(100.0, 50.0, 200.0, 150.0, 0.9)]);
        let seen = detector.seen_sizes.clone();
        let faces = engine(detector, 1000).analyze(&RgbImage::new(2000, 1000), true);

        let sizes = seen.lock().unwrap_or_else(PoisonError::into_inner).clone();
        assert_eq!(sizes, vec![(1000, 500)]);
        assert_eq!(faces[0].bbox, BoundingBox::new(200, 100, 400, 300));
        assert!((faces[0].landmarks.nose[0] - 200.0).abs() < 1e-3);
    }

    #[test]
    fn queries_are_not_downscaled() {
        let detector = ScriptedDetector::new(vec![]);
        let seen = detector.seen_sizes.clone();
        engine(detector, 1000).analyze(&RgbImage::new(2000, 1000), false);
        let sizes = seen.lock().unwrap_or_else(PoisonError::into_inner).clone();
        assert_eq!(sizes, vec![(2000, 1000)]);
    }

    #[test]
    fn transient_failures_release_state_and_retry() {
        let mut detector = ScriptedDetector::new(vec![face(1.0, 1.0, 20.0, 20.0, 0.9)]);
        detector.failures = vec![
            InferenceError::OutOfMemory("cuda".into()),
            InferenceError::ShapeMismatch("pad".into()),
        ];
        let releases = detector.releases.clone();
        let faces = engine(detector, 1024).analyze(&RgbImage::new(64, 64), true);
        assert_eq!(faces.len(), 1);
        assert_eq!(releases.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn fatal_failure_yields_no_faces() {
        let mut detector = ScriptedDetector::new(vec![face(1.0, 1.0, 20.0, 20.0, 0.9)]);
        detector.failures = vec![InferenceError::Model("broken".into())];
        let releases = detector.releases.clone();
        let faces = engine(detector, 1024).analyze(&RgbImage::new(64, 64), true);
        assert!(faces.is_empty());
        assert_eq!(releases.load(Ordering::SeqCst), 0);
    }
}
