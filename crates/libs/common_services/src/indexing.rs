use crate::vector_index::FaceIndex;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::eyre::{Result, WrapErr};
use common_types::{FacePayload, FaceRecord, ObjectMetadata, ObjectRef, face_record_id};
use face_engine::{AnalyzedFace, FaceEngine};
use image::RgbImage;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where a frame came from.
#[derive(Debug, Clone)]
pub struct FaceContext {
    pub object: ObjectRef,
    /// `None` for still images.
    pub frame_index: Option<u64>,
    pub metadata: ObjectMetadata,
}

impl FaceContext {
    #[must_use]
    pub const fn new(object: ObjectRef, metadata: ObjectMetadata) -> Self {
        Self {
            object,
            frame_index: None,
            metadata,
        }
    }

    #[must_use]
    pub fn with_frame(&self, frame_index: u64) -> Self {
        Self {
            frame_index: Some(frame_index),
            ..self.clone()
        }
    }
}

/// Result of indexing one image or frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexedFaces {
    /// Ids written and still live in the index.
    pub ids: Vec<Uuid>,
    /// The object disappeared or its job was cancelled around the write.
    pub fenced: bool,
}

impl IndexedFaces {
    #[must_use]
    pub fn count(&self) -> usize {
        self.ids.len()
    }
}

/// Decides whether records for an object may be written right now.
#[async_trait]
pub trait WriteFence: Send + Sync {
    async fn allows_write(&self, object: &ObjectRef) -> Result<bool>;
}

/// Always allows writes. Used where no deletion can race, like tests and tools.
pub struct NoFence;

#[async_trait]
impl WriteFence for NoFence {
    async fn allows_write(&self, _object: &ObjectRef) -> Result<bool> {
        Ok(true)
    }
}

#[must_use]
pub fn build_records(
    faces: &[AnalyzedFace],
    context: &FaceContext,
    processed_at: DateTime<Utc>,
) -> Vec<FaceRecord> {
    faces
        .iter()
        .filter(|face| face.bbox.is_valid())
        .map(|face| FaceRecord {
            id: face_record_id(
                &context.object.bucket,
                &context.object.key,
                context.frame_index,
                face.face_index,
            ),
            embedding: face.embedding.clone(),
            payload: FacePayload {
                bucket: context.object.bucket.clone(),
                object_key: context.object.key.clone(),
                source_url: context.metadata.source_url.clone(),
                media_url: context.metadata.media_url.clone(),
                frame_index: context.frame_index,
                bbox: face.bbox,
                confidence: face.confidence,
                landmarks: face.landmarks,
                face_index: face.face_index,
                processed_at,
            },
        })
        .collect()
}

/// Detects faces in `image`, embeds them and upserts them as one batch.
///
/// Nothing is written when no face is found. The fence is consulted before the
/// upsert and again after it; when the object is gone by then, the records just
/// written for it are deleted again.
pub async fn detect_and_embed(
    engine: &Arc<FaceEngine>,
    index: &dyn FaceIndex,
    fence: &dyn WriteFence,
    image: RgbImage,
    context: &FaceContext,
) -> Result<IndexedFaces> {
    let worker_engine = Arc::clone(engine);
    let faces = tokio::task::spawn_blocking(move || worker_engine.analyze(&image, true))
        .await
        .wrap_err("Face analysis task failed")?;

    if faces.is_empty() {
        debug!(
            "No faces in {} (frame {:?})",
            context.object, context.frame_index
        );
        return Ok(IndexedFaces::default());
    }

    let records = build_records(&faces, context, Utc::now());
    if records.is_empty() {
        return Ok(IndexedFaces::default());
    }

    if !fence.allows_write(&context.object).await? {
        info!(
            "Not writing {} face(s) for {}, the object is gone or its job was cancelled",
            records.len(),
            context.object
        );
        return Ok(IndexedFaces {
            ids: Vec::new(),
            fenced: true,
        });
    }

    index
        .upsert(&records)
        .await
        .wrap_err_with(|| format!("Failed to upsert faces for {}", context.object))?;

    if !fence.allows_write(&context.object).await? {
        warn!(
            "{} disappeared while its faces were written, removing them again",
            context.object
        );
        index.delete_where(&context.object).await?;
        return Ok(IndexedFaces {
            ids: Vec::new(),
            fenced: true,
        });
    }

    Ok(IndexedFaces {
        ids: records.iter().map(|r| r.id).collect(),
        fenced: false,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::vector_index::InMemoryFaceIndex;
    use common_types::BoundingBox;
    use face_engine::{
        DetectedFace, FaceBox, FaceDetector, FaceEmbedder, InferenceError, RetryPolicy,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    pub struct FixedDetector(pub Vec<DetectedFace>);

    impl FaceDetector for FixedDetector {
        fn detect(&mut self, _image: &RgbImage) -> Result<Vec<DetectedFace>, InferenceError> {
            Ok(self.0.clone())
        }
    }

    /// Embeds a box as a unit vector pointing at `(x1, y1)`, padded with zeros.
    pub struct PositionEmbedder(pub usize);

    impl FaceEmbedder for PositionEmbedder {
        fn dimension(&self) -> usize {
            self.0
        }

        fn embed(
            &mut self,
            _image: &RgbImage,
            bbox: &BoundingBox,
        ) -> Result<Vec<f32>, InferenceError> {
            let mut v = vec![0.0; self.0];
            v[0] = bbox.x1 as f32 + 1.0;
            v[1] = bbox.y1 as f32 + 1.0;
            Ok(face_engine::l2_normalize(v))
        }
    }

    pub fn detected(x1: f32, y1: f32, x2: f32, y2: f32) -> DetectedFace {
        DetectedFace {
            bbox: FaceBox { x1, y1, x2, y2 },
            landmarks: [[x1, y1]; 5],
            confidence: 0.95,
        }
    }

    pub fn test_engine(faces: Vec<DetectedFace>) -> Arc<FaceEngine> {
        Arc::new(FaceEngine::new(
            Box::new(FixedDetector(faces)),
            Box::new(PositionEmbedder(4)),
            RetryPolicy::new(1, Duration::ZERO),
            1024,
        ))
    }

    fn context(key: &str) -> FaceContext {
        FaceContext::new(ObjectRef::new("scraped", key), ObjectMetadata::default())
    }

    /// Allows the first `n` checks, then reports the object as gone.
    struct Countdown(AtomicUsize);

    #[async_trait]
    impl WriteFence for Countdown {
        async fn allows_write(&self, _object: &ObjectRef) -> Result<bool> {
            let left = self.0.load(Ordering::SeqCst);
            if left == 0 {
                return Ok(false);
            }
            self.0.store(left - 1, Ordering::SeqCst);
            Ok(true)
        }
    }

    #[tokio::test]
    async fn zero_faces_performs_no_upsert() -> color_eyre::Result<()> {
        let index = InMemoryFaceIndex::new(4);
        let result = detect_and_embed(
            &test_engine(vec![]),
            &index,
            &NoFence,
            RgbImage::new(32, 32),
            &context("empty.jpg"),
        )
        .await?;

        assert_eq!(result.count(), 0);
        assert_eq!(index.upsert_calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_boxes_are_left_out_of_the_batch() -> color_eyre::Result<()> {
        let index = InMemoryFaceIndex::new(4);
        let engine = test_engine(vec![
            detected(1.0, 1.0, 10.0, 10.0),
            detected(20.0, 1.0, 5.0, 10.0),
            detected(2.0, 30.0, 12.0, 20.0),
        ]);
        let result = detect_and_embed(
            &engine,
            &index,
            &NoFence,
            RgbImage::new(64, 64),
            &context("group.png"),
        )
        .await?;

        assert_eq!(result.count(), 1);
        assert_eq!(index.upsert_calls(), 1);
        assert_eq!(
            result.ids,
            vec![face_record_id("scraped", "group.png", None, 0)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn rerun_produces_identical_ids_without_duplicates() -> color_eyre::Result<()> {
        let index = InMemoryFaceIndex::new(4);
        let engine = test_engine(vec![
            detected(1.0, 1.0, 10.0, 10.0),
            detected(20.0, 20.0, 30.0, 30.0),
        ]);
        let ctx = context("clip.mp4").with_frame(30);

        let first = detect_and_embed(&engine, &index, &NoFence, RgbImage::new(64, 64), &ctx).await?;
        let second =
            detect_and_embed(&engine, &index, &NoFence, RgbImage::new(64, 64), &ctx).await?;

        assert_eq!(first.ids, second.ids);
        assert_eq!(index.len().await, 2);
        Ok(())
    }

    #[tokio::test]
    async fn delete_where_clears_every_record_of_the_owner() -> color_eyre::Result<()> {
        let index = InMemoryFaceIndex::new(4);
        let engine = test_engine(vec![detected(1.0, 1.0, 10.0, 10.0)]);
        let ctx = context("clip.mp4");
        for frame in [0, 30, 60] {
            detect_and_embed(
                &engine,
                &index,
                &NoFence,
                RgbImage::new(64, 64),
                &ctx.with_frame(frame),
            )
            .await?;
        }
        assert_eq!(index.count_for(&ctx.object).await?, 3);

        index.delete_where(&ctx.object).await?;
        assert_eq!(index.count_for(&ctx.object).await?, 0);

        // Cleanup before a late creation job: the fence keeps it from resurrecting records.
        let gone = Countdown(AtomicUsize::new(0));
        let late =
            detect_and_embed(&engine, &index, &gone, RgbImage::new(64, 64), &ctx).await?;
        assert!(late.fenced);
        assert_eq!(index.count_for(&ctx.object).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn deletion_during_upsert_is_rolled_back() -> color_eyre::Result<()> {
        let index = InMemoryFaceIndex::new(4);
        let engine = test_engine(vec![detected(1.0, 1.0, 10.0, 10.0)]);
        let ctx = context("a.jpg");

        let fence = Countdown(AtomicUsize::new(1));
        let result = detect_and_embed(&engine, &index, &fence, RgbImage::new(64, 64), &ctx).await?;

        assert!(result.fenced);
        assert_eq!(index.upsert_calls(), 1);
        assert_eq!(index.count_for(&ctx.object).await?, 0);
        Ok(())
    }

    #[test]
    fn records_carry_context_metadata() {
        let faces = vec![AnalyzedFace {
            face_index: 3,
            bbox: BoundingBox::new(1, 2, 3, 4),
            landmarks: common_types::FacialLandmarks::default(),
            confidence: 0.8,
            embedding: vec![1.0, 0.0],
        }];
        let mut ctx = context("x.jpg");
        ctx.metadata.source_url = Some("https://example.com".to_owned());
        let records = build_records(&faces, &ctx.with_frame(7), Utc::now());

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payload.frame_index, Some(7));
        assert_eq!(records[0].payload.face_index, 3);
        assert_eq!(
            records[0].payload.source_url.as_deref(),
            Some("https://example.com")
        );
        assert_eq!(records[0].id, face_record_id("scraped", "x.jpg", Some(7), 3));
    }
}
