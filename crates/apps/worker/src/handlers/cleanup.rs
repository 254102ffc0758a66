use crate::context::WorkerContext;
use color_eyre::Result;
use common_services::database::jobs::Job;
use common_services::vector_index::FaceIndex;
use common_types::{JobOutcome, ObjectRef};
use serde_json::json;
use tracing::info;

pub async fn handle(context: &WorkerContext, job: &Job) -> Result<JobOutcome> {
    remove_faces(context.index.as_ref(), &job.object()).await
}

/// Removes every face record owned by the object. Safe to repeat.
pub async fn remove_faces(index: &dyn FaceIndex, object: &ObjectRef) -> Result<JobOutcome> {
    let removed = index.delete_where(object).await?;
    info!("Removed {} face record(s) of {}", removed, object);
    Ok(JobOutcome::success(json!({ "faces_removed": removed })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{detected, engine_with};
    use common_services::indexing::{FaceContext, NoFence, detect_and_embed};
    use common_services::vector_index::InMemoryFaceIndex;
    use common_types::ObjectMetadata;
    use image::RgbImage;

    #[tokio::test]
    async fn cleanup_is_idempotent() -> Result<()> {
        let index = InMemoryFaceIndex::new(4);
        let object = ObjectRef::new("scraped", "clip.mp4");
        let engine = engine_with(vec![detected(1.0, 1.0, 10.0, 10.0)]);
        let base = FaceContext::new(object.clone(), ObjectMetadata::default());
        for frame in [0, 30] {
            detect_and_embed(&engine, &index, &NoFence, RgbImage::new(32, 32), &base.with_frame(frame))
                .await?;
        }

        let first = remove_faces(&index, &object).await?;
        let second = remove_faces(&index, &object).await?;

        assert_eq!(first.result, Some(json!({ "faces_removed": 2 })));
        assert_eq!(second.result, Some(json!({ "faces_removed": 0 })));
        assert_eq!(index.count_for(&object).await?, 0);
        Ok(())
    }
}
