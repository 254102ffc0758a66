use crate::context::WorkerContext;
use crate::fence::JobFence;
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use common_services::database::jobs::Job;
use common_services::indexing::{FaceContext, WriteFence, detect_and_embed};
use common_services::object_store::ObjectStore;
use common_services::vector_index::FaceIndex;
use common_types::{JobOutcome, ObjectRef};
use face_engine::FaceEngine;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn handle(context: &WorkerContext, job: &Job) -> Result<JobOutcome> {
    let fence = JobFence::new(&context.pool, context.store.as_ref(), job.id);
    index_image(
        &context.engine,
        context.index.as_ref(),
        context.store.as_ref(),
        &fence,
        &job.object(),
    )
    .await
}

/// Indexes the faces of one stored image and prunes faces it no longer has.
///
/// Undecodable bytes give an error outcome rather than an `Err`, so the job is
/// not retried.
pub async fn index_image(
    engine: &Arc<FaceEngine>,
    index: &dyn FaceIndex,
    store: &dyn ObjectStore,
    fence: &dyn WriteFence,
    object: &ObjectRef,
) -> Result<JobOutcome> {
    let Some(head) = store.head(object).await? else {
        return Ok(JobOutcome::skipped("object no longer exists"));
    };
    let bytes = store
        .get(object)
        .await
        .wrap_err_with(|| format!("Failed to fetch {object}"))?;

    let decoded = tokio::task::spawn_blocking(move || {
        image::load_from_memory(&bytes).map(|img| img.to_rgb8())
    })
    .await?;
    let image = match decoded {
        Ok(image) => image,
        Err(e) => {
            warn!("Cannot decode image {}: {}", object, e);
            return Ok(JobOutcome::error(format!("undecodable image: {e}")));
        }
    };

    let context = FaceContext::new(object.clone(), head.metadata);
    let indexed = detect_and_embed(engine, index, fence, image, &context).await?;
    if indexed.fenced {
        return Ok(JobOutcome::skipped("object removed while processing"));
    }

    let pruned = index.prune(object, &indexed.ids).await?;
    info!(
        "Indexed {} face(s) for {}, pruned {} stale",
        indexed.count(),
        object,
        pruned
    );
    Ok(JobOutcome::success(json!({
        "faces_indexed": indexed.count(),
        "faces_pruned": pruned,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fence::ExistenceFence;
    use crate::handlers::test_support::{detected, engine_with, png_bytes};
    use common_services::object_store::InMemoryObjectStore;
    use common_services::vector_index::{InMemoryFaceIndex, is_fatal_index_error};
    use common_types::{ObjectMetadata, OutcomeStatus};

    #[tokio::test]
    async fn indexes_faces_with_object_metadata() -> Result<()> {
        let store = InMemoryObjectStore::new();
        let index = InMemoryFaceIndex::new(4);
        let object = ObjectRef::new("scraped", "people/group.png");
        let metadata = ObjectMetadata {
            source_url: Some("https://example.com/about".to_owned()),
            ..ObjectMetadata::default()
        };
        store.insert(&object, png_bytes(64, 64)?, metadata).await;
        let engine = engine_with(vec![
            detected(1.0, 1.0, 10.0, 10.0),
            detected(20.0, 20.0, 30.0, 30.0),
        ]);

        let outcome =
            index_image(&engine, &index, &store, &ExistenceFence(&store), &object).await?;

        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(index.count_for(&object).await?, 2);
        let hits = index.search(&[1.0, 1.0, 0.0, 0.0], 1, 0.5).await?;
        assert_eq!(
            hits[0].record.payload.source_url.as_deref(),
            Some("https://example.com/about")
        );
        Ok(())
    }

    #[tokio::test]
    async fn reupload_with_fewer_faces_prunes_the_rest() -> Result<()> {
        let store = InMemoryObjectStore::new();
        let index = InMemoryFaceIndex::new(4);
        let object = ObjectRef::new("scraped", "a.jpg");
        store
            .insert(&object, png_bytes(64, 64)?, ObjectMetadata::default())
            .await;

        let two = engine_with(vec![
            detected(1.0, 1.0, 10.0, 10.0),
            detected(20.0, 20.0, 30.0, 30.0),
        ]);
        index_image(&two, &index, &store, &ExistenceFence(&store), &object).await?;
        let one = engine_with(vec![detected(1.0, 1.0, 10.0, 10.0)]);
        index_image(&one, &index, &store, &ExistenceFence(&store), &object).await?;

        assert_eq!(index.count_for(&object).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_bytes_are_an_error_outcome() -> Result<()> {
        let store = InMemoryObjectStore::new();
        let index = InMemoryFaceIndex::new(4);
        let object = ObjectRef::new("scraped", "broken.jpg");
        store
            .insert(&object, b"garbage".to_vec(), ObjectMetadata::default())
            .await;

        let outcome = index_image(
            &engine_with(vec![]),
            &index,
            &store,
            &ExistenceFence(&store),
            &object,
        )
        .await?;

        assert!(outcome.is_error());
        assert_eq!(index.upsert_calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn missing_object_is_skipped() -> Result<()> {
        let store = InMemoryObjectStore::new();
        let index = InMemoryFaceIndex::new(4);
        let outcome = index_image(
            &engine_with(vec![detected(1.0, 1.0, 10.0, 10.0)]),
            &index,
            &store,
            &ExistenceFence(&store),
            &ObjectRef::new("scraped", "gone.png"),
        )
        .await?;
        assert_eq!(outcome.status, OutcomeStatus::Skipped);
        assert_eq!(index.upsert_calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn index_dimension_mismatch_is_fatal() -> Result<()> {
        let store = InMemoryObjectStore::new();
        let index = InMemoryFaceIndex::new(8);
        let object = ObjectRef::new("scraped", "face.png");
        store
            .insert(&object, png_bytes(64, 64)?, ObjectMetadata::default())
            .await;

        let result = index_image(
            &engine_with(vec![detected(1.0, 1.0, 10.0, 10.0)]),
            &index,
            &store,
            &ExistenceFence(&store),
            &object,
        )
        .await;

        assert!(result.is_err_and(|e| is_fatal_index_error(&e)));
        assert_eq!(index.len().await, 0);
        Ok(())
    }
}
