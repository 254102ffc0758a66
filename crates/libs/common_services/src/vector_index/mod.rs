mod error;
mod memory;
mod pg;

pub use error::IndexError;
pub use memory::InMemoryFaceIndex;
pub use pg::PgFaceIndex;

use crate::startup::retry_startup;
use app_state::StartupSettings;
use async_trait::async_trait;
use common_types::{FaceRecord, ObjectRef, ScoredFace};
use uuid::Uuid;

/// Embedding collection with cosine search and owner-filtered deletes.
#[async_trait]
pub trait FaceIndex: Send + Sync {
    /// Fixed dimensionality of every stored embedding.
    fn dimension(&self) -> usize;

    /// Creates the collection if needed and checks its dimensionality.
    async fn ensure_collection(&self) -> Result<(), IndexError>;

    /// Inserts or overwrites records by id. Returns how many were written.
    async fn upsert(&self, records: &[FaceRecord]) -> Result<usize, IndexError>;

    /// Removes every record owned by the object. Idempotent.
    async fn delete_where(&self, owner: &ObjectRef) -> Result<u64, IndexError>;

    /// Removes records owned by the object whose id is not in `keep`.
    async fn prune(&self, owner: &ObjectRef, keep: &[Uuid]) -> Result<u64, IndexError>;

    /// Records with cosine similarity `>= score_threshold`, best first.
    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredFace>, IndexError>;

    async fn count_for(&self, owner: &ObjectRef) -> Result<u64, IndexError>;
}

/// Makes the index usable for embeddings of `embedding_dimension`.
///
/// Connection failures are retried like any other startup dependency. A
/// dimension or configuration mismatch fails immediately.
pub async fn ensure_ready(
    index: &dyn FaceIndex,
    embedding_dimension: usize,
    startup: &StartupSettings,
) -> color_eyre::Result<()> {
    check_dimension(index.dimension(), embedding_dimension)?;
    retry_startup(startup, "vector index", || async {
        match index.ensure_collection().await {
            Err(e) if e.is_fatal() => Ok(Err(e)),
            other => other.map(Ok),
        }
    })
    .await??;
    Ok(())
}

/// Whether `error` was caused by a misconfigured index that no retry can fix.
#[must_use]
pub fn is_fatal_index_error(error: &color_eyre::Report) -> bool {
    error
        .chain()
        .any(|cause| cause.downcast_ref::<IndexError>().is_some_and(IndexError::is_fatal))
}

pub(crate) fn check_dimension(expected: usize, actual: usize) -> Result<(), IndexError> {
    if expected == actual {
        Ok(())
    } else {
        Err(IndexError::DimensionMismatch { expected, actual })
    }
}

/// Cosine similarity in `[-1, 1]`, 0 when either vector has no length.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator == 0.0 {
        0.0
    } else {
        dot / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::WrapErr;

    fn startup() -> StartupSettings {
        StartupSettings {
            attempts: 3,
            delay_seconds: 0,
        }
    }

    #[tokio::test]
    async fn mismatched_engine_dimension_is_rejected() {
        let index = InMemoryFaceIndex::new(128);

        let result = ensure_ready(&index, 512, &startup()).await;

        let error = result.expect_err("dimension mismatch must fail");
        assert!(is_fatal_index_error(&error));
    }

    #[tokio::test]
    async fn matching_dimension_is_ready() -> color_eyre::Result<()> {
        ensure_ready(&InMemoryFaceIndex::new(4), 4, &startup()).await
    }

    #[test]
    fn fatal_errors_are_found_through_context() {
        let fatal: color_eyre::Result<()> = Err(IndexError::DimensionMismatch {
            expected: 128,
            actual: 512,
        })
        .wrap_err("Failed to index faces");
        let transient: color_eyre::Result<()> =
            Err(IndexError::Database(sqlx::Error::PoolTimedOut)).wrap_err("Failed to index faces");

        assert!(fatal.as_ref().is_err_and(is_fatal_index_error));
        assert!(transient.as_ref().is_err_and(|e| !is_fatal_index_error(e)));
    }

    #[test]
    fn cosine_of_parallel_orthogonal_and_opposite() {
        assert!((cosine_similarity(&[1.0, 0.0], &[3.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 2.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 1.0], &[-1.0, -1.0]) + 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).abs() < f32::EPSILON);
    }
}
