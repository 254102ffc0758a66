use crate::jobs::management::is_job_cancelled;
use async_trait::async_trait;
use color_eyre::Result;
use common_services::indexing::WriteFence;
use common_services::object_store::ObjectStore;
use common_types::ObjectRef;
use sqlx::PgPool;

/// Allows writes while the job is not cancelled and the object still exists.
///
/// A removal event cancels in-flight creation jobs, and is only emitted after the
/// object is gone, so checking both around an upsert keeps deleted objects out
/// of the index.
pub struct JobFence<'a> {
    pool: &'a PgPool,
    store: &'a dyn ObjectStore,
    job_id: i64,
}

impl<'a> JobFence<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, store: &'a dyn ObjectStore, job_id: i64) -> Self {
        Self {
            pool,
            store,
            job_id,
        }
    }
}

#[async_trait]
impl WriteFence for JobFence<'_> {
    async fn allows_write(&self, object: &ObjectRef) -> Result<bool> {
        if is_job_cancelled(self.pool, self.job_id).await? {
            return Ok(false);
        }
        Ok(self.store.exists(object).await?)
    }
}

/// Only checks that the object exists, for work that has no job row.
pub struct ExistenceFence<'a>(pub &'a dyn ObjectStore);

#[async_trait]
impl WriteFence for ExistenceFence<'_> {
    async fn allows_write(&self, object: &ObjectRef) -> Result<bool> {
        Ok(self.0.exists(object).await?)
    }
}
