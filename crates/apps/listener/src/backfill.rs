use app_state::AppSettings;
use color_eyre::Result;
use common_services::database::jobs::JobType;
use common_services::job_queue::enqueue_job;
use common_services::object_store::ObjectStore;
use common_types::{EventKind, MediaEventPayload};
use sqlx::PgPool;
use tracing::info;

/// Counts from one backfill pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    pub listed: usize,
    pub enqueued: usize,
}

/// Enqueues a creation event for every object already in the bucket.
pub async fn backfill_bucket(
    pool: &PgPool,
    settings: &AppSettings,
    store: &dyn ObjectStore,
) -> Result<BackfillSummary> {
    let bucket = &settings.object_store.bucket;
    let keys = backfill_keys(settings, store).await?;
    let mut summary = BackfillSummary {
        listed: keys.len(),
        enqueued: 0,
    };

    let payload = MediaEventPayload {
        event_name: EventKind::Created.default_event_name().to_owned(),
        event_data: None,
    };
    for key in keys {
        let enqueued = enqueue_job(pool, settings, JobType::MediaEvent)
            .bucket(bucket)
            .object_key(key)
            .event_kind(EventKind::Created)
            .payload(&payload)
            .call()
            .await?;
        if enqueued {
            summary.enqueued += 1;
        }
    }

    info!(
        "Backfill of {} enqueued {} of {} object(s)",
        bucket, summary.enqueued, summary.listed
    );
    Ok(summary)
}

/// Keys in the bucket that should be processed, derived objects excluded.
pub async fn backfill_keys(settings: &AppSettings, store: &dyn ObjectStore) -> Result<Vec<String>> {
    let keys = store.list_keys(&settings.object_store.bucket, "").await?;
    Ok(keys
        .into_iter()
        .filter(|key| !settings.is_derived_key(key))
        .collect())
}
