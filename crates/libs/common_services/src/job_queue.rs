use crate::database::jobs::JobType;
use app_state::AppSettings;
use bon::builder;
use color_eyre::eyre::Result;
use common_types::{EventKind, MediaKind};
use serde::Serialize;
use serde_json::to_value;
use sqlx::{PgPool, PgTransaction};
use tracing::{info, warn};

/// Enqueues a job for one object event.
///
/// Returns `false` when an identical job is already queued.
///
/// # Errors
///
/// Returns an error if the database transaction fails.
#[builder]
pub async fn enqueue_job<T: Serialize + Send + Sync>(
    #[builder(start_fn)] pool: &PgPool,
    #[builder(start_fn)] settings: &AppSettings,
    #[builder(start_fn)] job_type: JobType,
    #[builder(into)] bucket: String,
    #[builder(into)] object_key: String,
    event_kind: EventKind,
    payload: Option<&T>,
) -> Result<bool> {
    let json_payload = payload.and_then(|p| to_value(p).ok());

    let mut tx = pool.begin().await?;

    if job_type == JobType::MediaEvent {
        per_event_logic(&mut tx, event_kind, &bucket, &object_key).await?;
    }

    let is_video = settings.media.classify(&object_key) == MediaKind::Video;
    let priority = job_type.get_priority(event_kind, is_video);

    let result = sqlx::query(
        r"
        INSERT INTO jobs (job_type, bucket, object_key, event_kind, payload, priority, max_attempts)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (job_type, bucket, object_key, event_kind)
        WHERE (status = 'queued')
        DO NOTHING
        ",
    )
    .bind(job_type)
    .bind(&bucket)
    .bind(&object_key)
    .bind(event_kind)
    .bind(&json_payload)
    .bind(priority)
    .bind(settings.queue.max_attempts)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    if result.rows_affected() == 0 {
        warn!(
            "Not enqueueing {:?} job for {}/{} ({:?}), a queued one already exists.",
            job_type, bucket, object_key, event_kind
        );
        return Ok(false);
    }

    info!(
        "Enqueued {:?} job for {}/{} ({:?}), payload: {:?}",
        job_type, bucket, object_key, event_kind, json_payload
    );

    Ok(true)
}

/// Keeps creation and removal of the same object from both running.
///
/// * A removal cancels queued and running creation jobs for that object.
/// * A creation cancels queued removal jobs for that object.
pub async fn per_event_logic(
    tx: &mut PgTransaction<'_>,
    event_kind: EventKind,
    bucket: &str,
    object_key: &str,
) -> Result<()> {
    let (cancel_kind, statuses): (EventKind, &[&str]) = match event_kind {
        EventKind::Removed => (EventKind::Created, &["queued", "running"]),
        EventKind::Created => (EventKind::Removed, &["queued"]),
    };

    let result = sqlx::query(
        r"
        UPDATE jobs
        SET status = 'cancelled', finished_at = now()
        WHERE
            bucket = $1
            AND object_key = $2
            AND job_type = 'media_event'
            AND event_kind = $3
            AND status::text = ANY($4)
        ",
    )
    .bind(bucket)
    .bind(object_key)
    .bind(cancel_kind)
    .bind(statuses)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() > 0 {
        info!(
            "Cancelled {} {:?} job(s) for {}/{}",
            result.rows_affected(),
            cancel_kind,
            bucket,
            object_key
        );
    }

    Ok(())
}
