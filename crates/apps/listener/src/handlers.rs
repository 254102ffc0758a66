use crate::notification::BucketEvent;
use app_state::{AppSettings, ListenerSettings};
use color_eyre::Result;
use common_services::database::jobs::JobType;
use common_services::job_queue::enqueue_job;
use common_types::{MediaEventPayload, ObjectRef};
use sqlx::PgPool;
use std::future::Future;
use std::time::Duration;
use tokio_retry::Retry;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, info, warn};

const MAX_ENQUEUE_DELAY: Duration = Duration::from_secs(30);

/// Enqueues the media job for one bucket event.
///
/// Returns `false` when the event was ignored or an identical job is already queued.
pub async fn handle_event(pool: &PgPool, settings: &AppSettings, event: BucketEvent) -> Result<bool> {
    if settings.is_derived_key(&event.object.key) {
        debug!("Ignoring event for derived object {}", event.object);
        return Ok(false);
    }

    info!(
        "Enqueuing {:?} job for {} ({})",
        event.kind, event.object, event.event_name
    );
    let payload = MediaEventPayload {
        event_name: event.event_name,
        event_data: Some(event.record),
    };
    enqueue_job(pool, settings, JobType::MediaEvent)
        .bucket(event.object.bucket)
        .object_key(event.object.key)
        .event_kind(event.kind)
        .payload(&payload)
        .call()
        .await
}

/// Runs `enqueue` until it succeeds, waiting twice as long after each failure.
///
/// # Errors
///
/// Returns the last error once `settings.enqueue_attempts` tries have failed.
pub async fn enqueue_with_retry<F, Fut>(
    settings: &ListenerSettings,
    object: &ObjectRef,
    mut enqueue: F,
) -> Result<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let attempts = settings.enqueue_attempts.max(1);
    let strategy = ExponentialBackoff::from_millis(2)
        .factor(settings.enqueue_backoff_ms)
        .max_delay(MAX_ENQUEUE_DELAY)
        .take(attempts - 1);
    let mut attempt = 0;

    Retry::spawn(strategy, || {
        attempt += 1;
        let current = attempt;
        let fut = enqueue();
        async move {
            fut.await.inspect_err(|e| {
                warn!("Enqueue for {object} failed (attempt {current}/{attempts}): {e}");
            })
        }
    })
    .await
}
