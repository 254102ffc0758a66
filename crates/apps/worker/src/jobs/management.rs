use crate::context::WorkerContext;
use crate::handlers::JobResult;
use crate::macros::backoff_seconds;
use chrono::{Duration, Utc};
use color_eyre::{Report, Result};
use common_services::alert;
use common_services::database::jobs::{Job, JobStatus};
use common_types::JobOutcome;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::{info, warn};

/// Atomically claims the next available job from the queue.
///
/// Running jobs whose heartbeat went stale belong to a crashed worker and are
/// claimed again.
///
/// # Errors
///
/// Returns an error if the database transaction fails.
pub async fn claim_next_job(context: &WorkerContext) -> Result<Option<Job>> {
    let mut tx = context.pool.begin().await?;
    let heartbeat_timeout_seconds = context.settings.queue.heartbeat_timeout_seconds as f64;

    let job = sqlx::query_as::<_, Job>(
        r"
        WITH candidate AS (
            SELECT id FROM jobs
            WHERE (status = 'queued' AND scheduled_at <= now())
               OR (status = 'running' AND last_heartbeat < now() - interval '1 second' * $2)
            ORDER BY priority, scheduled_at, created_at
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        UPDATE jobs
        SET status = 'running',
            owner = $1,
            started_at = now(),
            last_heartbeat = now(),
            attempts = CASE WHEN status = 'running' THEN attempts + 1 ELSE attempts END
        WHERE id = (SELECT id FROM candidate)
        RETURNING id, job_type, bucket, object_key, event_kind, payload, priority, attempts, max_attempts
        ",
    )
    .bind(&context.worker_id)
    .bind(heartbeat_timeout_seconds)
    .fetch_optional(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(job)
}

/// Updates a job's status based on a successful completion result.
///
/// # Errors
///
/// Returns an error if the database update fails.
pub async fn update_job_on_completion(pool: &PgPool, job: &Job, result: JobResult) -> Result<()> {
    match result {
        JobResult::Done(outcome) => mark_job_done(pool, job.id, &outcome).await,
        JobResult::Cancelled => mark_job_cancelled(pool, job.id).await,
    }
}

/// Updates a job's status on failure, either marking it as failed or rescheduling it.
///
/// # Errors
///
/// Returns an error if the database update fails.
pub async fn update_job_on_failure(pool: &PgPool, job: &Job, error: &Report) -> Result<()> {
    let error_string = &format!("{error:?}");
    let outcome = JobOutcome::error(error.to_string());
    if job.attempts + 1 >= job.max_attempts {
        mark_job_failed(pool, job.id, error_string, &outcome).await
    } else {
        let delay = backoff_seconds(job.attempts);
        reschedule_for_retry(pool, job.id, delay, error_string, &outcome).await
    }
}

/// Puts a claimed job back in the queue without using up an attempt.
///
/// # Errors
///
/// Returns an error if the database update fails.
pub async fn release_job(pool: &PgPool, job: &Job, error: &Report) -> Result<()> {
    warn!("Releasing job {} back to the queue", job.id);
    sqlx::query(
        "UPDATE jobs SET status = 'queued', owner = NULL, started_at = NULL, last_error = $2 WHERE id = $1 AND status = 'running'",
    )
    .bind(job.id)
    .bind(format!("{error:?}"))
    .execute(pool)
    .await?;
    Ok(())
}

/// Marks a job as done in the database.
///
/// # Errors
///
/// Returns an error if the database query fails.
async fn mark_job_done(pool: &PgPool, job_id: i64, outcome: &JobOutcome) -> Result<()> {
    sqlx::query("UPDATE jobs SET status = 'done', finished_at = now(), result = $2 WHERE id = $1")
        .bind(job_id)
        .bind(Json(outcome))
        .execute(pool)
        .await?;
    Ok(())
}

/// Marks a job as cancelled in the database.
///
/// # Errors
///
/// Returns an error if the database query fails.
async fn mark_job_cancelled(pool: &PgPool, job_id: i64) -> Result<()> {
    sqlx::query("UPDATE jobs SET status = 'cancelled', finished_at = now() WHERE id = $1")
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Marks a job as failed in the database.
///
/// # Errors
///
/// Returns an error if the database query fails.
async fn mark_job_failed(
    pool: &PgPool,
    job_id: i64,
    last_error: &str,
    outcome: &JobOutcome,
) -> Result<()> {
    alert!("‼️ Marking job {} as failed: {}", job_id, last_error);
    sqlx::query(
        "UPDATE jobs SET status = 'failed', finished_at = now(), last_error = $2, result = $3, attempts = attempts + 1 WHERE id = $1",
    )
    .bind(job_id)
    .bind(last_error)
    .bind(Json(outcome))
    .execute(pool)
    .await?;
    Ok(())
}

/// Reschedules a job to be tried again after a backoff period.
///
/// # Errors
///
/// Returns an error if the database query fails.
async fn reschedule_for_retry(
    pool: &PgPool,
    job_id: i64,
    backoff_secs: i64,
    last_error: &str,
    outcome: &JobOutcome,
) -> Result<()> {
    warn!("⚠️ Rescheduling job {}. Backoff: {}s", job_id, backoff_secs);
    info!("{last_error}");
    let scheduled_at = Utc::now() + Duration::seconds(backoff_secs);
    // A job cancelled meanwhile stays cancelled; a newer queued duplicate takes over.
    let result = sqlx::query(
        r"
        UPDATE jobs j
        SET status = 'queued', scheduled_at = $2, attempts = attempts + 1, owner = NULL,
            started_at = NULL, last_error = $3, result = $4
        WHERE j.id = $1
          AND j.status = 'running'
          AND NOT EXISTS (
              SELECT 1 FROM jobs d
              WHERE d.status = 'queued'
                AND d.job_type = j.job_type
                AND d.bucket = j.bucket
                AND d.object_key = j.object_key
                AND d.event_kind = j.event_kind
          )
        ",
    )
    .bind(job_id)
    .bind(scheduled_at)
    .bind(last_error)
    .bind(Json(outcome))
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        info!("Not rescheduling job {job_id}, it was cancelled or superseded.");
        mark_job_cancelled(pool, job_id).await?;
    }
    Ok(())
}

/// Checks if a job has been cancelled, or deleted.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub async fn is_job_cancelled(pool: &PgPool, job_id: i64) -> Result<bool> {
    let status: Option<JobStatus> = sqlx::query_scalar("SELECT status FROM jobs WHERE id = $1")
        .bind(job_id)
        .fetch_optional(pool)
        .await?;
    Ok(status.is_none_or(|s| s == JobStatus::Cancelled))
}
