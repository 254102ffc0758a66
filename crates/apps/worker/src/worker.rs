use crate::context::WorkerContext;
use crate::handlers::handle_job;
use crate::jobs::management::{
    claim_next_job, release_job, update_job_on_completion, update_job_on_failure,
};
use app_state::AppSettings;
use color_eyre::Result;
use common_services::alert;
use common_services::utils::nice_id;
use common_services::vector_index::is_fatal_index_error;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

pub async fn create_worker(pool: PgPool, settings: AppSettings, stop_on_sleep: bool) -> Result<()> {
    let worker_id = nice_id(8);
    info!("🛠️ [Worker ID: {}] Starting.", worker_id);
    let context = Arc::new(WorkerContext::new(pool, settings, worker_id).await?);

    run_worker_loop(&context, stop_on_sleep).await
}

/// The main loop for the worker process, continuously fetching and processing jobs.
///
/// # Errors
///
/// This function will return an error if there is a problem communicating with the
/// database when claiming or updating a job. The loop will terminate in such a case.
/// A job failing because the vector index is unusable also stops the loop; the job
/// goes back to the queue untouched for a correctly configured worker.
pub async fn run_worker_loop(context: &Arc<WorkerContext>, stop_on_sleep: bool) -> Result<()> {
    let mut sleeping = false;
    let poll_interval = Duration::from_millis(context.settings.queue.poll_interval_ms);

    loop {
        let maybe_job = claim_next_job(context).await?;

        if let Some(job) = maybe_job {
            sleeping = false;
            info!(
                "🐜 Picked up {:?} job {} for {}/{}",
                job.job_type, job.id, job.bucket, job.object_key
            );

            match handle_job(context, &job).await {
                Ok(result) => update_job_on_completion(&context.pool, &job, result).await?,
                Err(e) if is_fatal_index_error(&e) => {
                    alert!("Vector index is unusable, stopping worker: {:?}", e);
                    release_job(&context.pool, &job, &e).await?;
                    return Err(e);
                }
                Err(e) => {
                    warn!("Job {} failed: {:?}", job.id, e);
                    update_job_on_failure(&context.pool, &job, &e).await?;
                }
            }
        } else {
            if !sleeping {
                sleeping = true;
                info!("💤 No jobs, going to sleep...");
                if stop_on_sleep {
                    return Ok(());
                }
            }
            sleep(poll_interval).await;
        }
    }
}
