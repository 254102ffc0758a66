use crate::context::WorkerContext;
use crate::jobs::heartbeat::start_heartbeat_loop;
use crate::jobs::management::is_job_cancelled;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use common_services::database::jobs::{Job, JobType};
use common_types::{JobOutcome, MediaEventPayload};
use route::{Route, route};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

pub mod cleanup;
pub mod image;
pub mod route;
pub mod transcribe;
pub mod video;

#[cfg(test)]
pub(crate) mod test_support;

/// The outcome of a job handler's execution.
#[derive(Debug, PartialEq)]
pub enum JobResult {
    Done(JobOutcome),
    Cancelled,
}

/// Dispatches a job to its corresponding handler and manages its lifecycle.
///
/// The handler runs in its own task, so a panic surfaces as an error here
/// instead of taking the worker down.
///
/// # Errors
///
/// This function will return an error if the specific job handler fails or panics.
pub async fn handle_job(context: &Arc<WorkerContext>, job: &Job) -> Result<JobResult> {
    let every = Duration::from_secs(context.settings.queue.heartbeat_interval_seconds.max(1));
    let heartbeat_handle = start_heartbeat_loop(&context.pool, job.id, every);

    let task_context = Arc::clone(context);
    let task_job = job.clone();
    let result = tokio::spawn(async move { dispatch(&task_context, &task_job).await }).await;

    heartbeat_handle.abort();
    match result {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(eyre!("Handler for job {} panicked", job.id)),
        Err(e) => Err(eyre!("Handler for job {} was aborted: {e}", job.id)),
    }
}

async fn dispatch(context: &WorkerContext, job: &Job) -> Result<JobResult> {
    if is_job_cancelled(&context.pool, job.id).await? {
        return Ok(JobResult::Cancelled);
    }

    let outcome = match job.job_type {
        JobType::MediaEvent => handle_media_event(context, job).await?,
        JobType::Transcribe => transcribe::handle(context, job).await?,
    };
    Ok(JobResult::Done(outcome))
}

#[instrument(skip_all, fields(job_id = job.id, bucket = %job.bucket, key = %job.object_key))]
async fn handle_media_event(context: &WorkerContext, job: &Job) -> Result<JobOutcome> {
    let event_name = job
        .payload
        .clone()
        .and_then(|p| serde_json::from_value::<MediaEventPayload>(p).ok())
        .map_or_else(
            || job.event_kind.default_event_name().to_owned(),
            |p| p.event_name,
        );

    let route = route(
        &context.settings.media,
        &context.settings.object_store.derived_prefix,
        &job.object_key,
        job.event_kind,
    );
    info!(
        "Dispatching {}/{} ({}) to {:?}",
        job.bucket, job.object_key, event_name, route
    );

    match route {
        Route::Image => image::handle(context, job).await,
        Route::Video => video::handle(context, job).await,
        Route::Cleanup => cleanup::handle(context, job).await,
        Route::Transcribe => {
            let object = job.object();
            transcribe::transcribe_object(context, &object, &object, false).await
        }
        Route::Skip(reason) => Ok(JobOutcome::skipped(reason)),
    }
}
