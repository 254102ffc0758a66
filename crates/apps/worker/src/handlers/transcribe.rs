use crate::context::WorkerContext;
use chrono::Utc;
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use common_services::database::jobs::Job;
use common_types::{JobOutcome, ObjectRef, TranscribePayload};
use media_sampler::extract_audio;
use serde_json::{from_value, json};
use tracing::{info, warn};
use transcription::{TranscriptRecord, load_wav_samples};

pub async fn handle(context: &WorkerContext, job: &Job) -> Result<JobOutcome> {
    let payload: TranscribePayload = from_value(
        job.payload
            .clone()
            .ok_or_else(|| eyre!("Transcribe job has no payload"))?,
    )
    .wrap_err("Invalid transcribe payload")?;

    transcribe_object(
        context,
        &ObjectRef::new(&job.bucket, &payload.audio_key),
        &ObjectRef::new(&job.bucket, &payload.source_key),
        payload.delete_audio,
    )
    .await
}

/// Transcribes the audio object and writes the transcript named after `source`.
pub async fn transcribe_object(
    context: &WorkerContext,
    audio: &ObjectRef,
    source: &ObjectRef,
    delete_audio: bool,
) -> Result<JobOutcome> {
    if !context.store.exists(audio).await? {
        return Ok(JobOutcome::skipped("audio object no longer exists"));
    }

    let workdir = tempfile::tempdir().wrap_err("Failed to create a temporary directory")?;
    let extension = audio.extension().unwrap_or_else(|| "audio".to_owned());
    let downloaded = workdir.path().join(format!("input.{extension}"));
    let normalized = workdir.path().join("normalized.wav");
    context
        .store
        .download_to(audio, &downloaded)
        .await
        .wrap_err_with(|| format!("Failed to download {audio}"))?;

    if let Err(e) = extract_audio(&downloaded, &normalized).await {
        warn!("Cannot read audio {}: {:?}", audio, e);
        return Ok(JobOutcome::error(format!("undecodable audio: {e}")));
    }
    let samples = tokio::task::spawn_blocking(move || load_wav_samples(&normalized)).await??;

    let speech = context.speech().await?;
    let text = tokio::task::spawn_blocking(move || speech.transcribe(&samples)).await??;

    let path = context
        .transcripts
        .write(&TranscriptRecord {
            source: source.clone(),
            text,
            created_at: Utc::now(),
        })
        .await?;

    if delete_audio {
        context.store.delete(audio).await?;
        info!("Deleted derived audio {}", audio);
    }

    Ok(JobOutcome::success(json!({
        "transcript_path": path.display().to_string(),
    })))
}
