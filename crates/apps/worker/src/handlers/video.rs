use crate::context::WorkerContext;
use crate::fence::JobFence;
use color_eyre::eyre::{Report, WrapErr, eyre};
use color_eyre::Result;
use common_services::database::jobs::{Job, JobType};
use common_services::indexing::{FaceContext, WriteFence, detect_and_embed};
use common_services::job_queue::enqueue_job;
use common_services::vector_index::{FaceIndex, is_fatal_index_error};
use common_types::{EventKind, JobOutcome, ObjectRef, TranscribePayload};
use face_engine::FaceEngine;
use media_sampler::{FrameStream, SampledFrame, SamplingMode, VideoStream, extract_audio, probe_media};
use serde_json::json;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Anything that yields sampled frames in order.
pub trait FrameSource {
    fn next_frame(&mut self) -> impl Future<Output = Result<Option<SampledFrame>>> + Send;
}

impl FrameSource for FrameStream {
    fn next_frame(&mut self) -> impl Future<Output = Result<Option<SampledFrame>>> + Send {
        Self::next_frame(self)
    }
}

/// Faces found in one decoding pass over a video.
#[derive(Debug, Default)]
pub struct VideoPass {
    pub frames: u64,
    /// Frames whose faces could not be indexed.
    pub failed_frames: u64,
    pub ids: Vec<Uuid>,
    pub fenced: bool,
    /// Set when the decoder failed before reaching the end.
    pub decode_error: Option<Report>,
}

impl VideoPass {
    fn is_complete(&self) -> bool {
        !self.fenced && self.decode_error.is_none()
    }
}

/// Key the extracted audio of `video_key` is uploaded under.
#[must_use]
pub fn derived_audio_key(derived_prefix: &str, video_key: &str) -> String {
    format!("{derived_prefix}{video_key}.wav")
}

pub async fn handle(context: &WorkerContext, job: &Job) -> Result<JobOutcome> {
    let object = job.object();
    let Some(head) = context.store.head(&object).await? else {
        return Ok(JobOutcome::skipped("object no longer exists"));
    };

    // Removed on drop, on every exit path.
    let workdir = tempfile::tempdir().wrap_err("Failed to create a temporary directory")?;
    let extension = object.extension().unwrap_or_else(|| "bin".to_owned());
    let video_path = workdir.path().join(format!("source.{extension}"));
    context
        .store
        .download_to(&object, &video_path)
        .await
        .wrap_err_with(|| format!("Failed to download {object}"))?;

    let probe = match probe_media(&video_path).await {
        Ok(probe) => probe,
        Err(e) => {
            warn!("Cannot probe video {}: {:?}", object, e);
            return Ok(JobOutcome::error(format!("cannot open video: {e}")));
        }
    };

    let mut audio_key = None;
    if probe.has_audio && context.settings.video.extract_audio {
        match queue_transcription(context, &object, &video_path, workdir.path()).await {
            Ok(key) => audio_key = Some(key),
            Err(e) => warn!("Skipping transcription of {}: {:?}", object, e),
        }
    }

    let Some(video) = probe.video else {
        return Ok(JobOutcome::error("object has no video stream"));
    };

    let fence = JobFence::new(&context.pool, context.store.as_ref(), job.id);
    let base = FaceContext::new(object.clone(), head.metadata);
    let interval = context.settings.video.sample_interval_seconds;

    let mut ids = Vec::new();
    let mut frames = 0;
    let mut failed_frames = 0;
    let mut mode = SamplingMode::Timed;
    let mut pass = decode_pass(
        &context.engine,
        context.index.as_ref(),
        &fence,
        &video_path,
        &video,
        mode,
        interval,
        &base,
    )
    .await?;

    if let Some(e) = pass.decode_error.take().filter(|_| !pass.fenced) {
        warn!(
            "Timed decoding of {} failed after {} frame(s), falling back to every {} frame(s): {:?}",
            object,
            pass.frames,
            media_sampler::frame_stride(video.fps, interval),
            e
        );
        ids.append(&mut pass.ids);
        frames += pass.frames;
        failed_frames += pass.failed_frames;
        mode = SamplingMode::Stride;
        pass = decode_pass(
            &context.engine,
            context.index.as_ref(),
            &fence,
            &video_path,
            &video,
            mode,
            interval,
            &base,
        )
        .await?;
    }

    ids.append(&mut pass.ids);
    frames += pass.frames;
    failed_frames += pass.failed_frames;

    if pass.fenced {
        return Ok(JobOutcome::skipped("object removed while processing"));
    }
    if let Some(e) = &pass.decode_error {
        // Records of frames already indexed stay; their ids make a retry safe.
        return Ok(JobOutcome::error(format!("video could not be decoded: {e}")));
    }

    if frames > 0 && failed_frames == frames {
        return Err(eyre!("none of the {frames} sampled frame(s) of {object} could be indexed"));
    }

    // Stale records of failed frames cannot be told apart from live ones.
    let pruned = if failed_frames == 0 {
        context.index.prune(&object, &ids).await?
    } else {
        0
    };
    info!(
        "Indexed {} face(s) from {} sampled frame(s) of {} ({} failed), pruned {} stale",
        ids.len(),
        frames,
        object,
        failed_frames,
        pruned
    );
    Ok(JobOutcome::success(json!({
        "frames_sampled": frames,
        "frames_failed": failed_frames,
        "faces_indexed": ids.len(),
        "faces_pruned": pruned,
        "sampling": format!("{mode:?}").to_lowercase(),
        "transcription_audio_key": audio_key,
    })))
}

/// Extracts the audio track, uploads it next to the video and enqueues its transcription.
async fn queue_transcription(
    context: &WorkerContext,
    object: &ObjectRef,
    video_path: &Path,
    workdir: &Path,
) -> Result<String> {
    let wav_path = workdir.join("audio.wav");
    extract_audio(video_path, &wav_path).await?;

    let audio = ObjectRef::new(
        &object.bucket,
        derived_audio_key(&context.settings.object_store.derived_prefix, &object.key),
    );
    context
        .store
        .put_file(&audio, &wav_path, "audio/wav")
        .await?;

    let payload = TranscribePayload {
        audio_key: audio.key.clone(),
        source_key: object.key.clone(),
        delete_audio: true,
    };
    enqueue_job(&context.pool, &context.settings, JobType::Transcribe)
        .bucket(&audio.bucket)
        .object_key(&audio.key)
        .event_kind(EventKind::Created)
        .payload(&payload)
        .call()
        .await?;

    if let Err(e) = tokio::fs::remove_file(&wav_path).await {
        debug!("Could not remove {}: {}", wav_path.display(), e);
    }
    Ok(audio.key)
}

/// Runs one decoder over the whole video. Decoder failures are recorded in the
/// returned pass; index failures are returned as errors.
#[allow(clippy::too_many_arguments)]
async fn decode_pass(
    engine: &Arc<FaceEngine>,
    index: &dyn FaceIndex,
    fence: &dyn WriteFence,
    path: &Path,
    video: &VideoStream,
    mode: SamplingMode,
    interval_seconds: f64,
    base: &FaceContext,
) -> Result<VideoPass> {
    let mut stream = match FrameStream::open(path, video, mode, interval_seconds) {
        Ok(stream) => stream,
        Err(e) => {
            return Ok(VideoPass {
                decode_error: Some(e),
                ..VideoPass::default()
            });
        }
    };

    let mut pass = index_frames(engine, index, fence, &mut stream, base).await?;
    if pass.is_complete() {
        if let Err(e) = stream.finish().await {
            pass.decode_error = Some(e);
        }
    }
    Ok(pass)
}

/// Feeds every frame of `source` to the face pipeline, stopping early when the
/// object disappears.
///
/// A frame that cannot be indexed is counted and skipped. Only an unusable index
/// ends the pass with an error.
pub async fn index_frames<S: FrameSource>(
    engine: &Arc<FaceEngine>,
    index: &dyn FaceIndex,
    fence: &dyn WriteFence,
    source: &mut S,
    base: &FaceContext,
) -> Result<VideoPass> {
    let mut pass = VideoPass::default();
    loop {
        let frame = match source.next_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                pass.decode_error = Some(e);
                break;
            }
        };
        pass.frames += 1;

        let context = base.with_frame(frame.frame_index);
        let indexed = match detect_and_embed(engine, index, fence, frame.image, &context).await {
            Ok(indexed) => indexed,
            Err(e) if is_fatal_index_error(&e) => return Err(e),
            Err(e) => {
                warn!(
                    "Skipping frame {} of {}: {:?}",
                    frame.frame_index, base.object, e
                );
                pass.failed_frames += 1;
                continue;
            }
        };
        if indexed.fenced {
            pass.fenced = true;
            break;
        }
        pass.ids.extend(indexed.ids);
    }
    Ok(pass)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fence::ExistenceFence;
    use crate::handlers::test_support::{detected, engine_with};
    use common_services::indexing::NoFence;
    use common_services::object_store::InMemoryObjectStore;
    use common_services::vector_index::InMemoryFaceIndex;
    use common_types::{ObjectMetadata, face_record_id};
    use image::RgbImage;
    use async_trait::async_trait;
    use media_sampler::{frame_stride, sampled_frame_index};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Frames from memory, optionally failing once they run out.
    struct ScriptedFrames {
        frames: VecDeque<u64>,
        fail_at_end: bool,
    }

    impl ScriptedFrames {
        fn new(indices: impl IntoIterator<Item = u64>, fail_at_end: bool) -> Self {
            Self {
                frames: indices.into_iter().collect(),
                fail_at_end,
            }
        }
    }

    impl FrameSource for ScriptedFrames {
        async fn next_frame(&mut self) -> Result<Option<SampledFrame>> {
            match self.frames.pop_front() {
                Some(frame_index) => Ok(Some(SampledFrame {
                    frame_index,
                    image: RgbImage::new(32, 32),
                })),
                None if self.fail_at_end => Err(eyre!("corrupt packet")),
                None => Ok(None),
            }
        }
    }

    fn base(key: &str) -> FaceContext {
        FaceContext::new(ObjectRef::new("scraped", key), ObjectMetadata::default())
    }

    #[tokio::test]
    async fn one_face_per_second_of_thirty_fps_video() -> Result<()> {
        let index = InMemoryFaceIndex::new(4);
        let engine = engine_with(vec![detected(1.0, 1.0, 10.0, 10.0)]);
        let stride = frame_stride(30.0, 1.0);
        let kept = (0..300).filter_map(|n| sampled_frame_index(SamplingMode::Stride, n, stride));
        let mut source = ScriptedFrames::new(kept, false);

        let pass = index_frames(&engine, &index, &NoFence, &mut source, &base("clip.mp4")).await?;

        assert_eq!(pass.frames, 10);
        assert_eq!(pass.ids.len(), 10);
        assert!(pass.is_complete());
        assert_eq!(pass.ids[1], face_record_id("scraped", "clip.mp4", Some(30), 0));
        Ok(())
    }

    #[tokio::test]
    async fn decoder_failure_keeps_earlier_frames() -> Result<()> {
        let index = InMemoryFaceIndex::new(4);
        let engine = engine_with(vec![detected(1.0, 1.0, 10.0, 10.0)]);
        let mut source = ScriptedFrames::new([0, 30, 60], true);

        let pass = index_frames(&engine, &index, &NoFence, &mut source, &base("clip.mp4")).await?;

        assert_eq!(pass.frames, 3);
        assert!(pass.decode_error.is_some());
        assert_eq!(index.count_for(&ObjectRef::new("scraped", "clip.mp4")).await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn deleted_video_stops_sampling() -> Result<()> {
        let store = InMemoryObjectStore::new();
        let index = InMemoryFaceIndex::new(4);
        let engine = engine_with(vec![detected(1.0, 1.0, 10.0, 10.0)]);
        let mut source = ScriptedFrames::new([0, 30, 60], false);

        let pass = index_frames(
            &engine,
            &index,
            &ExistenceFence(&store),
            &mut source,
            &base("deleted.mp4"),
        )
        .await?;

        assert!(pass.fenced);
        assert_eq!(pass.frames, 1);
        assert_eq!(index.upsert_calls(), 0);
        Ok(())
    }

    /// Fails the `fail_on`-th write check, allows all others.
    struct FlakyFence {
        calls: AtomicUsize,
        fail_on: usize,
    }

    #[async_trait]
    impl WriteFence for FlakyFence {
        async fn allows_write(&self, _object: &ObjectRef) -> Result<bool> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.fail_on {
                return Err(eyre!("connection reset"));
            }
            Ok(true)
        }
    }

    #[tokio::test]
    async fn failing_frame_is_skipped() -> Result<()> {
        let index = InMemoryFaceIndex::new(4);
        let engine = engine_with(vec![detected(1.0, 1.0, 10.0, 10.0)]);
        // Each frame checks the fence before and after its write; the third
        // check belongs to the second frame.
        let fence = FlakyFence {
            calls: AtomicUsize::new(0),
            fail_on: 3,
        };
        let mut source = ScriptedFrames::new([0, 30, 60], false);

        let pass = index_frames(&engine, &index, &fence, &mut source, &base("clip.mp4")).await?;

        assert_eq!(pass.frames, 3);
        assert_eq!(pass.failed_frames, 1);
        assert!(pass.decode_error.is_none());
        assert_eq!(
            pass.ids,
            vec![
                face_record_id("scraped", "clip.mp4", Some(0), 0),
                face_record_id("scraped", "clip.mp4", Some(60), 0),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn unusable_index_ends_the_pass() {
        let index = InMemoryFaceIndex::new(8);
        let engine = engine_with(vec![detected(1.0, 1.0, 10.0, 10.0)]);
        let mut source = ScriptedFrames::new([0, 30, 60], false);

        let result = index_frames(&engine, &index, &NoFence, &mut source, &base("clip.mp4")).await;

        assert!(result.is_err_and(|e| is_fatal_index_error(&e)));
    }

    #[test]
    fn audio_is_stored_under_the_derived_prefix() {
        assert_eq!(
            derived_audio_key("_derived/", "videos/talk.mp4"),
            "_derived/videos/talk.mp4.wav"
        );
    }
}
