use crate::{VideoStream, spawn_raw_video_decoder};
use color_eyre::eyre::{Context, Result, bail, eyre};
use image::RgbImage;
use std::io::ErrorKind;
use std::path::Path;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How frames are selected from the video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMode {
    /// ffmpeg's `fps` filter picks frames by timestamp.
    Timed,
    /// Every frame is decoded and every `stride`-th one kept.
    Stride,
}

/// Number of source frames between samples: `fps * interval` rounded, at least 1.
#[must_use]
pub fn frame_stride(fps: f64, interval_seconds: f64) -> u64 {
    let stride = (fps * interval_seconds).round();
    if stride.is_finite() && stride >= 1.0 {
        stride as u64
    } else {
        1
    }
}

/// Source frame number of the `ordinal`-th frame ffmpeg wrote, or `None` when
/// that frame is not a sample.
///
/// In [`SamplingMode::Timed`] ffmpeg only writes samples, one per interval.
#[must_use]
pub const fn sampled_frame_index(mode: SamplingMode, ordinal: u64, stride: u64) -> Option<u64> {
    let stride = if stride == 0 { 1 } else { stride };
    match mode {
        SamplingMode::Timed => Some(ordinal.saturating_mul(stride)),
        SamplingMode::Stride if ordinal % stride == 0 => Some(ordinal),
        SamplingMode::Stride => None,
    }
}

#[derive(Debug)]
pub struct SampledFrame {
    /// Source frame number, comparable between both sampling modes.
    pub frame_index: u64,
    pub image: RgbImage,
}

/// Sampled frames read from a running ffmpeg process.
pub struct FrameStream {
    child: Child,
    stdout: BufReader<ChildStdout>,
    /// Drained concurrently so a chatty decoder cannot block on a full pipe.
    stderr: JoinHandle<String>,
    mode: SamplingMode,
    width: u32,
    height: u32,
    stride: u64,
    /// Frames read from ffmpeg so far.
    decoded: u64,
}

impl FrameStream {
    pub fn open(
        path: &Path,
        video: &VideoStream,
        mode: SamplingMode,
        interval_seconds: f64,
    ) -> Result<Self> {
        if video.width == 0 || video.height == 0 {
            bail!("video has invalid dimensions {}x{}", video.width, video.height);
        }
        let stride = frame_stride(video.fps, interval_seconds);
        let filter = match mode {
            SamplingMode::Timed => Some(format!("fps=1/{interval_seconds}")),
            SamplingMode::Stride => None,
        };
        let mut child = spawn_raw_video_decoder(path, filter.as_deref())?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| eyre!("ffmpeg stdout was not captured"))?;
        let mut stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| eyre!("ffmpeg stderr was not captured"))?;
        let stderr = tokio::spawn(async move {
            let mut stderr = String::new();
            stderr_pipe.read_to_string(&mut stderr).await.ok();
            stderr
        });
        debug!(
            "Decoding {:?} ({}x{} @ {:.2} fps) in {:?} mode, stride {}",
            path, video.width, video.height, video.fps, mode, stride
        );

        Ok(Self {
            child,
            stdout: BufReader::new(stdout),
            stderr,
            mode,
            width: video.width,
            height: video.height,
            stride,
            decoded: 0,
        })
    }

    #[must_use]
    pub const fn stride(&self) -> u64 {
        self.stride
    }

    /// Reads until the next sampled frame; `None` once ffmpeg has no more output.
    pub async fn next_frame(&mut self) -> Result<Option<SampledFrame>> {
        let frame_len = self.width as usize * self.height as usize * 3;
        loop {
            let mut buffer = vec![0u8; frame_len];
            match self.stdout.read_exact(&mut buffer).await {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(e).wrap_err("failed reading frames from ffmpeg"),
            }
            let ordinal = self.decoded;
            self.decoded += 1;

            let Some(frame_index) = sampled_frame_index(self.mode, ordinal, self.stride) else {
                continue;
            };
            let Some(image) = RgbImage::from_raw(self.width, self.height, buffer) else {
                warn!("Skipping frame {frame_index}: buffer does not match frame size");
                continue;
            };
            return Ok(Some(SampledFrame { frame_index, image }));
        }
    }

    /// Waits for ffmpeg to exit and reports a decode failure as an error.
    pub async fn finish(mut self) -> Result<u64> {
        let status = self.child.wait().await.context("failed waiting for ffmpeg")?;
        let stderr = self.stderr.await.unwrap_or_default();
        if !status.success() {
            bail!("ffmpeg decode failed ({status}): {}", stderr.trim());
        }
        if self.decoded == 0 {
            bail!("ffmpeg produced no frames: {}", stderr.trim());
        }
        Ok(self.decoded)
    }
}
