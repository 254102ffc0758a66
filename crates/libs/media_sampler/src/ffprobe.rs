use crate::utils;
use color_eyre::eyre::{Context, Result, bail};
use serde::Deserialize;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

#[derive(Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<StreamInfo>,
    format: Option<FormatInfo>,
}

#[derive(Deserialize)]
struct StreamInfo {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

#[derive(Deserialize)]
struct FormatInfo {
    duration: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoStream {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: Option<u64>,
}

/// What ffprobe reports about a media file.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaProbe {
    pub video: Option<VideoStream>,
    pub has_audio: bool,
    /// Seconds.
    pub duration: Option<f64>,
}

/// Parses ffprobe rates such as `30000/1001` or `25`. Zero or invalid rates give `None`.
#[must_use]
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

impl MediaProbe {
    /// Builds a probe from `ffprobe -print_format json -show_streams -show_format` output.
    pub fn from_json(json: &[u8]) -> Result<Self> {
        let output: FfprobeOutput =
            serde_json::from_slice(json).context("Failed to parse ffprobe JSON output")?;

        let video_info = output
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"));
        let has_audio = output
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("audio"));

        let stream_duration = video_info
            .and_then(|s| s.duration.as_deref())
            .and_then(|d| d.parse::<f64>().ok());
        let format_duration = output
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.parse::<f64>().ok());
        let duration = stream_duration.or(format_duration);

        let video = match video_info {
            Some(stream) => {
                let (Some(width), Some(height)) = (stream.width, stream.height) else {
                    bail!("video stream has no dimensions");
                };
                let fps = stream
                    .avg_frame_rate
                    .as_deref()
                    .and_then(parse_frame_rate)
                    .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
                    .unwrap_or(0.0);
                let frame_count = stream.nb_frames.as_deref().and_then(|n| n.parse().ok());
                Some(VideoStream {
                    width,
                    height,
                    fps,
                    frame_count,
                })
            }
            None => None,
        };

        Ok(Self {
            video,
            has_audio,
            duration,
        })
    }
}

/// Runs ffprobe on a media file and summarizes its streams.
pub async fn probe_media(path: &Path) -> Result<MediaProbe> {
    let args: [OsString; 7] = [
        "-v".into(),
        "error".into(),
        "-print_format".into(),
        "json".into(),
        "-show_streams".into(),
        "-show_format".into(),
        utils::path_to_os_string(path),
    ];

    let output = Command::new("ffprobe")
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .context("failed to run ffprobe")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("ffprobe failed: {}", stderr.trim());
    }

    MediaProbe::from_json(&output.stdout)
}
