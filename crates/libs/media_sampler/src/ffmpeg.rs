use crate::utils;
use color_eyre::eyre::{Context, Result, bail};
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Runs ffmpeg to completion, failing with its stderr on a non-zero exit.
pub async fn run_ffmpeg<S: AsRef<OsStr> + Send + Sync>(args: &[S]) -> Result<()> {
    let output = Command::new("ffmpeg")
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .context("failed to run ffmpeg")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("ffmpeg failed: {}", stderr.trim());
    }
    Ok(())
}

/// Starts ffmpeg decoding `input` to raw RGB24 frames on stdout.
/// `video_filter` is passed to `-vf` when given.
pub fn spawn_raw_video_decoder(input: &Path, video_filter: Option<&str>) -> Result<Child> {
    let mut args: Vec<OsString> = vec![
        "-v".into(),
        "error".into(),
        "-nostdin".into(),
        "-noautorotate".into(),
        "-i".into(),
        utils::path_to_os_string(input),
        "-an".into(),
    ];
    match video_filter {
        Some(filter) => args.extend(["-vf".into(), filter.into()]),
        None => args.extend(["-fps_mode".into(), "passthrough".into()]),
    }
    args.extend([
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgb24".into(),
        "pipe:1".into(),
    ]);

    Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .context("failed to spawn ffmpeg")
}

fn frame_jpeg_args(input: &Path, frame_index: u64) -> Vec<OsString> {
    vec![
        "-v".into(),
        "error".into(),
        "-nostdin".into(),
        "-i".into(),
        utils::path_to_os_string(input),
        "-an".into(),
        "-vf".into(),
        format!("select=eq(n\\,{frame_index})").into(),
        "-frames:v".into(),
        "1".into(),
        "-f".into(),
        "image2pipe".into(),
        "-c:v".into(),
        "mjpeg".into(),
        "pipe:1".into(),
    ]
}

/// Decodes source frame `frame_index` of `input` and encodes it as JPEG.
pub async fn extract_frame_jpeg(input: &Path, frame_index: u64) -> Result<Vec<u8>> {
    let output = Command::new("ffmpeg")
        .args(frame_jpeg_args(input, frame_index))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .context("failed to run ffmpeg")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("ffmpeg frame extraction failed: {}", stderr.trim());
    }
    if output.stdout.is_empty() {
        bail!("video has no frame {frame_index}");
    }
    Ok(output.stdout)
}

/// Extracts the first audio track as 16 kHz mono 16-bit PCM WAV, the input format of
/// the speech model.
pub async fn extract_audio(input: &Path, output_wav: &Path) -> Result<()> {
    let args: Vec<OsString> = vec![
        "-y".into(),
        "-v".into(),
        "error".into(),
        "-nostdin".into(),
        "-i".into(),
        utils::path_to_os_string(input),
        "-vn".into(),
        "-ac".into(),
        "1".into(),
        "-ar".into(),
        "16000".into(),
        "-c:a".into(),
        "pcm_s16le".into(),
        utils::path_to_os_string(output_wav),
    ];
    run_ffmpeg(&args).await
}
