#![deny(clippy::unwrap_used)]
#![allow(
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
//! Video decoding through the `ffmpeg`/`ffprobe` command line tools.

mod ffmpeg;
mod ffprobe;
mod frames;
mod utils;

pub use ffmpeg::*;
pub use ffprobe::*;
pub use frames::*;
