#![deny(clippy::unwrap_used)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
//! Face detection and identity embeddings on raw pixels.
//!
//! The [`FaceEngine`] owns a [`FaceDetector`] and a [`FaceEmbedder`] and wraps
//! detection in a [`RetryPolicy`]. The ONNX backed implementations are
//! [`RetinaFaceDetector`] and [`SFaceEmbedder`].

mod anchors;
mod detector;
mod embedder;
mod engine;
mod error;
mod nms;
mod retinaface;
mod retry;
mod sface;

pub use detector::*;
pub use embedder::*;
pub use engine::*;
pub use error::*;
pub use retinaface::RetinaFaceDetector;
pub use retry::*;
pub use sface::SFaceEmbedder;
