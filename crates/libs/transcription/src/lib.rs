#![deny(clippy::unwrap_used)]
#![allow(clippy::missing_errors_doc, clippy::cast_precision_loss)]

mod audio;
mod error;
mod store;
mod whisper;

pub use audio::*;
pub use error::*;
pub use store::*;
pub use whisper::*;

/// Speech-to-text model taking 16 kHz mono samples in `[-1, 1]`.
pub trait SpeechToText: Send + Sync {
    fn transcribe(&self, samples: &[f32]) -> Result<String, TranscriptionError>;
}
