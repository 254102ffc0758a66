use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("failed to load speech model: {0}")]
    ModelLoad(String),

    #[error("failed to read audio: {0}")]
    Audio(String),

    #[error("transcription failed: {0}")]
    Inference(String),

    #[error("failed to write transcript: {0}")]
    Io(#[from] std::io::Error),
}
