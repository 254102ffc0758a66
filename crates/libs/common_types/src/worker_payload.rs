use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of a `media_event` job: the raw notification record it came from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaEventPayload {
    pub event_name: String,
    #[serde(default)]
    pub event_data: Option<Value>,
}

/// Payload of a `transcribe` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribePayload {
    /// Key of the audio object to transcribe.
    pub audio_key: String,
    /// Key of the object the audio belongs to; names the transcript file.
    pub source_key: String,
    /// Remove the audio object after a successful transcription.
    pub delete_audio: bool,
}
