use crate::{SpeechToText, TranscriptionError};
use std::path::Path;
use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

pub struct WhisperTranscriber {
    context: WhisperContext,
    language: String,
    threads: i32,
}

impl WhisperTranscriber {
    /// Loads a ggml whisper model. Blocking and slow; do it once per process.
    pub fn new(model_path: &Path, language: &str, threads: i32) -> Result<Self, TranscriptionError> {
        info!("Loading Whisper model from {}", model_path.display());
        let path = model_path
            .to_str()
            .ok_or_else(|| TranscriptionError::ModelLoad("model path is not valid UTF-8".into()))?;
        let context = WhisperContext::new_with_params(path, WhisperContextParameters::default())
            .map_err(|e| TranscriptionError::ModelLoad(e.to_string()))?;
        info!("Whisper model loaded");

        Ok(Self {
            context,
            language: language.to_owned(),
            threads: threads.max(1),
        })
    }
}

impl SpeechToText for WhisperTranscriber {
    fn transcribe(&self, samples: &[f32]) -> Result<String, TranscriptionError> {
        debug!(
            "Transcribing {} samples ({:.1}s)",
            samples.len(),
            samples.len() as f64 / f64::from(crate::SAMPLE_RATE)
        );
        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_n_threads(self.threads);
        if self.language.is_empty() || self.language == "auto" {
            params.set_language(None);
        } else {
            params.set_language(Some(self.language.as_str()));
        }
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_special(false);
        params.set_print_timestamps(false);

        let mut state = self
            .context
            .create_state()
            .map_err(|e| TranscriptionError::Inference(e.to_string()))?;
        state
            .full(params, samples)
            .map_err(|e| TranscriptionError::Inference(e.to_string()))?;

        let text = state
            .as_iter()
            .map(|segment| segment.to_string().trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(text)
    }
}
