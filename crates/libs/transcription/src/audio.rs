use crate::TranscriptionError;
use std::path::Path;

pub const SAMPLE_RATE: u32 = 16_000;

/// Reads a 16 kHz mono WAV file into f32 samples.
pub fn load_wav_samples(path: &Path) -> Result<Vec<f32>, TranscriptionError> {
    let reader = hound::WavReader::open(path)
        .map_err(|e| TranscriptionError::Audio(format!("failed to open {}: {e}", path.display())))?;
    read_samples(reader)
}

fn read_samples<R: std::io::Read>(
    mut reader: hound::WavReader<R>,
) -> Result<Vec<f32>, TranscriptionError> {
    let spec = reader.spec();
    if spec.sample_rate != SAMPLE_RATE {
        return Err(TranscriptionError::Audio(format!(
            "expected {SAMPLE_RATE} Hz, got {} Hz",
            spec.sample_rate
        )));
    }
    if spec.channels != 1 {
        return Err(TranscriptionError::Audio(format!(
            "expected mono audio, got {} channels",
            spec.channels
        )));
    }

    match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_val = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| {
                    s.map(|v| v as f32 / max_val)
                        .map_err(|e| TranscriptionError::Audio(e.to_string()))
                })
                .collect()
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map_err(|e| TranscriptionError::Audio(e.to_string())))
            .collect(),
    }
}
