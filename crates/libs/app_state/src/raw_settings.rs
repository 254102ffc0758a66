use serde::Deserialize;
use std::path::PathBuf;

/// Settings exactly as they appear in `config/settings.yaml` plus `APP__` overrides.
#[derive(Debug, Deserialize, Clone)]
pub struct RawSettings {
    pub object_store: ObjectStoreSettings,
    pub database: DatabaseSettings,
    pub vector_index: VectorIndexSettings,
    pub queue: QueueSettings,
    pub media: RawMediaSettings,
    pub faces: RawFaceSettings,
    pub video: VideoSettings,
    pub transcription: RawTranscriptionSettings,
    pub listener: ListenerSettings,
    pub startup: StartupSettings,
    pub api: ApiSettings,
    pub logging: LoggingSettings,
}

/// Connection to the S3-compatible object store (MinIO).
#[derive(Debug, Deserialize, Clone)]
pub struct ObjectStoreSettings {
    /// e.g. `http://localhost:9000`
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    /// Key prefix for objects this system writes itself (extracted audio).
    pub derived_prefix: String,
    /// Create the bucket on startup when it does not exist.
    pub create_bucket: bool,
}

/// Postgres holds both the job queue and the pgvector face index.
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_lifetime: u64,
    pub idle_timeout: u64,
    pub acquire_timeout: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorIndexSettings {
    pub table: String,
    pub dimension: usize,
    /// Matches returned per query face.
    pub search_limit: usize,
    /// Minimum cosine similarity for a match.
    pub score_threshold: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueSettings {
    pub poll_interval_ms: u64,
    pub heartbeat_interval_seconds: u64,
    pub heartbeat_timeout_seconds: u64,
    pub max_attempts: i32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawMediaSettings {
    pub image_extensions: Vec<String>,
    pub video_extensions: Vec<String>,
    pub audio_extensions: Vec<String>,
    pub page_extensions: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawFaceSettings {
    pub detector_model: PathBuf,
    pub embedder_model: PathBuf,
    /// Square input size the detector was exported with.
    pub detector_input_size: u32,
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    /// Longest image side before detection; larger inputs are downscaled.
    pub max_image_side: u32,
    pub intra_threads: usize,
    pub retry: RetrySettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VideoSettings {
    /// Seconds of video between sampled frames.
    pub sample_interval_seconds: f64,
    pub extract_audio: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawTranscriptionSettings {
    pub model: PathBuf,
    pub language: String,
    pub threads: i32,
    pub output_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ListenerSettings {
    /// Run the notification listener inside the API process.
    pub embedded: bool,
    pub events: Vec<String>,
    pub reconnect_delay_seconds: u64,
    /// Tries per event before it is given up and left to a backfill.
    pub enqueue_attempts: usize,
    /// Unit of the delay between enqueue tries: the n-th retry waits `2^n` units.
    pub enqueue_backoff_ms: u64,
}

/// Bounded retry for infrastructure that is not up yet when a process starts.
#[derive(Debug, Deserialize, Clone)]
pub struct StartupSettings {
    pub attempts: usize,
    pub delay_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiSettings {
    pub host: String,
    pub port: u32,
    pub allowed_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}
