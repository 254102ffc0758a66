use crate::{
    ApiSettings, DatabaseSettings, ListenerSettings, LoggingSettings, ObjectStoreSettings,
    QueueSettings, RawMediaSettings, RawSettings, RetrySettings, StartupSettings, VectorIndexSettings,
    VideoSettings,
};
use color_eyre::eyre::{Context, Result, bail};
use common_types::MediaKind;
use std::collections::HashSet;
use std::path::{PathBuf, absolute};

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub object_store: ObjectStoreSettings,
    pub database: DatabaseSettings,
    pub vector_index: VectorIndexSettings,
    pub queue: QueueSettings,
    pub media: MediaSettings,
    pub faces: FaceSettings,
    pub video: VideoSettings,
    pub transcription: TranscriptionSettings,
    pub listener: ListenerSettings,
    pub startup: StartupSettings,
    pub api: ApiSettings,
    pub logging: LoggingSettings,
}

/// Extension sets used to classify objects, lower-case and without dots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSettings {
    pub image_extensions: HashSet<String>,
    pub video_extensions: HashSet<String>,
    pub audio_extensions: HashSet<String>,
    pub page_extensions: HashSet<String>,
}

#[derive(Debug, Clone)]
pub struct FaceSettings {
    pub detector_model: PathBuf,
    pub embedder_model: PathBuf,
    pub detector_input_size: u32,
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    pub max_image_side: u32,
    pub intra_threads: usize,
    pub retry: RetrySettings,
}

#[derive(Debug, Clone)]
pub struct TranscriptionSettings {
    pub model: PathBuf,
    pub language: String,
    pub threads: i32,
    pub output_dir: PathBuf,
}

impl TryFrom<RawSettings> for AppSettings {
    type Error = color_eyre::Report;

    fn try_from(raw: RawSettings) -> Result<Self> {
        if raw.vector_index.dimension == 0 {
            bail!("vector_index.dimension must be greater than zero");
        }
        if raw.video.sample_interval_seconds <= 0.0 {
            bail!("video.sample_interval_seconds must be positive");
        }

        let faces = FaceSettings {
            detector_model: absolute(&raw.faces.detector_model)
                .wrap_err("Invalid faces.detector_model")?,
            embedder_model: absolute(&raw.faces.embedder_model)
                .wrap_err("Invalid faces.embedder_model")?,
            detector_input_size: raw.faces.detector_input_size,
            confidence_threshold: raw.faces.confidence_threshold,
            nms_threshold: raw.faces.nms_threshold,
            max_image_side: raw.faces.max_image_side,
            intra_threads: raw.faces.intra_threads,
            retry: raw.faces.retry,
        };
        let transcription = TranscriptionSettings {
            model: absolute(&raw.transcription.model).wrap_err("Invalid transcription.model")?,
            language: raw.transcription.language,
            threads: raw.transcription.threads,
            output_dir: absolute(&raw.transcription.output_dir)
                .wrap_err("Invalid transcription.output_dir")?,
        };

        Ok(Self {
            object_store: raw.object_store,
            database: raw.database,
            vector_index: raw.vector_index,
            queue: raw.queue,
            media: raw.media.into(),
            faces,
            video: raw.video,
            transcription,
            listener: raw.listener,
            startup: raw.startup,
            api: raw.api,
            logging: raw.logging,
        })
    }
}

impl AppSettings {
    /// Objects under the derived prefix were written by this system and are never
    /// routed to face processing.
    #[must_use]
    pub fn is_derived_key(&self, key: &str) -> bool {
        !self.object_store.derived_prefix.is_empty()
            && key.starts_with(&self.object_store.derived_prefix)
    }
}

fn normalize_extensions(extensions: Vec<String>) -> HashSet<String> {
    extensions
        .into_iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect()
}

impl From<RawMediaSettings> for MediaSettings {
    fn from(raw: RawMediaSettings) -> Self {
        Self {
            image_extensions: normalize_extensions(raw.image_extensions),
            video_extensions: normalize_extensions(raw.video_extensions),
            audio_extensions: normalize_extensions(raw.audio_extensions),
            page_extensions: normalize_extensions(raw.page_extensions),
        }
    }
}

impl Default for MediaSettings {
    fn default() -> Self {
        let set = |items: &[&str]| items.iter().map(|s| (*s).to_owned()).collect();
        RawMediaSettings {
            image_extensions: set(&["jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp"]),
            video_extensions: set(&["mp4", "avi", "mov", "wmv", "flv", "webm", "mkv"]),
            audio_extensions: set(&["wav", "mp3", "flac", "ogg", "m4a"]),
            page_extensions: set(&["html", "htm"]),
        }
        .into()
    }
}

impl MediaSettings {
    /// Classifies an object key by its extension, case-insensitively.
    #[must_use]
    pub fn classify(&self, key: &str) -> MediaKind {
        let Some(extension) = crate::key_extension(key) else {
            return MediaKind::Unknown;
        };
        if self.image_extensions.contains(&extension) {
            MediaKind::Image
        } else if self.video_extensions.contains(&extension) {
            MediaKind::Video
        } else if self.audio_extensions.contains(&extension) {
            MediaKind::Audio
        } else if self.page_extensions.contains(&extension) {
            MediaKind::Page
        } else {
            MediaKind::Unknown
        }
    }
}
