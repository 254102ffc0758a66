use crate::TranscriptionError;
use chrono::{DateTime, Utc};
use common_types::ObjectRef;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Transcript of the audio belonging to one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptRecord {
    pub source: ObjectRef,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Writes one transcript per source object below a fixed directory, at
/// `<bucket>/<object key>.txt`.
#[derive(Debug, Clone)]
pub struct TranscriptStore {
    dir: PathBuf,
}

impl TranscriptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Keys map to distinct paths. Empty, `.` and `..` segments are dropped, so
    /// the path never leaves the store's directory.
    #[must_use]
    pub fn path_for(&self, source: &ObjectRef) -> PathBuf {
        let mut path = self.dir.clone();
        if let Some(bucket) = safe_segment(&source.bucket) {
            path.push(bucket);
        }
        let mut segments: Vec<String> = source.key.split('/').filter_map(safe_segment).collect();
        let name = segments.pop().unwrap_or_else(|| "transcript".to_owned());
        path.extend(segments);
        path.push(format!("{name}.txt"));
        path
    }

    /// Writes the transcript, replacing an earlier one for the same source.
    pub async fn write(&self, record: &TranscriptRecord) -> Result<PathBuf, TranscriptionError> {
        let path = self.path_for(&record.source);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("txt.partial");
        fs::write(&tmp, record.text.as_bytes()).await?;
        fs::rename(&tmp, &path).await?;
        info!(
            "Wrote transcript of {} ({} chars) to {}",
            record.source,
            record.text.len(),
            path.display()
        );
        Ok(path)
    }
}

fn safe_segment(segment: &str) -> Option<String> {
    match segment {
        "" | "." | ".." => None,
        _ => Some(segment.replace(['\\', ':', '\0'], "_")),
    }
}
