use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The (bucket, key) pair identifying a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Final path segment of the key, e.g. `clip.mp4` for `media/2024/clip.mp4`.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// Lower-cased extension without the dot, if there is one.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(name[idx + 1..].to_lowercase()),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// User metadata stored alongside an object by the crawler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Page the media was found on.
    pub source_url: Option<String>,
    /// Direct URL of the media itself.
    pub media_url: Option<String>,
    pub content_type: Option<String>,
    pub uploaded_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_key_into_name_parts() {
        let object = ObjectRef::new("scraped", "media/2024/Clip.Final.MP4");
        assert_eq!(object.file_name(), "Clip.Final.MP4");
        assert_eq!(object.extension().as_deref(), Some("mp4"));
        assert_eq!(object.to_string(), "scraped/media/2024/Clip.Final.MP4");
    }

    #[test]
    fn hidden_and_extensionless_names() {
        assert_eq!(ObjectRef::new("b", "dir/.profile").extension(), None);
        assert_eq!(ObjectRef::new("b", "README").extension(), None);
    }
}
