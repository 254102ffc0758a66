use serde::{Deserialize, Serialize};
use sqlx::Type;

/// Category of a stored object, decided by its file extension only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Page,
    Unknown,
}

/// Whether an object-store notification announced an upload or a deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "event_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Removed,
}

impl EventKind {
    /// Parses an S3 event name such as `s3:ObjectCreated:Put` or `ObjectRemoved:Delete`.
    #[must_use]
    pub fn from_event_name(event_name: &str) -> Option<Self> {
        let name = event_name.strip_prefix("s3:").unwrap_or(event_name);
        if name.starts_with("ObjectCreated") {
            Some(Self::Created)
        } else if name.starts_with("ObjectRemoved") {
            Some(Self::Removed)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn default_event_name(self) -> &'static str {
        match self {
            Self::Created => "s3:ObjectCreated:Put",
            Self::Removed => "s3:ObjectRemoved:Delete",
        }
    }
}
