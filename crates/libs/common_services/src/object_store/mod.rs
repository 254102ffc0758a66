mod error;
mod memory;
mod s3;

pub use error::ObjectStoreError;
pub use memory::InMemoryObjectStore;
pub use s3::S3ObjectStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common_types::{ObjectMetadata, ObjectRef};
use std::collections::HashMap;
use std::path::Path;

/// Size and metadata of an object that exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectHead {
    pub size: u64,
    pub metadata: ObjectMetadata,
}

/// Blob storage the pipeline reads media from and writes derived audio to.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, object: &ObjectRef) -> Result<Vec<u8>, ObjectStoreError>;

    /// Streams the object into a local file, creating or truncating it.
    async fn download_to(&self, object: &ObjectRef, path: &Path) -> Result<(), ObjectStoreError>;

    /// `None` when the object does not exist.
    async fn head(&self, object: &ObjectRef) -> Result<Option<ObjectHead>, ObjectStoreError>;

    async fn put_file(
        &self,
        object: &ObjectRef,
        path: &Path,
        content_type: &str,
    ) -> Result<(), ObjectStoreError>;

    /// Deleting a missing object is not an error.
    async fn delete(&self, object: &ObjectRef) -> Result<(), ObjectStoreError>;

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, ObjectStoreError>;

    async fn ensure_bucket(&self, bucket: &str) -> Result<(), ObjectStoreError>;

    async fn exists(&self, object: &ObjectRef) -> Result<bool, ObjectStoreError> {
        Ok(self.head(object).await?.is_some())
    }
}

/// Builds [`ObjectMetadata`] from S3 user metadata.
///
/// Keys are matched case-insensitively, with or without the `x-amz-meta-` prefix.
#[must_use]
pub fn metadata_from_user_map(
    user_metadata: &HashMap<String, String>,
    content_type: Option<&str>,
    last_modified: Option<DateTime<Utc>>,
) -> ObjectMetadata {
    let normalized: HashMap<String, &String> = user_metadata
        .iter()
        .map(|(k, v)| {
            let key = k.to_lowercase();
            let key = key.strip_prefix("x-amz-meta-").unwrap_or(&key).to_owned();
            (key.replace('_', "-"), v)
        })
        .collect();
    let lookup = |name: &str| {
        normalized
            .get(name)
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
    };

    let uploaded_at = lookup("uploaded-at")
        .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .or(last_modified);

    ObjectMetadata {
        source_url: lookup("source-url"),
        media_url: lookup("media-url"),
        content_type: content_type.map(ToOwned::to_owned),
        uploaded_at,
    }
}
