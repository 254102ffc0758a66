use crate::object_store::{ObjectHead, ObjectStore, ObjectStoreError};
use async_trait::async_trait;
use common_types::{ObjectMetadata, ObjectRef};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    metadata: ObjectMetadata,
}

/// Process-local store used by tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<(String, String), StoredObject>>,
    buckets: RwLock<HashSet<String>>,
}

impl InMemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, object: &ObjectRef, bytes: Vec<u8>, metadata: ObjectMetadata) {
        self.buckets.write().await.insert(object.bucket.clone());
        self.objects.write().await.insert(
            (object.bucket.clone(), object.key.clone()),
            StoredObject { bytes, metadata },
        );
    }

    pub async fn remove(&self, object: &ObjectRef) -> bool {
        self.objects
            .write()
            .await
            .remove(&(object.bucket.clone(), object.key.clone()))
            .is_some()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    async fn stored(&self, object: &ObjectRef) -> Option<StoredObject> {
        self.objects
            .read()
            .await
            .get(&(object.bucket.clone(), object.key.clone()))
            .cloned()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, object: &ObjectRef) -> Result<Vec<u8>, ObjectStoreError> {
        self.stored(object)
            .await
            .map(|o| o.bytes)
            .ok_or_else(|| ObjectStoreError::NotFound(object.to_string()))
    }

    async fn download_to(&self, object: &ObjectRef, path: &Path) -> Result<(), ObjectStoreError> {
        let bytes = self.get(object).await?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    async fn head(&self, object: &ObjectRef) -> Result<Option<ObjectHead>, ObjectStoreError> {
        Ok(self.stored(object).await.map(|o| ObjectHead {
            size: o.bytes.len() as u64,
            metadata: o.metadata,
        }))
    }

    async fn put_file(
        &self,
        object: &ObjectRef,
        path: &Path,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        let bytes = tokio::fs::read(path).await?;
        let metadata = ObjectMetadata {
            content_type: Some(content_type.to_owned()),
            ..ObjectMetadata::default()
        };
        self.insert(object, bytes, metadata).await;
        Ok(())
    }

    async fn delete(&self, object: &ObjectRef) -> Result<(), ObjectStoreError> {
        self.remove(object).await;
        Ok(())
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        Ok(self
            .objects
            .read()
            .await
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect())
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<(), ObjectStoreError> {
        self.buckets.write().await.insert(bucket.to_owned());
        Ok(())
    }
}
