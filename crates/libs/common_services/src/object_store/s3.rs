use crate::object_store::{ObjectHead, ObjectStore, ObjectStoreError, metadata_from_user_map};
use app_state::ObjectStoreSettings;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use chrono::DateTime;
use common_types::ObjectRef;
use std::collections::HashMap;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// S3-compatible store, configured for `MinIO` path-style addressing.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    #[must_use]
    pub fn new(settings: &ObjectStoreSettings) -> Self {
        let credentials = Credentials::new(
            &settings.access_key,
            &settings.secret_key,
            None,
            None,
            "settings",
        );
        let config = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(settings.region.clone()))
            .endpoint_url(&settings.endpoint)
            .force_path_style(true)
            .behavior_version_latest()
            .build();

        Self {
            client: Client::from_conf(config),
        }
    }
}

fn backend<E: std::fmt::Display>(error: E) -> ObjectStoreError {
    ObjectStoreError::Backend(error.to_string())
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, object: &ObjectRef) -> Result<Vec<u8>, ObjectStoreError> {
        let response = self
            .client
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    ObjectStoreError::NotFound(object.to_string())
                } else {
                    backend(e)
                }
            })?;

        let bytes = response.body.collect().await.map_err(backend)?;
        Ok(bytes.to_vec())
    }

    async fn download_to(&self, object: &ObjectRef, path: &Path) -> Result<(), ObjectStoreError> {
        let response = self
            .client
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    ObjectStoreError::NotFound(object.to_string())
                } else {
                    backend(e)
                }
            })?;

        let mut body = response.body;
        let mut file = tokio::fs::File::create(path).await?;
        let mut written = 0usize;
        while let Some(chunk) = body.try_next().await.map_err(backend)? {
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;
        debug!("Downloaded {} ({} bytes) to {}", object, written, path.display());
        Ok(())
    }

    async fn head(&self, object: &ObjectRef) -> Result<Option<ObjectHead>, ObjectStoreError> {
        let response = match self
            .client
            .head_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => {
                return Ok(None);
            }
            Err(e) => return Err(backend(e)),
        };

        let last_modified = response
            .last_modified()
            .and_then(|dt| DateTime::from_timestamp(dt.secs(), dt.subsec_nanos()));
        let empty = HashMap::new();
        let metadata = metadata_from_user_map(
            response.metadata().unwrap_or(&empty),
            response.content_type(),
            last_modified,
        );

        Ok(Some(ObjectHead {
            size: response
                .content_length()
                .and_then(|l| u64::try_from(l).ok())
                .unwrap_or_default(),
            metadata,
        }))
    }

    async fn put_file(
        &self,
        object: &ObjectRef,
        path: &Path,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        let body = ByteStream::from_path(path).await.map_err(backend)?;
        self.client
            .put_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(backend)?;
        debug!("Uploaded {} to {}", path.display(), object);
        Ok(())
    }

    async fn delete(&self, object: &ObjectRef) -> Result<(), ObjectStoreError> {
        self.client
            .delete_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(backend)?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|o| o.key().map(ToOwned::to_owned)),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_owned());
                }
                _ => break,
            }
        }

        Ok(keys)
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<(), ObjectStoreError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => return Ok(()),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => {}
            Err(e) => return Err(backend(e)),
        }

        info!("Creating bucket {bucket}");
        match self.client.create_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error().is_some_and(|se| {
                    se.is_bucket_already_owned_by_you() || se.is_bucket_already_exists()
                }) =>
            {
                Ok(())
            }
            Err(e) => Err(backend(e)),
        }
    }
}
