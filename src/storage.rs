use crate::{
    domain::{FileStorage, StoredObject},
    errors::StorageError,
    storage_uri::StorageUri,
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_s3::{error::SdkError, primitives::ByteStream, Client as S3Client};
use tracing;

#[derive(Debug, Clone)]
pub struct S3FileStorage {
    client: S3Client,
    bucket_name: String,
    region: String,
    endpoint: Option<String>,
}

impl S3FileStorage {
    pub fn new(client: S3Client, bucket_name: String, region: String, endpoint: Option<String>) -> Self {
        Self { client, bucket_name, region, endpoint }
    }
}

#[async_trait]
impl FileStorage for S3FileStorage {
    /// Uploads data to S3 using PutObject. Sets Content-Type.
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<StorageUri, StorageError> {
        let content_type = content_type.unwrap_or_else(|| "application/octet-stream".to_string());
        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, %content_type, "S3: Uploading file");

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .context(format!("S3: Failed to upload object with key '{}'", key))
            .map_err(|e| StorageError::UploadFailed(format!("{:#}", e)))?;

        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, "S3: Upload successful");
        Ok(StorageUri::new(self.bucket_name.clone(), key))
    }

    /// Downloads object bytes using GetObject.
    async fn download(&self, object: &StorageUri) -> Result<Vec<u8>, StorageError> {
        tracing::debug!(%object, "S3: Downloading file");

        let output = self.client
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await
            .map_err(|sdk_err| {
                if let SdkError::ServiceError(service_err) = &sdk_err {
                    if service_err.err().is_no_such_key() {
                        tracing::warn!(%object, "S3: NoSuchKey error downloading file");
                        return StorageError::NotFound(object.to_string());
                    }
                }
                StorageError::BackendError(anyhow::Error::new(sdk_err).context(format!("S3: Failed to download object '{}'", object)))
            })?;

        let data = output
            .body
            .collect()
            .await
            .context(format!("S3: Failed to read body of object '{}'", object))
            .map_err(StorageError::BackendError)?;

        Ok(data.into_bytes().to_vec())
    }

    /// Deletes an object from S3 using DeleteObject.
    async fn delete(&self, object: &StorageUri) -> Result<(), StorageError> {
        tracing::debug!(%object, "S3: Deleting object");

        self.client
            .delete_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await
            .map_err(|sdk_err| {
                // DeleteObject generally succeeds even if the object doesn't exist.
                tracing::error!(%object, error = %sdk_err, "S3: Error deleting object");
                StorageError::BackendError(anyhow::Error::new(sdk_err).context(format!("S3: Failed to delete object '{}'", object)))
            })?;

        tracing::debug!(%object, "S3: Delete request successful (object might not have existed)");
        Ok(())
    }

    /// Checks for an object with HeadObject. A 404 is `Ok(false)`.
    async fn exists(&self, object: &StorageUri) -> Result<bool, StorageError> {
        match self.client.head_object().bucket(&object.bucket).key(&object.key).send().await {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(service_err)) if service_err.err().is_not_found() => Ok(false),
            Err(sdk_err) => Err(StorageError::BackendError(
                anyhow::Error::new(sdk_err).context(format!("S3: Failed to look up object '{}'", object)),
            )),
        }
    }

    /// Lists objects with ListObjectsV2, following continuation tokens.
    /// Content types are guessed from the key; the listing does not carry them.
    async fn list(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<StoredObject>, StorageError> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let resp = self.client
                .list_objects_v2()
                .bucket(bucket)
                .set_prefix(prefix.map(str::to_string))
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .context(format!("S3: Failed to list bucket '{}'", bucket))
                .map_err(StorageError::BackendError)?;

            for entry in resp.contents() {
                let Some(key) = entry.key() else { continue };
                objects.push(StoredObject {
                    uri: StorageUri::new(bucket, key),
                    content_type: mime_guess::from_path(key).first_raw().map(str::to_string),
                });
            }

            match resp.next_continuation_token() {
                Some(token) if resp.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        tracing::debug!(%bucket, ?prefix, count = objects.len(), "S3: Listing complete");
        Ok(objects)
    }

    fn bucket(&self) -> &str {
        &self.bucket_name
    }

    fn public_url(&self, object: &StorageUri) -> String {
        object.public_url(&self.region, self.endpoint.as_deref())
    }
}
