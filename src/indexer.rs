//! Offline batch jobs that fill the vector index: one walks a bucket, the
//! other walks the photo documents.

use crate::{
    domain::{Embedder, FileStorage, IndexedVector, PhotoRepository, VectorIndex},
    errors::{EmbeddingError, IndexError, RepoError, StorageError},
    models::Photo,
    storage_uri::StorageUri,
};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Listing source objects failed")]
    Storage(#[from] StorageError),
    #[error("Writing to the vector index failed")]
    Index(#[from] IndexError),
    #[error("Listing photos failed")]
    Repository(#[from] RepoError),
}

/// How vectors are grouped into upsert calls.
#[derive(Debug, Clone, Copy)]
pub struct BatchPolicy {
    pub size: usize,
    /// Pause between consecutive upsert calls.
    pub pause: Duration,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self { size: 10, pause: Duration::from_secs(1) }
    }
}

struct BatchUpserter<'a> {
    index: &'a dyn VectorIndex,
    policy: BatchPolicy,
    pending: Vec<IndexedVector>,
    batches_sent: usize,
}

impl<'a> BatchUpserter<'a> {
    fn new(index: &'a dyn VectorIndex, policy: BatchPolicy) -> Self {
        Self { index, policy, pending: Vec::with_capacity(policy.size), batches_sent: 0 }
    }

    async fn push(&mut self, vector: IndexedVector) -> Result<(), IndexError> {
        self.pending.push(vector);
        if self.pending.len() >= self.policy.size.max(1) {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), IndexError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        if self.batches_sent > 0 && !self.policy.pause.is_zero() {
            tokio::time::sleep(self.policy.pause).await;
        }
        let batch = std::mem::take(&mut self.pending);
        let count = batch.len();
        self.index.upsert(batch).await?;
        self.batches_sent += 1;
        tracing::info!(batch = self.batches_sent, count, "Indexer: Upserted batch");
        Ok(())
    }
}

async fn embed_object(
    storage: &dyn FileStorage,
    embedder: &dyn Embedder,
    object: &StorageUri,
    contextual_text: Option<&str>,
) -> Result<Vec<f32>, EmbedFailure> {
    let image = storage.download(object).await?;
    Ok(embedder.embed_image(&image, contextual_text).await?)
}

#[derive(Error, Debug)]
enum EmbedFailure {
    #[error(transparent)]
    Download(#[from] StorageError),
    #[error(transparent)]
    Embed(#[from] EmbeddingError),
}

/// Embeds every image object in `bucket` (optionally under `prefix`) from the
/// image content alone. Returns how many images were embedded.
pub async fn index_bucket(
    storage: &dyn FileStorage,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    bucket: &str,
    prefix: Option<&str>,
    policy: BatchPolicy,
) -> Result<usize, IndexerError> {
    tracing::info!(%bucket, prefix = prefix.unwrap_or("None"), "Indexer: Listing files");
    let objects = storage.list(bucket, prefix).await?;

    let mut upserter = BatchUpserter::new(index, policy);
    let mut count = 0;
    for object in objects {
        let is_image = object.content_type.as_deref().is_some_and(|ct| ct.starts_with("image/"));
        if object.uri.key.ends_with('/') || !is_image {
            continue;
        }

        tracing::info!(object = %object.uri, "Indexer: Processing");
        match embed_object(storage, embedder, &object.uri, None).await {
            Ok(values) => {
                tracing::info!(object = %object.uri, dimensions = values.len(), "Indexer: Generated embedding");
                upserter.push(IndexedVector { id: object.uri.to_string(), values }).await?;
                count += 1;
            }
            Err(e) => tracing::error!(object = %object.uri, error = %e, "Indexer: Could not process image"),
        }
    }
    upserter.flush().await?;

    tracing::info!(count, "Indexer: Finished processing");
    Ok(count)
}

/// Text that conditions a photo's embedding on its catalogue details.
pub fn contextual_text(photo: &Photo) -> String {
    format!(
        "{}, {}",
        photo.name.as_deref().unwrap_or("Untitled"),
        photo.description.as_deref().unwrap_or("")
    )
}

/// Embeds the image of every photo document, using its name and description as
/// contextual text. Documents whose URL does not map to a storage object are
/// skipped. Returns how many photos were embedded.
pub async fn generate_embeddings(
    photos: &dyn PhotoRepository,
    storage: &dyn FileStorage,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    policy: BatchPolicy,
) -> Result<usize, IndexerError> {
    tracing::info!("Indexer: Generating embeddings for stored photos");
    let mut upserter = BatchUpserter::new(index, policy);
    let mut count = 0;

    for photo in photos.list_all().await? {
        let Some(object) = photo.image_url.as_deref().and_then(StorageUri::from_url) else {
            tracing::warn!(photo_id = %photo.id, image_url = ?photo.image_url, "Indexer: Skipping, no storage URI in image URL");
            continue;
        };

        let text = contextual_text(&photo);
        match embed_object(storage, embedder, &object, Some(&text)).await {
            Ok(values) => {
                tracing::info!(photo_id = %photo.id, %object, dimensions = values.len(), "Indexer: Generated embedding");
                upserter.push(IndexedVector { id: object.to_string(), values }).await?;
                count += 1;
            }
            Err(e) => tracing::error!(photo_id = %photo.id, %object, error = %e, "Indexer: Could not process image"),
        }
    }
    upserter.flush().await?;

    tracing::info!(count, "Indexer: Finished processing");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingIndex {
        batches: Mutex<Vec<Vec<IndexedVector>>>,
    }

    #[async_trait]
    impl VectorIndex for RecordingIndex {
        async fn upsert(&self, vectors: Vec<IndexedVector>) -> Result<(), IndexError> {
            self.batches.lock().unwrap().push(vectors);
            Ok(())
        }

        async fn nearest(&self, _vector: Vec<f32>, _k: u64) -> Result<Vec<crate::domain::Neighbor>, IndexError> {
            Ok(Vec::new())
        }
    }

    fn vector(n: usize) -> IndexedVector {
        IndexedVector { id: format!("s3://bucket/{}.png", n), values: vec![n as f32] }
    }

    #[tokio::test]
    async fn upserter_splits_into_fixed_size_batches() {
        let index = RecordingIndex::default();
        let mut upserter = BatchUpserter::new(&index, BatchPolicy { size: 10, pause: Duration::ZERO });
        for n in 0..23 {
            upserter.push(vector(n)).await.unwrap();
        }
        upserter.flush().await.unwrap();

        let sizes: Vec<usize> = index.batches.lock().unwrap().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![10, 10, 3]);
    }

    #[tokio::test]
    async fn flushing_nothing_sends_nothing() {
        let index = RecordingIndex::default();
        let mut upserter = BatchUpserter::new(&index, BatchPolicy::default());
        upserter.flush().await.unwrap();
        assert!(index.batches.lock().unwrap().is_empty());
    }

    #[test]
    fn contextual_text_defaults_missing_fields() {
        let photo = Photo { id: "p1".into(), ..Default::default() };
        assert_eq!(contextual_text(&photo), "Untitled, ");

        let photo = Photo {
            id: "p2".into(),
            name: Some("Beach".into()),
            description: Some("Sunset over the bay".into()),
            ..Default::default()
        };
        assert_eq!(contextual_text(&photo), "Beach, Sunset over the bay");
    }
}
