use crate::errors::{EmbeddingError, IndexError, RepoError, StorageError, TranslateError};
use crate::models::{Photo, PhotoPatch, Profile};
use crate::storage_uri::StorageUri;
use async_trait::async_trait;

/// Trait defining operations for storing and retrieving Photo documents.
#[async_trait]
pub trait PhotoRepository: Send + Sync + 'static { // Send+Sync+'static required for Arc<dyn>
    /// Writes the whole document, replacing whatever was stored under its id.
    async fn put(&self, photo: &Photo) -> Result<(), RepoError>;

    /// Retrieves a photo by its id.
    /// Returns Ok(None) if the photo is not found.
    async fn get_by_id(&self, id: &str) -> Result<Option<Photo>, RepoError>;

    /// Merges the supplied fields into an existing document.
    async fn update(&self, id: &str, patch: &PhotoPatch) -> Result<(), RepoError>;

    async fn delete(&self, id: &str) -> Result<(), RepoError>;

    /// Lists every photo.
    /// WARNING: This is a full scan.
    async fn list_all(&self) -> Result<Vec<Photo>, RepoError>;

    /// Lists photos ordered by description. Photos that have no description
    /// attribute at all are left out; an empty description sorts first.
    async fn list_by_description(&self) -> Result<Vec<Photo>, RepoError> {
        let mut photos: Vec<Photo> = self.list_all().await?.into_iter().filter(|p| p.description.is_some()).collect();
        photos.sort_by(|a, b| a.description.cmp(&b.description));
        Ok(photos)
    }
}

#[async_trait]
pub trait ProfileRepository: Send + Sync + 'static {
    async fn get(&self, email: &str) -> Result<Option<Profile>, RepoError>;

    async fn put(&self, profile: &Profile) -> Result<(), RepoError>;
}

/// An object returned by a bucket listing.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub uri: StorageUri,
    pub content_type: Option<String>,
}

/// Trait defining operations for storing and retrieving file data (photo images).
#[async_trait]
pub trait FileStorage: Send + Sync + 'static {
    /// Uploads file data to the default bucket and returns where it landed.
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<StorageUri, StorageError>;

    async fn download(&self, object: &StorageUri) -> Result<Vec<u8>, StorageError>;

    /// Deletes an object. Deleting a missing object is not an error.
    async fn delete(&self, object: &StorageUri) -> Result<(), StorageError>;

    async fn exists(&self, object: &StorageUri) -> Result<bool, StorageError>;

    async fn list(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<StoredObject>, StorageError>;

    /// The bucket uploads go to and photo images are owned in.
    fn bucket(&self) -> &str;

    /// Public URL under which an object is served.
    fn public_url(&self, object: &StorageUri) -> String;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub translated_text: String,
    pub detected_language_code: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Language {
    pub code: String,
    pub display_name: String,
}

#[async_trait]
pub trait Translator: Send + Sync + 'static {
    /// Detects the source language and translates into `target_language_code`.
    async fn translate(&self, text: &str, target_language_code: &str) -> Result<Translation, TranslateError>;

    async fn languages(&self) -> Result<Vec<Language>, TranslateError>;
}

#[async_trait]
pub trait Embedder: Send + Sync + 'static {
    /// Embeds an image, optionally conditioned on text describing it.
    async fn embed_image(&self, image: &[u8], contextual_text: Option<&str>) -> Result<Vec<f32>, EmbeddingError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexedVector {
    /// Canonical storage URI of the source image.
    pub id: String,
    pub values: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: String,
    pub score: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync + 'static {
    async fn upsert(&self, vectors: Vec<IndexedVector>) -> Result<(), IndexError>;

    /// Returns up to `k` closest stored vectors, best first.
    async fn nearest(&self, vector: Vec<f32>, k: u64) -> Result<Vec<Neighbor>, IndexError>;
}
