//! Photo operations shared by the web pages and the callable tier.

use crate::{
    domain::{FileStorage, PhotoRepository},
    errors::{AppError, RepoError},
    models::{Photo, PhotoFields},
    storage_uri::StorageUri,
};
use uuid::Uuid;

pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// Creates a new photo document under a fresh id and returns it.
pub async fn create_photo(
    photos: &dyn PhotoRepository,
    fields: PhotoFields,
    uploader_id: &str,
) -> Result<Photo, RepoError> {
    let photo = Photo::from_fields(Uuid::new_v4().to_string(), fields, Some(uploader_id.to_string()));
    photos.put(&photo).await?;
    tracing::info!(photo_id = %photo.id, uploader = %uploader_id, "Photo created");
    Ok(photo)
}

/// Deletes the photo's image and then the document. The image is only
/// removed when it lives in the gallery's own bucket and no other photo
/// refers to it. A failed image delete is logged and does not stop the
/// document delete.
pub async fn delete_photo(
    photos: &dyn PhotoRepository,
    storage: &dyn FileStorage,
    photo: &Photo,
) -> Result<(), RepoError> {
    match photo.image_url.as_deref().and_then(StorageUri::from_url) {
        Some(object) if object.bucket != storage.bucket() => {
            tracing::info!(photo_id = %photo.id, %object, "Image is outside the photo bucket, leaving it in place")
        }
        Some(object) => {
            let shared_with = photos
                .list_all()
                .await?
                .into_iter()
                .filter(|other| other.id != photo.id)
                .find(|other| other.image_url.as_deref().and_then(StorageUri::from_url).as_ref() == Some(&object));
            match shared_with {
                Some(other) => {
                    tracing::info!(photo_id = %photo.id, other_photo_id = %other.id, %object, "Image is still used by another photo, leaving it in place")
                }
                None => delete_image(storage, &photo.id, &object).await,
            }
        }
        None => {
            tracing::debug!(photo_id = %photo.id, image_url = ?photo.image_url, "No storage object behind image URL")
        }
    }

    photos.delete(&photo.id).await?;
    tracing::info!(photo_id = %photo.id, "Photo deleted");
    Ok(())
}

// Best effort: failures are logged and swallowed.
async fn delete_image(storage: &dyn FileStorage, photo_id: &str, object: &StorageUri) {
    match storage.exists(object).await {
        Ok(false) => {
            tracing::info!(%photo_id, %object, "Photo image is already gone from storage");
            return;
        }
        Ok(true) => {}
        Err(e) => tracing::warn!(%photo_id, %object, error = ?e, "Could not check for photo image, deleting anyway"),
    }
    match storage.delete(object).await {
        Ok(()) => tracing::debug!(%photo_id, %object, "Deleted photo image from storage"),
        Err(e) => {
            tracing::warn!(%photo_id, %object, error = ?e, "Failed to delete photo image, proceeding with document deletion")
        }
    }
}

/// Uploads a submitted image under a generated key and returns its public URL.
pub async fn store_image(
    storage: &dyn FileStorage,
    filename: Option<&str>,
    content_type: Option<String>,
    data: Vec<u8>,
) -> Result<String, AppError> {
    let extension = filename
        .and_then(|name| name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase()))
        .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .ok_or_else(|| {
            AppError::InvalidInput(format!(
                "image must be one of: {}",
                ALLOWED_EXTENSIONS.join(", ")
            ))
        })?;

    let key = format!("photos/{}.{}", Uuid::new_v4(), extension);

    // Guess content type more reliably for upload if not provided
    let content_type = content_type
        .filter(|ct| ct.starts_with("image/"))
        .or_else(|| mime_guess::from_path(&key).first_raw().map(str::to_string));

    let object = storage.upload(&key, data, content_type).await?;

    let url = storage.public_url(&object);
    tracing::info!(filename = ?filename, %object, %url, "Uploaded image");
    Ok(url)
}
