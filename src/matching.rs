//! Visual search: find the stored photo whose image is closest to a query image.

use crate::{
    domain::{Embedder, PhotoRepository, VectorIndex},
    errors::{EmbeddingError, IndexError, RepoError},
    storage_uri::canonical_uri_from_url,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Embedding the query image failed")]
    Embedding(#[from] EmbeddingError),
    #[error("Querying the vector index failed")]
    Index(#[from] IndexError),
    #[error("Listing photos failed")]
    Repository(#[from] RepoError),
}

/// Embeds `image`, takes the single nearest indexed vector and returns the id
/// of the photo whose image URL reconstructs to that vector's storage URI.
///
/// Every photo is scanned on each call. `Ok(None)` covers both an empty index
/// and a neighbour that no photo's URL maps back to.
pub async fn find_photo_by_match(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    photos: &dyn PhotoRepository,
    image: &[u8],
) -> Result<Option<String>, MatchError> {
    let embedding = embedder.embed_image(image, None).await?;

    let Some(neighbor) = index.nearest(embedding, 1).await?.into_iter().next() else {
        tracing::info!("Visual match: index returned no neighbours");
        return Ok(None);
    };
    tracing::debug!(neighbor = %neighbor.id, score = neighbor.score, "Visual match: nearest neighbour");

    let matched = photos.list_all().await?.into_iter().find(|photo| {
        photo
            .image_url
            .as_deref()
            .and_then(canonical_uri_from_url)
            .is_some_and(|uri| uri == neighbor.id)
    });

    match matched {
        Some(photo) => {
            tracing::info!(photo_id = %photo.id, neighbor = %neighbor.id, "Visual match: photo found");
            Ok(Some(photo.id))
        }
        None => {
            tracing::info!(neighbor = %neighbor.id, "Visual match: no photo maps to the nearest neighbour");
            Ok(None)
        }
    }
}
