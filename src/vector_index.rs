use crate::{
    domain::{IndexedVector, Neighbor, VectorIndex},
    errors::IndexError,
};
use anyhow::Context;
use async_trait::async_trait;
use qdrant_client::qdrant::{
    value::Kind, CreateCollectionBuilder, Distance, PointId, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use uuid::Uuid;

/// Payload field holding the canonical storage URI of the indexed image.
const URI_FIELD: &str = "uri";

/// Qdrant-backed nearest-neighbour index. Point ids are UUIDv5 of the URI so
/// indexing the same object twice overwrites the earlier vector.
pub struct QdrantVectorIndex {
    client: Qdrant,
    collection: String,
}

impl QdrantVectorIndex {
    pub fn connect(url: &str, api_key: Option<String>, collection: String) -> Result<Self, IndexError> {
        let mut builder = Qdrant::from_url(url);
        if let Some(api_key) = api_key {
            builder = builder.api_key(api_key);
        }
        let client = builder
            .build()
            .context(format!("Qdrant: Failed to build client for '{}'", url))?;
        Ok(Self { client, collection })
    }

    /// Creates the collection with cosine distance if it does not exist yet.
    pub async fn ensure_collection(&self, dimension: u64) -> Result<(), IndexError> {
        let exists = self.client
            .collection_exists(&self.collection)
            .await
            .context(format!("Qdrant: Failed to check collection '{}'", self.collection))?;
        if exists {
            tracing::info!(collection = %self.collection, "Startup: Vector collection already exists");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dimension, Distance::Cosine)),
            )
            .await
            .context(format!("Qdrant: Failed to create collection '{}'", self.collection))?;
        tracing::info!(collection = %self.collection, dimension, "Startup: Vector collection created");
        Ok(())
    }
}

pub fn point_id_for(uri: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, uri.as_bytes())
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn upsert(&self, vectors: Vec<IndexedVector>) -> Result<(), IndexError> {
        if vectors.is_empty() {
            return Ok(());
        }
        let count = vectors.len();

        let points: Vec<PointStruct> = vectors
            .into_iter()
            .map(|v| {
                let mut payload: HashMap<String, QdrantValue> = HashMap::new();
                payload.insert(URI_FIELD.to_string(), QdrantValue::from(v.id.clone()));
                PointStruct::new(PointId::from(point_id_for(&v.id).to_string()), v.values, payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .context(format!("Qdrant: Failed to upsert {} points into '{}'", count, self.collection))?;

        tracing::debug!(collection = %self.collection, count, "Qdrant: Points upserted");
        Ok(())
    }

    async fn nearest(&self, vector: Vec<f32>, k: u64) -> Result<Vec<Neighbor>, IndexError> {
        let response = self.client
            .search_points(SearchPointsBuilder::new(&self.collection, vector, k).with_payload(true))
            .await
            .context(format!("Qdrant: Failed to search '{}'", self.collection))?;

        let neighbors = response
            .result
            .into_iter()
            .filter_map(|point| {
                let uri = match point.payload.get(URI_FIELD).and_then(|v| v.kind.as_ref()) {
                    Some(Kind::StringValue(uri)) => uri.clone(),
                    _ => {
                        tracing::warn!(point_id = ?point.id, "Qdrant: Point without a uri payload, skipping");
                        return None;
                    }
                };
                Some(Neighbor { id: uri, score: point.score })
            })
            .collect();
        Ok(neighbors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_are_stable_per_uri() {
        let a = point_id_for("s3://gallery/photos/a.jpg");
        assert_eq!(a, point_id_for("s3://gallery/photos/a.jpg"));
        assert_ne!(a, point_id_for("s3://gallery/photos/b.jpg"));
    }
}
