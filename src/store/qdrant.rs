//! Qdrant vector backend
//!
//! Wraps the Qdrant client behind the [`VectorBackend`] contract:
//! collection management, point upsert/delete, filter-based deletion by
//! owning document, and scroll-based ref-doc enumeration.

use super::{DistanceMetric, NodePoint, VectorBackend};
use crate::error::{Error, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointId,
    PointStruct, ScalarQuantizationBuilder, ScrollPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::HashSet;
use tracing::{debug, info};

/// Qdrant-backed embedding store
pub struct QdrantBackend {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantBackend {
    /// Create a new backend for the given URL and collection name
    pub fn new(
        url: &str,
        collection: &str,
        dimension: usize,
        api_key: Option<String>,
    ) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let mut builder = Qdrant::from_url(url).skip_compatibility_check();
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder
            .build()
            .map_err(|e| Error::VectorBackend(e.to_string()))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
            dimension,
        })
    }

    /// The expected vector dimension for this store
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn to_distance(distance: DistanceMetric) -> Distance {
        match distance {
            DistanceMetric::Cosine => Distance::Cosine,
            DistanceMetric::Dot => Distance::Dot,
            DistanceMetric::Euclid => Distance::Euclid,
        }
    }
}

#[async_trait]
impl VectorBackend for QdrantBackend {
    async fn collection_exists(&self) -> Result<bool> {
        let exists = self.client.collection_exists(&self.collection).await?;
        Ok(exists)
    }

    async fn create_collection(&self, dimension: usize, distance: DistanceMetric) -> Result<()> {
        if self.client.collection_exists(&self.collection).await? {
            debug!("Collection {} already exists", self.collection);
            return Ok(());
        }

        info!(
            "Creating collection {} with dimension {}",
            self.collection, dimension
        );

        let vectors_config = VectorParamsBuilder::new(dimension as u64, Self::to_distance(distance));

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(vectors_config)
                    .quantization_config(ScalarQuantizationBuilder::default()),
            )
            .await?;

        info!("Collection {} created successfully", self.collection);
        Ok(())
    }

    async fn insert(&self, points: Vec<NodePoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        if let Some(mismatch) = points.iter().find(|p| p.vector.len() != self.dimension) {
            return Err(Error::VectorBackend(format!(
                "Vector dimension mismatch for collection '{}': expected {}, got {}",
                self.collection,
                self.dimension,
                mismatch.vector.len()
            )));
        }

        debug!(
            "Upserting {} points to collection {}",
            points.len(),
            self.collection
        );

        let point_structs: Vec<PointStruct> =
            points.into_iter().map(|p| p.to_point_struct()).collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, point_structs))
            .await?;

        Ok(())
    }

    async fn delete_nodes(&self, node_ids: &[String]) -> Result<()> {
        if node_ids.is_empty() {
            return Ok(());
        }

        debug!(
            "Deleting {} points from collection {}",
            node_ids.len(),
            self.collection
        );

        let ids: Vec<PointId> = node_ids.iter().map(|id| PointId::from(id.clone())).collect();

        self.client
            .delete_points(DeletePointsBuilder::new(&self.collection).points(ids))
            .await?;

        Ok(())
    }

    async fn delete_by_ref_doc(&self, doc_id: &str) -> Result<()> {
        debug!(
            "Deleting points for document {} from collection {}",
            doc_id, self.collection
        );

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(Filter::must([Condition::matches(
                        "ref_doc_id",
                        doc_id.to_string(),
                    )])),
            )
            .await?;

        Ok(())
    }

    async fn delete_collection(&self) -> Result<bool> {
        if !self.client.collection_exists(&self.collection).await? {
            return Ok(false);
        }

        info!("Deleting collection {}", self.collection);
        self.client.delete_collection(&self.collection).await?;
        Ok(true)
    }

    async fn count(&self) -> Result<usize> {
        let info = self.client.collection_info(&self.collection).await?;

        let points_count = info
            .result
            .map(|r| r.points_count.unwrap_or(0))
            .unwrap_or(0);

        Ok(points_count as usize)
    }

    /// Scrolls through all points collecting distinct `ref_doc_id` payload
    /// values
    async fn list_ref_doc_ids(&self) -> Result<Option<HashSet<String>>> {
        let mut doc_ids = HashSet::new();
        let mut offset: Option<PointId> = None;
        let batch_size = 1000u32;

        loop {
            let mut scroll_builder = ScrollPointsBuilder::new(&self.collection)
                .limit(batch_size)
                .with_payload(true)
                .with_vectors(false);

            if let Some(ref o) = offset {
                scroll_builder = scroll_builder.offset(o.clone());
            }

            let response = self.client.scroll(scroll_builder).await?;

            let points = response.result;
            if points.is_empty() {
                break;
            }

            for point in &points {
                if let Some(value) = point.payload.get("ref_doc_id") {
                    if let Some(qdrant_client::qdrant::value::Kind::StringValue(s)) = &value.kind {
                        doc_ids.insert(s.clone());
                    }
                }
            }

            offset = response.next_page_offset;
            if offset.is_none() {
                break;
            }
        }

        Ok(Some(doc_ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NodePayload;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_insert_rejects_dimension_mismatch() {
        let store = QdrantBackend::new("http://127.0.0.1:6334", "test_collection", 3, None)
            .expect("store should initialize");

        let point = NodePoint {
            id: Uuid::new_v4(),
            vector: vec![0.1, 0.2],
            payload: NodePayload {
                node_id: "node-1".to_string(),
                ref_doc_id: "doc-1".to_string(),
                file_name: Some("readme.md".to_string()),
                chunk_index: 0,
                content_hash: Some("hash123".to_string()),
                updated_at: "2026-01-01T00:00:00Z".to_string(),
            },
        };

        let err = store
            .insert(vec![point])
            .await
            .expect_err("should reject mismatched vector length");

        match err {
            Error::VectorBackend(message) => {
                assert!(message.contains("Vector dimension mismatch"))
            }
            other => panic!("expected vector backend error, got {other:?}"),
        }
    }
}
