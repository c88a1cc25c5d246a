//! Local snapshot-file vector backend
//!
//! Keeps all points in memory behind an `RwLock` and persists the whole
//! state to a single JSON file as a complete-replace snapshot after every
//! mutation. Suitable for fully-local operation and tests; the snapshot
//! file participates in backup/restore.

use super::{DistanceMetric, NodePoint, VectorBackend};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info, warn};

/// Snapshot file name for the local vector store
pub const VECTORS_FILE: &str = "vectors.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollectionMeta {
    dimension: usize,
    distance: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPoint {
    node_id: String,
    ref_doc_id: String,
    vector: Vec<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LocalState {
    collection: Option<CollectionMeta>,
    #[serde(default)]
    points: HashMap<String, StoredPoint>,
}

/// Vector backend persisted as a local JSON snapshot
pub struct LocalVectorBackend {
    snapshot: Option<PathBuf>,
    state: RwLock<LocalState>,
}

impl LocalVectorBackend {
    /// Create an ephemeral backend with no durable storage
    pub fn in_memory() -> Self {
        Self {
            snapshot: None,
            state: RwLock::new(LocalState::default()),
        }
    }

    /// Open a backend persisted at `<data_dir>/vectors.json`
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let snapshot = data_dir.join(VECTORS_FILE);
        let state = Self::read_snapshot(&snapshot);

        debug!(
            points = state.points.len(),
            "Opened local vector store at {:?}", snapshot
        );

        Ok(Self {
            snapshot: Some(snapshot),
            state: RwLock::new(state),
        })
    }

    fn read_snapshot(path: &Path) -> LocalState {
        if !path.exists() {
            return LocalState::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(file = %path.display(), "Discarding corrupt vector snapshot: {}", e);
                LocalState::default()
            }),
            Err(e) => {
                warn!(file = %path.display(), "Could not read vector snapshot: {}", e);
                LocalState::default()
            }
        }
    }

    fn persist(&self, state: &LocalState) -> Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| Error::Persist(format!("{}: {}", path.display(), e)))?;
        std::fs::write(path, json)
            .map_err(|e| Error::Persist(format!("{}: {}", path.display(), e)))
    }
}

#[async_trait]
impl VectorBackend for LocalVectorBackend {
    async fn collection_exists(&self) -> Result<bool> {
        let state = self.state.read().expect("vector state lock poisoned");
        Ok(state.collection.is_some())
    }

    async fn create_collection(&self, dimension: usize, distance: DistanceMetric) -> Result<()> {
        let mut state = self.state.write().expect("vector state lock poisoned");
        if state.collection.is_some() {
            debug!("Collection already exists");
            return Ok(());
        }

        info!(dimension, %distance, "Creating local vector collection");
        state.collection = Some(CollectionMeta {
            dimension,
            distance: distance.to_string(),
        });
        self.persist(&state)
    }

    async fn insert(&self, points: Vec<NodePoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write().expect("vector state lock poisoned");
        let Some(meta) = &state.collection else {
            return Err(Error::VectorBackend(
                "Collection does not exist; create it before inserting".to_string(),
            ));
        };

        if let Some(mismatch) = points.iter().find(|p| p.vector.len() != meta.dimension) {
            return Err(Error::VectorBackend(format!(
                "Vector dimension mismatch: expected {}, got {}",
                meta.dimension,
                mismatch.vector.len()
            )));
        }

        debug!("Inserting {} points into local vector store", points.len());
        for point in points {
            state.points.insert(
                point.payload.node_id.clone(),
                StoredPoint {
                    node_id: point.payload.node_id.clone(),
                    ref_doc_id: point.payload.ref_doc_id.clone(),
                    vector: point.vector,
                },
            );
        }

        self.persist(&state)
    }

    async fn delete_nodes(&self, node_ids: &[String]) -> Result<()> {
        if node_ids.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write().expect("vector state lock poisoned");
        for node_id in node_ids {
            state.points.remove(node_id);
        }
        self.persist(&state)
    }

    async fn delete_by_ref_doc(&self, doc_id: &str) -> Result<()> {
        let mut state = self.state.write().expect("vector state lock poisoned");
        state.points.retain(|_, p| p.ref_doc_id != doc_id);
        self.persist(&state)
    }

    async fn delete_collection(&self) -> Result<bool> {
        let mut state = self.state.write().expect("vector state lock poisoned");
        if state.collection.is_none() {
            return Ok(false);
        }

        info!("Deleting local vector collection");
        state.collection = None;
        state.points.clear();
        self.persist(&state)?;
        Ok(true)
    }

    async fn count(&self) -> Result<usize> {
        let state = self.state.read().expect("vector state lock poisoned");
        Ok(state.points.len())
    }

    async fn list_ref_doc_ids(&self) -> Result<Option<HashSet<String>>> {
        let state = self.state.read().expect("vector state lock poisoned");
        Ok(Some(
            state.points.values().map(|p| p.ref_doc_id.clone()).collect(),
        ))
    }

    fn snapshot_file(&self) -> Option<PathBuf> {
        self.snapshot.clone()
    }

    async fn reload_snapshot(&self) -> Result<bool> {
        let Some(path) = &self.snapshot else {
            return Ok(false);
        };
        let reloaded = Self::read_snapshot(path);
        let mut state = self.state.write().expect("vector state lock poisoned");
        *state = reloaded;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NodePayload;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn point(node_id: &str, doc_id: &str, dim: usize) -> NodePoint {
        NodePoint {
            id: Uuid::new_v4(),
            vector: vec![0.5; dim],
            payload: NodePayload {
                node_id: node_id.to_string(),
                ref_doc_id: doc_id.to_string(),
                file_name: None,
                chunk_index: 0,
                content_hash: None,
                updated_at: "2026-01-01T00:00:00Z".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_insert_requires_collection() {
        let store = LocalVectorBackend::in_memory();
        let err = store.insert(vec![point("n1", "d1", 4)]).await.unwrap_err();
        assert!(matches!(err, Error::VectorBackend(_)));
    }

    #[tokio::test]
    async fn test_insert_and_delete_by_ref_doc() {
        let store = LocalVectorBackend::in_memory();
        store.create_collection(4, DistanceMetric::Cosine).await.unwrap();
        store
            .insert(vec![point("n1", "d1", 4), point("n2", "d1", 4), point("n3", "d2", 4)])
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 3);

        store.delete_by_ref_doc("d1").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        let ids = store.list_ref_doc_ids().await.unwrap().unwrap();
        assert!(ids.contains("d2"));
        assert!(!ids.contains("d1"));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let store = LocalVectorBackend::in_memory();
        store.create_collection(4, DistanceMetric::Cosine).await.unwrap();

        let err = store.insert(vec![point("n1", "d1", 3)]).await.unwrap_err();
        match err {
            Error::VectorBackend(message) => assert!(message.contains("dimension mismatch")),
            other => panic!("expected vector backend error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let tmp = TempDir::new().unwrap();

        {
            let store = LocalVectorBackend::open(tmp.path()).unwrap();
            store.create_collection(4, DistanceMetric::Cosine).await.unwrap();
            store.insert(vec![point("n1", "d1", 4)]).await.unwrap();
        }

        let reopened = LocalVectorBackend::open(tmp.path()).unwrap();
        assert!(reopened.collection_exists().await.unwrap());
        assert_eq!(reopened.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_collection_clears_points() {
        let store = LocalVectorBackend::in_memory();
        store.create_collection(4, DistanceMetric::Cosine).await.unwrap();
        store.insert(vec![point("n1", "d1", 4)]).await.unwrap();

        assert!(store.delete_collection().await.unwrap());
        assert!(!store.collection_exists().await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);

        // Second delete reports the collection was already gone
        assert!(!store.delete_collection().await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_nodes_tolerates_absent() {
        let store = LocalVectorBackend::in_memory();
        store.create_collection(4, DistanceMetric::Cosine).await.unwrap();
        store.insert(vec![point("n1", "d1", 4)]).await.unwrap();

        store
            .delete_nodes(&["n1".to_string(), "never-existed".to_string()])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
