//! Storage administration
//!
//! Recovery tooling composed from the other components: emergency wipe,
//! snapshot backup/restore, and full health diagnosis.

use crate::config::Config;
use crate::consistency::{ConsistencyChecker, ConsistencyReport};
use crate::engine::MutationLock;
use crate::error::{Error, Result};
use crate::index::ReferenceIndex;
use crate::store::{DistanceMetric, VectorBackend};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Counts from an emergency clear
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ClearStats {
    pub documents_cleared: usize,
    pub nodes_cleared: usize,
    pub errors: usize,
}

/// Reachability probe result for one backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendProbe {
    pub name: String,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Overall system health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Critical => write!(f, "critical"),
        }
    }
}

/// Aggregated diagnosis: probes plus a full consistency check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub probes: Vec<BackendProbe>,
    pub consistency: ConsistencyReport,
}

/// Administrative operations over all three stores
pub struct StorageAdmin {
    config: Config,
    index: Arc<RwLock<ReferenceIndex>>,
    vectors: Arc<dyn VectorBackend>,
    mutation: MutationLock,
}

impl StorageAdmin {
    pub fn new(
        config: Config,
        index: Arc<RwLock<ReferenceIndex>>,
        vectors: Arc<dyn VectorBackend>,
        mutation: MutationLock,
    ) -> Self {
        Self {
            config,
            index,
            vectors,
            mutation,
        }
    }

    fn distance(&self) -> DistanceMetric {
        self.config
            .vector
            .distance
            .parse()
            .unwrap_or(DistanceMetric::Cosine)
    }

    /// Wipe every store and recreate an empty collection.
    ///
    /// Refuses to do anything without `force`: zero deletions, error count
    /// of one. With `force`, individual failures are counted and the wipe
    /// continues; persistence is always attempted at the end.
    pub async fn emergency_clear_all(&self, force: bool) -> ClearStats {
        if !force {
            warn!("Refusing emergency clear without force");
            return ClearStats {
                errors: 1,
                ..Default::default()
            };
        }

        let _guard = self.mutation.lock().await;
        let mut stats = ClearStats::default();

        {
            let mut index = self.index.write().expect("reference index lock poisoned");
            stats.documents_cleared = index.all_reference_info().len();
            stats.nodes_cleared = index.node_count();
            index.clear();
        }

        // Fast path: drop the whole collection instead of deleting per node
        match self.vectors.delete_collection().await {
            Ok(_) => {
                if let Err(e) = self
                    .vectors
                    .create_collection(self.config.embedding.dimension, self.distance())
                    .await
                {
                    warn!("Could not recreate collection after clear: {}", e);
                    stats.errors += 1;
                }
            }
            Err(e) => {
                warn!("Could not delete collection during clear: {}", e);
                stats.errors += 1;
            }
        }

        let persist_result = {
            let index = self.index.read().expect("reference index lock poisoned");
            index.persist()
        };
        if let Err(e) = persist_result {
            warn!("Persist after clear failed: {}", e);
            stats.errors += 1;
        }

        info!(
            documents = stats.documents_cleared,
            nodes = stats.nodes_cleared,
            errors = stats.errors,
            "Emergency clear complete"
        );
        stats
    }

    /// Copy the current on-disk snapshot files into a backup directory.
    ///
    /// Not transactional: each backend's file is copied independently, so a
    /// backup taken during an in-flight ingest may be internally
    /// inconsistent. A remote vector backend contributes no file; its
    /// collection must be re-embedded or repaired after a restore.
    pub async fn backup(&self, name: Option<&str>) -> Result<PathBuf> {
        let dir_name = match name {
            Some(n) => n.to_string(),
            None => Utc::now().format("%Y%m%d-%H%M%S").to_string(),
        };
        let backup_dir = self.config.paths.backup_dir.join(dir_name);
        std::fs::create_dir_all(&backup_dir)?;

        let mut files = {
            let index = self.index.read().expect("reference index lock poisoned");
            index.snapshot_files()
        };
        match self.vectors.snapshot_file() {
            Some(file) => files.push(file),
            None => info!("Vector backend has no local snapshot; not included in backup"),
        }

        let mut copied = 0;
        for file in &files {
            if !file.exists() {
                continue;
            }
            let Some(file_name) = file.file_name() else {
                continue;
            };
            std::fs::copy(file, backup_dir.join(file_name))?;
            copied += 1;
        }

        info!(files = copied, "Backup written to {:?}", backup_dir);
        Ok(backup_dir)
    }

    /// Overwrite current on-disk state with a backup's files.
    ///
    /// Refuses without `force` and returns `false`. With `force`, copies
    /// the backup's snapshot files over the data directory and reloads
    /// every local store from disk.
    pub async fn restore(&self, backup_dir: &Path, force: bool) -> Result<bool> {
        if !force {
            warn!("Refusing restore without force");
            return Ok(false);
        }

        if !backup_dir.is_dir() {
            return Err(Error::InvalidPath(format!(
                "Backup directory not found: {}",
                backup_dir.display()
            )));
        }

        let _guard = self.mutation.lock().await;

        let data_dir = self.config.paths.data_dir.clone();
        std::fs::create_dir_all(&data_dir)?;

        let mut restored = 0;
        for entry in std::fs::read_dir(backup_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() {
                std::fs::copy(&path, data_dir.join(entry.file_name()))?;
                restored += 1;
            }
        }

        {
            let reloaded = ReferenceIndex::open(&data_dir)?;
            let mut index = self.index.write().expect("reference index lock poisoned");
            *index = reloaded;
        }

        if let Err(e) = self.vectors.reload_snapshot().await {
            warn!("Vector snapshot reload failed after restore: {}", e);
        }

        info!(files = restored, "Restored from {:?}", backup_dir);
        Ok(true)
    }

    /// Probe every backend and run a full consistency check.
    ///
    /// Critical status is triggered solely by a critical-severity
    /// inconsistency; unreachable backends alone degrade but do not
    /// escalate. A critical diagnosis is still a successful call.
    pub async fn diagnose(&self) -> Result<HealthReport> {
        let mut probes = Vec::new();

        let (doc_probe, index_probe) = {
            let index = self.index.read().expect("reference index lock poisoned");
            let dir_ok = index
                .data_dir()
                .map(|dir| dir.is_dir())
                .unwrap_or(true);
            (
                BackendProbe {
                    name: "document_store".to_string(),
                    reachable: dir_ok,
                    detail: Some(format!("{} documents", index.all_reference_info().len())),
                },
                BackendProbe {
                    name: "index_store".to_string(),
                    reachable: dir_ok,
                    detail: Some(format!("{} entries", index.index_entry_count())),
                },
            )
        };
        probes.push(doc_probe);

        let vector_probe = match self.vectors.collection_exists().await {
            Ok(exists) => BackendProbe {
                name: "vector_store".to_string(),
                reachable: true,
                detail: Some(if exists {
                    "collection present".to_string()
                } else {
                    "collection absent".to_string()
                }),
            },
            Err(e) => BackendProbe {
                name: "vector_store".to_string(),
                reachable: false,
                detail: Some(e.to_string()),
            },
        };
        probes.push(vector_probe);
        probes.push(index_probe);

        let checker = ConsistencyChecker::new(self.index.clone(), self.vectors.clone());
        let consistency = checker.check().await?;

        let status = if consistency.has_critical() {
            HealthStatus::Critical
        } else if !consistency.is_consistent() || probes.iter().any(|p| !p.reachable) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Ok(HealthReport {
            status,
            probes,
            consistency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexEntry, NodeRecord, ReferenceInfo};
    use crate::store::{LocalVectorBackend, NodePayload, NodePoint};
    use std::collections::BTreeMap;
    use tempfile::TempDir;
    use uuid::Uuid;

    const DIM: usize = 4;

    struct Fixture {
        admin: StorageAdmin,
        index: Arc<RwLock<ReferenceIndex>>,
        vectors: Arc<LocalVectorBackend>,
        config: Config,
        _tmp: TempDir,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.embedding.dimension = DIM;

        let index = Arc::new(RwLock::new(
            ReferenceIndex::open(&config.paths.data_dir).unwrap(),
        ));
        let vectors = Arc::new(LocalVectorBackend::open(&config.paths.data_dir).unwrap());
        let mutation: MutationLock = Arc::new(tokio::sync::Mutex::new(()));

        Fixture {
            admin: StorageAdmin::new(config.clone(), index.clone(), vectors.clone(), mutation),
            index,
            vectors,
            config,
            _tmp: tmp,
        }
    }

    async fn seed(fx: &Fixture) {
        fx.vectors
            .create_collection(DIM, DistanceMetric::Cosine)
            .await
            .unwrap();
        fx.vectors
            .insert(vec![NodePoint {
                id: Uuid::new_v4(),
                vector: vec![0.1; DIM],
                payload: NodePayload {
                    node_id: "n1".to_string(),
                    ref_doc_id: "d1".to_string(),
                    file_name: Some("a.txt".to_string()),
                    chunk_index: 0,
                    content_hash: None,
                    updated_at: "2026-01-01T00:00:00Z".to_string(),
                },
            }])
            .await
            .unwrap();

        let mut index = fx.index.write().unwrap();
        index.insert_nodes(&[NodeRecord {
            node_id: "n1".to_string(),
            ref_doc_id: Some("d1".to_string()),
            content: "text".to_string(),
            chunk_index: 0,
            metadata: BTreeMap::new(),
        }]);
        index.put_reference_info(ReferenceInfo {
            doc_id: "d1".to_string(),
            node_ids: vec!["n1".to_string()],
            metadata: BTreeMap::new(),
        });
        index.put_index_entry(IndexEntry {
            doc_id: "d1".to_string(),
            node_count: 1,
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        });
        index.persist().unwrap();
    }

    #[tokio::test]
    async fn test_clear_without_force_does_nothing() {
        let fx = fixture();
        seed(&fx).await;

        let stats = fx.admin.emergency_clear_all(false).await;
        assert!(stats.errors >= 1);
        assert_eq!(stats.documents_cleared, 0);
        assert_eq!(stats.nodes_cleared, 0);

        // Nothing was touched
        assert_eq!(fx.index.read().unwrap().node_count(), 1);
        assert_eq!(fx.vectors.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clear_with_force_wipes_and_recreates() {
        let fx = fixture();
        seed(&fx).await;

        let stats = fx.admin.emergency_clear_all(true).await;
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.documents_cleared, 1);
        assert_eq!(stats.nodes_cleared, 1);

        assert_eq!(fx.index.read().unwrap().node_count(), 0);
        assert_eq!(fx.vectors.count().await.unwrap(), 0);
        // Collection exists again, empty
        assert!(fx.vectors.collection_exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_backup_restore_roundtrip() {
        let fx = fixture();
        seed(&fx).await;

        let backup_dir = fx.admin.backup(Some("pre-wipe")).await.unwrap();
        assert!(backup_dir.ends_with("pre-wipe"));
        assert!(backup_dir.join(crate::index::REF_INFO_FILE).exists());
        assert!(backup_dir.join(crate::store::VECTORS_FILE).exists());

        let stats = fx.admin.emergency_clear_all(true).await;
        assert_eq!(stats.errors, 0);
        assert_eq!(fx.index.read().unwrap().node_count(), 0);

        // Refused without force
        assert!(!fx.admin.restore(&backup_dir, false).await.unwrap());
        assert_eq!(fx.index.read().unwrap().node_count(), 0);

        // Restores with force
        assert!(fx.admin.restore(&backup_dir, true).await.unwrap());
        let index = fx.index.read().unwrap();
        assert_eq!(index.node_count(), 1);
        assert!(index.reference_info("d1").is_some());
        drop(index);
        assert_eq!(fx.vectors.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_restore_unknown_path_errors() {
        let fx = fixture();
        let missing = fx.config.paths.backup_dir.join("never-created");
        assert!(fx.admin.restore(&missing, true).await.is_err());
    }

    #[tokio::test]
    async fn test_diagnose_healthy() {
        let fx = fixture();
        seed(&fx).await;

        let report = fx.admin.diagnose().await.unwrap();
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.probes.len(), 3);
        assert!(report.probes.iter().all(|p| p.reachable));
    }

    #[tokio::test]
    async fn test_diagnose_critical_on_missing_collection() {
        let fx = fixture();
        // Seed only the document store; never create the collection
        {
            let mut index = fx.index.write().unwrap();
            index.put_reference_info(ReferenceInfo {
                doc_id: "d1".to_string(),
                node_ids: vec![],
                metadata: BTreeMap::new(),
            });
            index.persist().unwrap();
        }

        let report = fx.admin.diagnose().await.unwrap();
        assert_eq!(report.status, HealthStatus::Critical);
        assert!(report.consistency.has_critical());
    }

    #[tokio::test]
    async fn test_diagnose_degraded_on_noncritical_issue() {
        let fx = fixture();
        fx.vectors
            .create_collection(DIM, DistanceMetric::Cosine)
            .await
            .unwrap();
        // Stale index entry only: medium severity
        {
            let mut index = fx.index.write().unwrap();
            index.put_index_entry(IndexEntry {
                doc_id: "stale".to_string(),
                node_count: 0,
                updated_at: "2026-01-01T00:00:00Z".to_string(),
            });
        }

        let report = fx.admin.diagnose().await.unwrap();
        assert_eq!(report.status, HealthStatus::Degraded);
    }
}
