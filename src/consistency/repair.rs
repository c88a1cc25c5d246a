//! Targeted repair of detected inconsistencies
//!
//! Consumes a [`ConsistencyReport`] and applies a fix per classification.
//! Critical issues are only applied when auto-repair is explicitly
//! requested; everything else is applied unconditionally. Repairs are
//! independent: one failure is counted and the rest continue.

use super::{ConsistencyReport, InconsistencyKind, Severity, StorageInconsistency};
use crate::config::Config;
use crate::engine::MutationLock;
use crate::error::Result;
use crate::index::ReferenceIndex;
use crate::store::{DistanceMetric, VectorBackend};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Counts from one repair run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairOutcome {
    pub repaired: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Applies fixes for the mismatches a [`ConsistencyChecker`] found
///
/// [`ConsistencyChecker`]: super::ConsistencyChecker
pub struct ConsistencyRepairer {
    config: Config,
    index: Arc<RwLock<ReferenceIndex>>,
    vectors: Arc<dyn VectorBackend>,
    mutation: MutationLock,
}

impl ConsistencyRepairer {
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

    /// Repair every inconsistency in the report.
    ///
    /// `auto_repair` gates critical fixes only; without it they are counted
    /// as skipped. Returns counts rather than failing fast; each repair is
    /// applied independently.
    pub async fn repair(&self, report: &ConsistencyReport, auto_repair: bool) -> RepairOutcome {
        let mut outcome = RepairOutcome::default();

        let _guard = self.mutation.lock().await;

        for issue in &report.inconsistencies {
            if issue.severity == Severity::Critical && !auto_repair {
                info!(kind = %issue.kind, "Skipping critical repair without auto-repair");
                outcome.skipped += 1;
                continue;
            }

            match self.apply(issue).await {
                Ok(()) => {
                    info!(kind = %issue.kind, doc_id = ?issue.doc_id, "Repaired");
                    outcome.repaired += 1;
                }
                Err(e) => {
                    warn!(kind = %issue.kind, doc_id = ?issue.doc_id, "Repair failed: {}", e);
                    outcome.failed += 1;
                }
            }
        }

        outcome
    }

    async fn apply(&self, issue: &StorageInconsistency) -> Result<()> {
        match issue.kind {
            InconsistencyKind::OrphanedDocument => {
                // The vectors are already gone; re-embedding is not
                // available here, so drop the document's remaining records.
                let Some(doc_id) = &issue.doc_id else {
                    return Ok(());
                };
                let mut index = self.index.write().expect("reference index lock poisoned");
                let node_ids = index
                    .reference_info(doc_id)
                    .map(|info| info.node_ids.clone())
                    .unwrap_or_default();
                index.remove_ref_doc(doc_id, &node_ids);
                index.persist()
            }
            InconsistencyKind::OrphanedVector => {
                let Some(doc_id) = &issue.doc_id else {
                    return Ok(());
                };
                self.vectors.delete_by_ref_doc(doc_id).await
            }
            InconsistencyKind::OrphanedMetadata => {
                let Some(doc_id) = &issue.doc_id else {
                    return Ok(());
                };
                let mut index = self.index.write().expect("reference index lock poisoned");
                index.delete_index_entry(doc_id);
                index.persist()
            }
            InconsistencyKind::MissingCollection => {
                // The backend has no data to infer the dimension from;
                // it must come from configuration.
                let distance = self
                    .config
                    .vector
                    .distance
                    .parse()
                    .unwrap_or(DistanceMetric::Cosine);
                self.vectors
                    .create_collection(self.config.embedding.dimension, distance)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consistency::ConsistencyChecker;
    use crate::index::{IndexEntry, NodeRecord, ReferenceInfo};
    use crate::store::{LocalVectorBackend, NodePayload, NodePoint};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    const DIM: usize = 4;

    struct Fixture {
        index: Arc<RwLock<ReferenceIndex>>,
        vectors: Arc<LocalVectorBackend>,
        checker: ConsistencyChecker,
        repairer: ConsistencyRepairer,
    }

    fn fixture() -> Fixture {
        let mut config = Config::default();
        config.embedding.dimension = DIM;

        let index = Arc::new(RwLock::new(ReferenceIndex::in_memory()));
        let vectors = Arc::new(LocalVectorBackend::in_memory());
        let mutation: MutationLock = Arc::new(tokio::sync::Mutex::new(()));

        Fixture {
            checker: ConsistencyChecker::new(index.clone(), vectors.clone()),
            repairer: ConsistencyRepairer::new(config, index.clone(), vectors.clone(), mutation),
            index,
            vectors,
        }
    }

    fn register_doc(index: &Arc<RwLock<ReferenceIndex>>, doc_id: &str, node_id: &str) {
        let mut index = index.write().unwrap();
        index.insert_nodes(&[NodeRecord {
            node_id: node_id.to_string(),
            ref_doc_id: Some(doc_id.to_string()),
            content: "text".to_string(),
            chunk_index: 0,
            metadata: BTreeMap::new(),
        }]);
        index.put_reference_info(ReferenceInfo {
            doc_id: doc_id.to_string(),
            node_ids: vec![node_id.to_string()],
            metadata: BTreeMap::new(),
        });
        index.put_index_entry(IndexEntry {
            doc_id: doc_id.to_string(),
            node_count: 1,
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        });
    }

    async fn insert_vector(vectors: &LocalVectorBackend, doc_id: &str, node_id: &str) {
        vectors
            .insert(vec![NodePoint {
                id: Uuid::new_v4(),
                vector: vec![0.1; DIM],
                payload: NodePayload {
                    node_id: node_id.to_string(),
                    ref_doc_id: doc_id.to_string(),
                    file_name: None,
                    chunk_index: 0,
                    content_hash: None,
                    updated_at: "2026-01-01T00:00:00Z".to_string(),
                },
            }])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_repair_converges_on_noncritical_issues() {
        let fx = fixture();
        fx.vectors
            .create_collection(DIM, DistanceMetric::Cosine)
            .await
            .unwrap();

        // One orphaned document, one orphaned vector, one orphaned entry
        register_doc(&fx.index, "doc-no-vectors", "n1");
        insert_vector(&fx.vectors, "ghost-doc", "n2").await;
        {
            let mut index = fx.index.write().unwrap();
            index.put_index_entry(IndexEntry {
                doc_id: "stale-entry".to_string(),
                node_count: 0,
                updated_at: "2026-01-01T00:00:00Z".to_string(),
            });
        }

        let report = fx.checker.check().await.unwrap();
        assert_eq!(report.inconsistencies.len(), 3);

        let outcome = fx.repairer.repair(&report, true).await;
        assert_eq!(outcome.repaired, 3);
        assert_eq!(outcome.failed, 0);

        // Re-check: nothing left to report
        let after = fx.checker.check().await.unwrap();
        assert!(after.is_consistent());
    }

    #[tokio::test]
    async fn test_critical_skipped_without_auto_repair() {
        let fx = fixture();
        // Collection never created: the report carries a critical issue

        let report = fx.checker.check().await.unwrap();
        assert!(report.has_critical());

        let outcome = fx.repairer.repair(&report, false).await;
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.repaired, 0);
        assert!(!fx.vectors.collection_exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_collection_recreated_with_configured_dimension() {
        let fx = fixture();

        let report = fx.checker.check().await.unwrap();
        let outcome = fx.repairer.repair(&report, true).await;
        assert_eq!(outcome.repaired, 1);

        assert!(fx.vectors.collection_exists().await.unwrap());

        // Inserting at the configured dimension succeeds
        insert_vector(&fx.vectors, "d1", "n1").await;
        assert_eq!(fx.vectors.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_orphaned_document_records_dropped() {
        let fx = fixture();
        fx.vectors
            .create_collection(DIM, DistanceMetric::Cosine)
            .await
            .unwrap();
        register_doc(&fx.index, "d1", "n1");

        let report = fx.checker.check().await.unwrap();
        let outcome = fx.repairer.repair(&report, true).await;
        assert_eq!(outcome.repaired, 1);

        let index = fx.index.read().unwrap();
        assert!(index.reference_info("d1").is_none());
        assert_eq!(index.node_count(), 0);
        assert_eq!(index.index_entry_count(), 0);
    }
}
