//! Cross-store consistency checking
//!
//! Computes set differences between the document store, the vector store
//! and the index store, and classifies every mismatch. Reports are derived
//! data: recomputed on every call, never cached, never persisted.

pub mod repair;

pub use repair::*;

use crate::error::Result;
use crate::index::ReferenceIndex;
use crate::store::VectorBackend;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Classification of a cross-store mismatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InconsistencyKind {
    /// Document store entry with no vectors behind it
    OrphanedDocument,
    /// Vectors referencing a document the document store no longer has
    OrphanedVector,
    /// Index entry for a document the document store no longer has
    OrphanedMetadata,
    /// The vector collection itself does not exist
    MissingCollection,
}

impl std::fmt::Display for InconsistencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InconsistencyKind::OrphanedDocument => write!(f, "orphaned_document"),
            InconsistencyKind::OrphanedVector => write!(f, "orphaned_vector"),
            InconsistencyKind::OrphanedMetadata => write!(f, "orphaned_metadata"),
            InconsistencyKind::MissingCollection => write!(f, "missing_collection"),
        }
    }
}

/// Severity of an inconsistency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// One detected mismatch, with its suggested repair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageInconsistency {
    pub kind: InconsistencyKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    pub description: String,
    pub severity: Severity,
    pub repair_action: String,
}

/// The computed snapshot of cross-backend state at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub document_count: usize,
    pub vector_count: usize,
    pub index_count: usize,
    pub collection_exists: bool,
    pub inconsistencies: Vec<StorageInconsistency>,
    pub checked_at: String,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.inconsistencies.is_empty()
    }

    pub fn has_critical(&self) -> bool {
        self.inconsistencies
            .iter()
            .any(|i| i.severity == Severity::Critical)
    }
}

/// Read-only auditor across the three stores
pub struct ConsistencyChecker {
    index: Arc<RwLock<ReferenceIndex>>,
    vectors: Arc<dyn VectorBackend>,
}

impl ConsistencyChecker {
    pub fn new(index: Arc<RwLock<ReferenceIndex>>, vectors: Arc<dyn VectorBackend>) -> Self {
        Self { index, vectors }
    }

    /// Run a full consistency check.
    ///
    /// Vector membership is exact when the backend can enumerate its
    /// ref-doc IDs. Without enumeration the vector set is approximated as
    /// the document set whenever the collection exists (and as empty when
    /// it does not), so a vector silently missing for one specific document
    /// cannot be detected on such backends.
    pub async fn check(&self) -> Result<ConsistencyReport> {
        let (doc_ids, docs_with_nodes, index_ids) = {
            let index = self.index.read().expect("reference index lock poisoned");
            let doc_ids = index.ref_doc_ids().into_iter().collect::<HashSet<_>>();
            // A document with zero nodes legitimately has no vectors
            let docs_with_nodes = index
                .all_reference_info()
                .values()
                .filter(|info| !info.node_ids.is_empty())
                .map(|info| info.doc_id.clone())
                .collect::<HashSet<_>>();
            let index_ids = index.index_entry_ids().into_iter().collect::<HashSet<_>>();
            (doc_ids, docs_with_nodes, index_ids)
        };

        // An unreachable backend must not block read-only diagnosis
        let collection_exists = match self.vectors.collection_exists().await {
            Ok(exists) => exists,
            Err(e) => {
                warn!("Vector backend unreachable, treating collection as absent: {}", e);
                false
            }
        };

        let vector_ids: HashSet<String> = if !collection_exists {
            HashSet::new()
        } else {
            match self.vectors.list_ref_doc_ids().await {
                Ok(Some(ids)) => ids,
                Ok(None) => docs_with_nodes.clone(),
                Err(e) => {
                    warn!("Could not enumerate vectors, assuming document set: {}", e);
                    docs_with_nodes.clone()
                }
            }
        };

        let vector_count = if collection_exists {
            self.vectors.count().await.unwrap_or(0)
        } else {
            0
        };

        let mut inconsistencies = Vec::new();

        for doc_id in sorted(docs_with_nodes.difference(&vector_ids)) {
            inconsistencies.push(StorageInconsistency {
                kind: InconsistencyKind::OrphanedDocument,
                doc_id: Some(doc_id.clone()),
                description: format!(
                    "Document {} has no vectors; it is unreachable by search",
                    doc_id
                ),
                severity: Severity::High,
                repair_action: "Re-embed the document or drop its records".to_string(),
            });
        }

        for doc_id in sorted(vector_ids.difference(&doc_ids)) {
            inconsistencies.push(StorageInconsistency {
                kind: InconsistencyKind::OrphanedVector,
                doc_id: Some(doc_id.clone()),
                description: format!(
                    "Vectors reference document {} which the document store does not have",
                    doc_id
                ),
                severity: Severity::Medium,
                repair_action: "Delete the orphaned vectors".to_string(),
            });
        }

        for doc_id in sorted(index_ids.difference(&doc_ids)) {
            inconsistencies.push(StorageInconsistency {
                kind: InconsistencyKind::OrphanedMetadata,
                doc_id: Some(doc_id.clone()),
                description: format!(
                    "Index entry for document {} has no document store record",
                    doc_id
                ),
                severity: Severity::Medium,
                repair_action: "Delete the index entry".to_string(),
            });
        }

        if !collection_exists {
            inconsistencies.push(StorageInconsistency {
                kind: InconsistencyKind::MissingCollection,
                doc_id: None,
                description: "Vector collection does not exist; no queries can be served"
                    .to_string(),
                severity: Severity::Critical,
                repair_action: "Recreate the collection with the configured dimension".to_string(),
            });
        }

        inconsistencies.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });

        debug!(
            documents = doc_ids.len(),
            vectors = vector_count,
            index_entries = index_ids.len(),
            issues = inconsistencies.len(),
            "Consistency check complete"
        );

        Ok(ConsistencyReport {
            document_count: doc_ids.len(),
            vector_count,
            index_count: index_ids.len(),
            collection_exists,
            inconsistencies,
            checked_at: Utc::now().to_rfc3339(),
        })
    }
}

fn sorted<'a>(ids: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut v: Vec<String> = ids.cloned().collect();
    v.sort();
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexEntry, NodeRecord, ReferenceInfo};
    use crate::store::{DistanceMetric, LocalVectorBackend, NodePayload, NodePoint};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn setup() -> (Arc<RwLock<ReferenceIndex>>, Arc<LocalVectorBackend>, ConsistencyChecker) {
        let index = Arc::new(RwLock::new(ReferenceIndex::in_memory()));
        let vectors = Arc::new(LocalVectorBackend::in_memory());
        let checker = ConsistencyChecker::new(index.clone(), vectors.clone());
        (index, vectors, checker)
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
                vector: vec![0.1; 4],
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
    async fn test_clean_state_is_consistent() {
        let (index, vectors, checker) = setup();
        vectors.create_collection(4, DistanceMetric::Cosine).await.unwrap();
        register_doc(&index, "d1", "n1");
        insert_vector(&vectors, "d1", "n1").await;

        let report = checker.check().await.unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.document_count, 1);
        assert_eq!(report.vector_count, 1);
        assert_eq!(report.index_count, 1);
    }

    #[tokio::test]
    async fn test_document_without_vectors_is_orphaned_document() {
        let (index, vectors, checker) = setup();
        vectors.create_collection(4, DistanceMetric::Cosine).await.unwrap();
        register_doc(&index, "d1", "n1");
        // no vector inserted for d1

        let report = checker.check().await.unwrap();
        let orphans: Vec<_> = report
            .inconsistencies
            .iter()
            .filter(|i| i.kind == InconsistencyKind::OrphanedDocument)
            .collect();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].severity, Severity::High);
        assert_eq!(orphans[0].doc_id.as_deref(), Some("d1"));
    }

    #[tokio::test]
    async fn test_vector_without_document_is_orphaned_vector() {
        let (_index, vectors, checker) = setup();
        vectors.create_collection(4, DistanceMetric::Cosine).await.unwrap();
        insert_vector(&vectors, "ghost-doc", "n1").await;

        let report = checker.check().await.unwrap();
        let orphans: Vec<_> = report
            .inconsistencies
            .iter()
            .filter(|i| i.kind == InconsistencyKind::OrphanedVector)
            .collect();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].severity, Severity::Medium);
    }

    #[tokio::test]
    async fn test_index_entry_without_document_is_orphaned_metadata() {
        let (index, vectors, checker) = setup();
        vectors.create_collection(4, DistanceMetric::Cosine).await.unwrap();
        {
            let mut index = index.write().unwrap();
            index.put_index_entry(IndexEntry {
                doc_id: "stale".to_string(),
                node_count: 0,
                updated_at: "2026-01-01T00:00:00Z".to_string(),
            });
        }

        let report = checker.check().await.unwrap();
        assert_eq!(report.inconsistencies.len(), 1);
        assert_eq!(
            report.inconsistencies[0].kind,
            InconsistencyKind::OrphanedMetadata
        );
    }

    #[tokio::test]
    async fn test_missing_collection_is_single_critical() {
        let (index, _vectors, checker) = setup();
        register_doc(&index, "d1", "n1");
        register_doc(&index, "d2", "n2");

        let report = checker.check().await.unwrap();
        assert!(!report.collection_exists);
        assert!(report.has_critical());

        let critical: Vec<_> = report
            .inconsistencies
            .iter()
            .filter(|i| i.kind == InconsistencyKind::MissingCollection)
            .collect();
        assert_eq!(critical.len(), 1);

        // With the collection absent, every document is also unreachable
        let orphaned = report
            .inconsistencies
            .iter()
            .filter(|i| i.kind == InconsistencyKind::OrphanedDocument)
            .count();
        assert_eq!(orphaned, 2);
    }

    #[tokio::test]
    async fn test_report_sorted_by_severity() {
        let (index, vectors, checker) = setup();
        register_doc(&index, "d1", "n1");
        {
            let mut index = index.write().unwrap();
            index.put_index_entry(IndexEntry {
                doc_id: "stale".to_string(),
                node_count: 0,
                updated_at: "2026-01-01T00:00:00Z".to_string(),
            });
        }
        let _ = vectors; // collection never created

        let report = checker.check().await.unwrap();
        assert!(report.inconsistencies.len() >= 3);
        for pair in report.inconsistencies.windows(2) {
            assert!(pair[0].severity >= pair[1].severity);
        }
    }
}
