//! Ingestion engine
//!
//! The single mutation entry point for all three stores. Orchestrates
//! hashing, duplicate suppression, transformation, node splitting,
//! embedding, vector insertion, reference registration and persistence.
//!
//! Every node-insert → reference-write → persist sequence runs under one
//! process-wide mutation lock shared with the repairer and the storage
//! admin; interleaved writers are the only way the reference invariant can
//! be violated.

use crate::chunk;
use crate::config::Config;
use crate::embed::{embed_in_batches, Embedder};
use crate::error::{Error, Result};
use crate::hash;
use crate::index::{IndexEntry, NodeRecord, ReferenceIndex, ReferenceInfo};
use crate::store::{DistanceMetric, NodePayload, NodePoint, VectorBackend};
use crate::transform::{self, Document, META_CONTENT_HASH, META_FILE_NAME};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Process-wide writer lock shared by every mutating component
pub type MutationLock = Arc<tokio::sync::Mutex<()>>;

/// Summary of a bulk ingestion run
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BulkIngestReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Documents actually created (skips and failures excluded)
    pub documents: Vec<Document>,
    pub errors: Vec<String>,
}

/// Listing entry for one ingested document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestedDoc {
    pub doc_id: String,
    pub metadata: BTreeMap<String, String>,
}

/// The multi-store ingestion and deletion orchestrator
pub struct IngestionEngine {
    config: Config,
    index: Arc<RwLock<ReferenceIndex>>,
    vectors: Arc<dyn VectorBackend>,
    embedder: Arc<dyn Embedder>,
    mutation: MutationLock,
}

impl IngestionEngine {
    pub fn new(
        config: Config,
        index: Arc<RwLock<ReferenceIndex>>,
        vectors: Arc<dyn VectorBackend>,
        embedder: Arc<dyn Embedder>,
        mutation: MutationLock,
    ) -> Self {
        Self {
            config,
            index,
            vectors,
            embedder,
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

    /// Ingest one source file.
    ///
    /// Returns the created documents, or an empty list when the file's
    /// content hash matches an already-ingested document with the same name
    /// (duplicate skip, not an error). Changed content supersedes: every
    /// existing document with the same name is deleted first.
    pub async fn ingest_file(&self, name: &str, path: &Path) -> Result<Vec<Document>> {
        info!(file = name, "Ingesting file");

        let content_hash = hash::hash_file(path);

        let existing = {
            let index = self.index.read().expect("reference index lock poisoned");
            index.docs_by_file_name(name)
        };

        if !existing.is_empty() {
            if !content_hash.is_empty()
                && existing
                    .iter()
                    .any(|(_, stored)| stored.as_deref() == Some(content_hash.as_str()))
            {
                debug!(file = name, "Content unchanged, skipping ingest");
                return Ok(Vec::new());
            }

            if content_hash.is_empty() {
                warn!(file = name, "Content hash unavailable, replacing unconditionally");
            }

            for (doc_id, _) in &existing {
                self.delete(doc_id).await?;
            }
        }

        let documents = match transform::transform(name, path, &content_hash) {
            Ok(docs) => docs,
            Err(Error::Read(reason)) => {
                warn!(file = name, "Treating content as plain text: {}", reason);
                transform::transform_lossy(name, path, &content_hash)?
            }
            Err(e) => return Err(e),
        };

        let mut nodes: Vec<NodeRecord> = Vec::new();
        for doc in &documents {
            nodes.extend(chunk::split_document(doc, &self.config.chunk));
        }

        let points = self.embed_nodes(&nodes).await?;

        let _guard = self.mutation.lock().await;

        if !points.is_empty() {
            if !self.vectors.collection_exists().await.unwrap_or(false) {
                self.vectors
                    .create_collection(self.config.embedding.dimension, self.distance())
                    .await?;
            }
            self.vectors.insert(points).await?;
        }

        {
            let mut index = self.index.write().expect("reference index lock poisoned");
            index.insert_nodes(&nodes);

            // insert_nodes leaves ReferenceInfo untouched; rewrite it here
            // from the node set just produced, unconditionally.
            let now = Utc::now().to_rfc3339();
            for doc in &documents {
                let node_ids: Vec<String> = nodes
                    .iter()
                    .filter(|n| n.ref_doc_id.as_deref() == Some(doc.doc_id.as_str()))
                    .map(|n| n.node_id.clone())
                    .collect();

                index.put_index_entry(IndexEntry {
                    doc_id: doc.doc_id.clone(),
                    node_count: node_ids.len(),
                    updated_at: now.clone(),
                });
                index.put_reference_info(ReferenceInfo {
                    doc_id: doc.doc_id.clone(),
                    node_ids,
                    metadata: doc.metadata.clone(),
                });
            }

            index.persist()?;
        }

        info!(
            file = name,
            documents = documents.len(),
            nodes = nodes.len(),
            "Ingest complete"
        );
        Ok(documents)
    }

    async fn embed_nodes(&self, nodes: &[NodeRecord]) -> Result<Vec<NodePoint>> {
        if nodes.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = nodes.iter().map(|n| n.content.clone()).collect();
        let embeddings = embed_in_batches(
            self.embedder.as_ref(),
            texts,
            self.config.embedding.batch_size,
        )
        .await?;

        if embeddings.len() != nodes.len() {
            return Err(Error::Embedding(format!(
                "Embedder returned {} vectors for {} nodes",
                embeddings.len(),
                nodes.len()
            )));
        }

        let now = Utc::now().to_rfc3339();
        Ok(nodes
            .iter()
            .zip(embeddings)
            .map(|(node, vector)| NodePoint {
                id: point_id(&node.node_id),
                vector,
                payload: NodePayload {
                    node_id: node.node_id.clone(),
                    ref_doc_id: node.ref_doc_id.clone().unwrap_or_default(),
                    file_name: node.metadata.get(META_FILE_NAME).cloned(),
                    chunk_index: node.chunk_index as i64,
                    content_hash: node.metadata.get(META_CONTENT_HASH).cloned(),
                    updated_at: now.clone(),
                },
            })
            .collect())
    }

    /// Ingest a batch of files sequentially.
    ///
    /// A single file's failure never aborts the batch: it is logged,
    /// counted, and the batch continues. Persistence failures are
    /// cross-cutting and propagate immediately.
    pub async fn ingest_bulk(&self, files: &[(String, PathBuf)]) -> Result<BulkIngestReport> {
        let mut report = BulkIngestReport {
            attempted: files.len(),
            ..Default::default()
        };

        for (name, path) in files {
            match self.ingest_file(name, path).await {
                Ok(docs) if docs.is_empty() => report.skipped += 1,
                Ok(docs) => {
                    report.succeeded += 1;
                    report.documents.extend(docs);
                }
                Err(e @ Error::Persist(_)) => return Err(e),
                Err(e) => {
                    let message = format!("{}: {}", name, e);
                    warn!("{}", message);
                    report.failed += 1;
                    report.errors.push(message);
                }
            }
        }

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed,
            "Bulk ingest complete"
        );
        Ok(report)
    }

    /// Ingest raw bytes under a logical name.
    ///
    /// The bytes are materialized to a temporary file which is removed on
    /// every exit path, success or not.
    pub async fn ingest_raw(&self, name: &str, data: &[u8]) -> Result<Vec<Document>> {
        let mut tmp = tempfile::NamedTempFile::new()?;
        tmp.write_all(data)?;
        tmp.flush()?;
        self.ingest_file(name, tmp.path()).await
    }

    /// List all ingested documents.
    ///
    /// An uninitialized or empty store yields an empty list, never an error.
    pub fn list_ingested(&self) -> Vec<IngestedDoc> {
        let index = self.index.read().expect("reference index lock poisoned");
        let mut docs: Vec<IngestedDoc> = index
            .all_reference_info()
            .values()
            .map(|info| IngestedDoc {
                doc_id: info.doc_id.clone(),
                metadata: info.metadata.clone(),
            })
            .collect();

        docs.sort_by(|a, b| {
            a.metadata
                .get(META_FILE_NAME)
                .cmp(&b.metadata.get(META_FILE_NAME))
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        docs
    }

    /// Delete a document and its nodes from all stores.
    ///
    /// The primary path resolves every node through its back-reference and
    /// removes nodes from both stores. When that resolution fails because a
    /// stored node is missing or lacks its back-reference (a known
    /// corruption mode of the document store), a manual fallback removes
    /// whatever can still be reached, item by item. Only a failure of both
    /// paths propagates.
    pub async fn delete(&self, doc_id: &str) -> Result<()> {
        let _guard = self.mutation.lock().await;

        match self.delete_primary(doc_id).await {
            Ok(()) => Ok(()),
            Err(Error::CorruptReference { detail, .. }) => {
                warn!(
                    doc_id,
                    "Primary delete failed ({}), running manual cleanup", detail
                );
                self.delete_fallback(doc_id).await
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_primary(&self, doc_id: &str) -> Result<()> {
        let node_ids = {
            let index = self.index.read().expect("reference index lock poisoned");
            index.resolve_ref_nodes(doc_id)?
        };

        self.vectors.delete_nodes(&node_ids).await?;

        let mut index = self.index.write().expect("reference index lock poisoned");
        index.remove_ref_doc(doc_id, &node_ids);
        index.persist()?;

        debug!(doc_id, nodes = node_ids.len(), "Deleted document");
        Ok(())
    }

    async fn delete_fallback(&self, doc_id: &str) -> Result<()> {
        let node_ids = {
            let index = self.index.read().expect("reference index lock poisoned");
            index
                .reference_info(doc_id)
                .map(|info| info.node_ids.clone())
                .unwrap_or_default()
        };

        for node_id in &node_ids {
            if let Err(e) = self.vectors.delete_nodes(std::slice::from_ref(node_id)).await {
                warn!(%node_id, "Could not delete vector during cleanup: {}", e);
            }
        }

        let mut index = self.index.write().expect("reference index lock poisoned");
        for node_id in &node_ids {
            index.delete_node(node_id);
        }
        index.delete_reference_info(doc_id);
        index.delete_index_entry(doc_id);
        index.persist()?;

        info!(doc_id, nodes = node_ids.len(), "Manual cleanup complete");
        Ok(())
    }
}

/// Map a node ID to a vector point ID
fn point_id(node_id: &str) -> Uuid {
    Uuid::try_parse(node_id)
        .unwrap_or_else(|_| Uuid::new_v5(&Uuid::NAMESPACE_OID, node_id.as_bytes()))
}
