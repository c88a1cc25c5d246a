//! Document store and index store
//!
//! This module owns two of the three storage regions: per-node content plus
//! per-document reference info (the document store) and structural index
//! entries (the index store). Each region is an ID-keyed map persisted as a
//! complete-replace JSON snapshot on every [`ReferenceIndex::persist`] call.
//!
//! Invariant: for every document, `ReferenceInfo.node_ids` equals exactly
//! the set of stored nodes whose `ref_doc_id` points back at it.
//! [`ReferenceIndex::insert_nodes`] deliberately does NOT maintain this;
//! callers must rewrite the reference info after every insertion.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Snapshot file for node records (document store data region)
pub const NODES_FILE: &str = "nodes.json";
/// Snapshot file for reference info (document store reference region)
pub const REF_INFO_FILE: &str = "ref_info.json";
/// Snapshot file for index entries (index store region)
pub const INDEX_ENTRIES_FILE: &str = "index_entries.json";

/// One retrievable sub-unit of a document.
///
/// `ref_doc_id` is the back-reference to the owning document. It is
/// optional only to model the known corruption mode where the field is
/// missing from a stored record; every record written by this crate carries
/// it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_doc_id: Option<String>,
    pub content: String,
    pub chunk_index: usize,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// The record mapping a document to its constituent node IDs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceInfo {
    pub doc_id: String,
    pub node_ids: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Structural index-store record for one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub doc_id: String,
    pub node_count: usize,
    pub updated_at: String,
}

/// In-memory view of the document and index stores, snapshot-backed when a
/// data directory is configured.
pub struct ReferenceIndex {
    dir: Option<PathBuf>,
    nodes: HashMap<String, NodeRecord>,
    ref_info: HashMap<String, ReferenceInfo>,
    entries: HashMap<String, IndexEntry>,
}

impl ReferenceIndex {
    /// Create an ephemeral index with no durable storage
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            nodes: HashMap::new(),
            ref_info: HashMap::new(),
            entries: HashMap::new(),
        }
    }

    /// Open the index from a data directory, loading all three regions.
    ///
    /// A region file that is non-empty on disk but yields zero entries is a
    /// corruption signal: the stale file is discarded and the region starts
    /// empty instead of operating on a partially-loaded map.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;

        let nodes = load_region(&dir.join(NODES_FILE))?;
        let ref_info = load_region(&dir.join(REF_INFO_FILE))?;
        let entries = load_region(&dir.join(INDEX_ENTRIES_FILE))?;

        debug!(
            nodes = nodes.len(),
            documents = ref_info.len(),
            index_entries = entries.len(),
            "Opened reference index at {:?}",
            dir
        );

        Ok(Self {
            dir: Some(dir.to_path_buf()),
            nodes,
            ref_info,
            entries,
        })
    }

    /// The data directory backing this index, if any
    pub fn data_dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Snapshot files this index persists to, in region order
    pub fn snapshot_files(&self) -> Vec<PathBuf> {
        match &self.dir {
            Some(dir) => vec![
                dir.join(NODES_FILE),
                dir.join(REF_INFO_FILE),
                dir.join(INDEX_ENTRIES_FILE),
            ],
            None => Vec::new(),
        }
    }

    // ===== Document store: nodes =====

    /// Insert node records.
    ///
    /// This primitive writes node content only. It does not update
    /// `ReferenceInfo`; callers own that invariant and must rewrite the
    /// reference info for every affected document afterwards.
    pub fn insert_nodes(&mut self, nodes: &[NodeRecord]) {
        for node in nodes {
            self.nodes.insert(node.node_id.clone(), node.clone());
        }
    }

    /// Fetch node records by ID; missing IDs are skipped
    pub fn nodes(&self, node_ids: &[String]) -> Vec<NodeRecord> {
        node_ids
            .iter()
            .filter_map(|id| self.nodes.get(id).cloned())
            .collect()
    }

    /// Delete a node record, tolerating absence
    pub fn delete_node(&mut self, node_id: &str) -> bool {
        self.nodes.remove(node_id).is_some()
    }

    /// Count of stored node records
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ===== Document store: reference info =====

    /// All reference info, keyed by document ID
    pub fn all_reference_info(&self) -> &HashMap<String, ReferenceInfo> {
        &self.ref_info
    }

    /// Reference info for one document
    pub fn reference_info(&self, doc_id: &str) -> Option<&ReferenceInfo> {
        self.ref_info.get(doc_id)
    }

    /// Write (or rewrite) the reference info for a document
    pub fn put_reference_info(&mut self, info: ReferenceInfo) {
        self.ref_info.insert(info.doc_id.clone(), info);
    }

    /// Delete the reference info for a document, tolerating absence
    pub fn delete_reference_info(&mut self, doc_id: &str) -> bool {
        self.ref_info.remove(doc_id).is_some()
    }

    /// Document IDs currently carrying reference info
    pub fn ref_doc_ids(&self) -> Vec<String> {
        self.ref_info.keys().cloned().collect()
    }

    /// Documents whose recorded file name matches, with their stored
    /// content hash
    pub fn docs_by_file_name(&self, file_name: &str) -> Vec<(String, Option<String>)> {
        self.ref_info
            .values()
            .filter(|info| {
                info.metadata.get(crate::transform::META_FILE_NAME).map(String::as_str)
                    == Some(file_name)
            })
            .map(|info| {
                (
                    info.doc_id.clone(),
                    info.metadata
                        .get(crate::transform::META_CONTENT_HASH)
                        .cloned(),
                )
            })
            .collect()
    }

    /// Strictly resolve the node set for a document through each node's
    /// back-reference, as the primary deletion path requires.
    ///
    /// Fails with [`Error::DocumentNotFound`] when no reference info exists,
    /// and with [`Error::CorruptReference`] when a listed node record is
    /// missing or its `ref_doc_id` does not point back at the document.
    pub fn resolve_ref_nodes(&self, doc_id: &str) -> Result<Vec<String>> {
        let info = self
            .ref_info
            .get(doc_id)
            .ok_or_else(|| Error::DocumentNotFound(doc_id.to_string()))?;

        for node_id in &info.node_ids {
            match self.nodes.get(node_id) {
                None => {
                    return Err(Error::CorruptReference {
                        doc_id: doc_id.to_string(),
                        detail: format!("node {} not found in document store", node_id),
                    });
                }
                Some(node) if node.ref_doc_id.as_deref() != Some(doc_id) => {
                    return Err(Error::CorruptReference {
                        doc_id: doc_id.to_string(),
                        detail: format!(
                            "node {} is missing its back-reference",
                            node_id
                        ),
                    });
                }
                Some(_) => {}
            }
        }

        Ok(info.node_ids.clone())
    }

    /// Remove a document's nodes, reference info and index entry in one
    /// sweep. Callers must have resolved the node set first.
    pub fn remove_ref_doc(&mut self, doc_id: &str, node_ids: &[String]) {
        for node_id in node_ids {
            self.nodes.remove(node_id);
        }
        self.ref_info.remove(doc_id);
        self.entries.remove(doc_id);
    }

    // ===== Index store =====

    /// Write (or rewrite) the index entry for a document
    pub fn put_index_entry(&mut self, entry: IndexEntry) {
        self.entries.insert(entry.doc_id.clone(), entry);
    }

    /// Delete the index entry for a document, tolerating absence
    pub fn delete_index_entry(&mut self, doc_id: &str) -> bool {
        self.entries.remove(doc_id).is_some()
    }

    /// Document IDs present in the index store
    pub fn index_entry_ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Count of index entries
    pub fn index_entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Drop every record from all three regions
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.ref_info.clear();
        self.entries.clear();
    }

    // ===== Persistence =====

    /// Persist all three regions as complete-replace snapshots.
    ///
    /// Write failures always propagate; a swallowed persist error would
    /// leave in-memory and on-disk state silently diverged.
    pub fn persist(&self) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        std::fs::create_dir_all(dir)
            .map_err(|e| Error::Persist(format!("{}: {}", dir.display(), e)))?;

        write_region(&dir.join(NODES_FILE), &self.nodes)?;
        write_region(&dir.join(REF_INFO_FILE), &self.ref_info)?;
        write_region(&dir.join(INDEX_ENTRIES_FILE), &self.entries)?;

        debug!(
            nodes = self.nodes.len(),
            documents = self.ref_info.len(),
            "Persisted reference index"
        );
        Ok(())
    }
}

fn write_region<T: Serialize>(path: &Path, region: &HashMap<String, T>) -> Result<()> {
    let json = serde_json::to_string_pretty(region)
        .map_err(|e| Error::Persist(format!("{}: {}", path.display(), e)))?;
    std::fs::write(path, json).map_err(|e| Error::Persist(format!("{}: {}", path.display(), e)))
}

fn load_region<T: DeserializeOwned>(path: &Path) -> Result<HashMap<String, T>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(HashMap::new());
    }

    let parsed: Option<HashMap<String, T>> = serde_json::from_str(&content).ok();
    match parsed {
        Some(map) if !map.is_empty() => Ok(map),
        _ => {
            // Non-empty file, zero usable entries: corruption signal.
            warn!(
                file = %path.display(),
                "Discarding corrupt snapshot and starting region empty"
            );
            if let Err(e) = std::fs::remove_file(path) {
                warn!(file = %path.display(), "Could not remove stale snapshot: {}", e);
            }
            info!(file = %path.display(), "Region re-initialized empty");
            Ok(HashMap::new())
        }
    }
}
