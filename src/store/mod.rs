//! Vector storage backends
//!
//! The [`VectorBackend`] trait is the abstract capability contract for the
//! embedding store: a named collection that must exist before inserts
//! succeed, keyed deletes, and optional ref-doc enumeration. Two
//! implementations are provided: a local snapshot-file store and a Qdrant
//! wrapper.

mod local;
mod payload;
mod qdrant;

pub use local::*;
pub use payload::*;
pub use qdrant::*;

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;

/// Distance metric for the vector collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    Cosine,
    Dot,
    Euclid,
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceMetric::Cosine => write!(f, "cosine"),
            DistanceMetric::Dot => write!(f, "dot"),
            DistanceMetric::Euclid => write!(f, "euclid"),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "dot" => Ok(DistanceMetric::Dot),
            "euclid" => Ok(DistanceMetric::Euclid),
            _ => Err(Error::Config(format!("Unknown distance metric: {}", s))),
        }
    }
}

/// Abstract embedding store.
///
/// Mutated only through the ingestion engine, the repairer, or the storage
/// admin, never directly by callers.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Whether the collection exists. Callers deciding whether to recreate
    /// treat errors as `false`; read-only diagnosis must not be blocked by
    /// an unreachable backend.
    async fn collection_exists(&self) -> Result<bool>;

    /// Create the collection with the given dimension and metric
    async fn create_collection(&self, dimension: usize, distance: DistanceMetric) -> Result<()>;

    /// Insert node points; the collection must exist and every vector must
    /// match the collection dimension
    async fn insert(&self, points: Vec<NodePoint>) -> Result<()>;

    /// Delete points by node ID, tolerating IDs that are already absent
    async fn delete_nodes(&self, node_ids: &[String]) -> Result<()>;

    /// Delete every point referencing the given document
    async fn delete_by_ref_doc(&self, doc_id: &str) -> Result<()>;

    /// Delete the whole collection; returns whether it existed
    async fn delete_collection(&self) -> Result<bool>;

    /// Number of stored points
    async fn count(&self) -> Result<usize>;

    /// Enumerate the distinct `ref_doc_id`s present in the collection.
    ///
    /// Returns `Ok(None)` when the backend has no cheap enumeration
    /// primitive; consistency checking then falls back to a documented
    /// approximation.
    async fn list_ref_doc_ids(&self) -> Result<Option<HashSet<String>>> {
        Ok(None)
    }

    /// The local snapshot file for this backend, if it persists to one.
    /// Remote backends return `None` and are not captured by backups.
    fn snapshot_file(&self) -> Option<PathBuf> {
        None
    }

    /// Re-read state from the snapshot file after a restore; returns
    /// whether anything was reloaded
    async fn reload_snapshot(&self) -> Result<bool> {
        Ok(false)
    }
}
