//! Point and payload schema shared by the vector backends

use qdrant_client::qdrant::{PointStruct, Value as QdrantValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A point ready to be inserted into a vector backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: NodePayload,
}

impl NodePoint {
    /// Convert to qdrant-client PointStruct
    pub fn to_point_struct(self) -> PointStruct {
        let payload_map = self.payload.to_qdrant_payload();
        PointStruct::new(self.id.to_string(), self.vector, payload_map)
    }
}

/// Payload stored with each node's embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePayload {
    /// Node ID (matches the document store record)
    pub node_id: String,

    /// Owning document ID
    pub ref_doc_id: String,

    /// Source file name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    /// Node position within the document
    pub chunk_index: i64,

    /// Content hash of the source file at ingestion time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,

    /// When this point was written
    pub updated_at: String,
}

impl NodePayload {
    /// Convert to Qdrant payload format
    pub fn to_qdrant_payload(self) -> HashMap<String, QdrantValue> {
        let mut map = HashMap::new();

        map.insert("node_id".to_string(), string_to_qdrant(&self.node_id));
        map.insert("ref_doc_id".to_string(), string_to_qdrant(&self.ref_doc_id));
        map.insert("chunk_index".to_string(), int_to_qdrant(self.chunk_index));
        map.insert("updated_at".to_string(), string_to_qdrant(&self.updated_at));

        if let Some(ref file_name) = self.file_name {
            map.insert("file_name".to_string(), string_to_qdrant(file_name));
        }

        if let Some(ref content_hash) = self.content_hash {
            map.insert("content_hash".to_string(), string_to_qdrant(content_hash));
        }

        map
    }
}

fn string_to_qdrant(s: &str) -> QdrantValue {
    QdrantValue {
        kind: Some(qdrant_client::qdrant::value::Kind::StringValue(s.to_string())),
    }
}

fn int_to_qdrant(i: i64) -> QdrantValue {
    QdrantValue {
        kind: Some(qdrant_client::qdrant::value::Kind::IntegerValue(i)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_serialization() {
        let payload = NodePayload {
            node_id: "node-123".to_string(),
            ref_doc_id: "doc-456".to_string(),
            file_name: Some("readme.md".to_string()),
            chunk_index: 0,
            content_hash: Some("hash123".to_string()),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        };

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("ref_doc_id"));
        assert!(json.contains("doc-456"));

        let parsed: NodePayload = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.ref_doc_id, "doc-456");
    }

    #[test]
    fn test_qdrant_payload_fields() {
        let payload = NodePayload {
            node_id: "n".to_string(),
            ref_doc_id: "d".to_string(),
            file_name: None,
            chunk_index: 3,
            content_hash: None,
            updated_at: "t".to_string(),
        };

        let map = payload.to_qdrant_payload();
        assert!(map.contains_key("ref_doc_id"));
        assert!(map.contains_key("chunk_index"));
        assert!(!map.contains_key("file_name"));
    }
}
