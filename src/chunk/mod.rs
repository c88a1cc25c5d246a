//! Node splitting
//!
//! Splits a document into retrievable nodes while:
//! - Respecting paragraph and sentence boundaries when possible
//! - Staying on UTF-8 character boundaries
//! - Deriving stable, content-addressed node IDs

use crate::config::ChunkConfig;
use crate::index::NodeRecord;
use crate::transform::{Document, META_CONTENT_HASH, META_FILE_NAME};
use blake3::Hasher;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Metadata keys recorded per node
pub const META_CHAR_START: &str = "char_start";
pub const META_CHAR_END: &str = "char_end";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum BreakPriority {
    Sentence = 1,
    Paragraph = 2,
}

#[derive(Debug, Clone, Copy)]
struct BreakPoint {
    position: usize,
    priority: BreakPriority,
}

/// Split a document into nodes carrying back-references to it.
///
/// Node IDs are derived from the chunk content hash, so identical content
/// in an identical document produces identical IDs across runs.
pub fn split_document(doc: &Document, config: &ChunkConfig) -> Vec<NodeRecord> {
    let text = &doc.text;

    if text.trim().is_empty() {
        return Vec::new();
    }

    let break_points = find_break_points(text);

    let mut nodes = Vec::new();
    let mut current_start = 0;
    let mut chunk_index = 0;

    while current_start < text.len() {
        current_start = ensure_char_boundary(text, current_start);
        if current_start >= text.len() {
            break;
        }

        let target_end = current_start + config.max_chars;
        let chunk_end = if target_end >= text.len() {
            text.len()
        } else {
            find_best_break(text, current_start, target_end, &break_points, config)
        };

        let chunk_end = ensure_char_boundary(text, chunk_end);
        if chunk_end <= current_start {
            current_start = ensure_char_boundary(text, current_start + config.max_chars);
            continue;
        }

        let chunk_text = text[current_start..chunk_end].trim().to_string();

        // Skip undersized fragments unless this is the tail of the text
        if chunk_text.len() < config.min_chars && chunk_end < text.len() {
            current_start = chunk_end;
            continue;
        }

        if !chunk_text.is_empty() {
            nodes.push(build_node(doc, &chunk_text, chunk_index, current_start, chunk_end));
            chunk_index += 1;
        }

        if chunk_end >= text.len() {
            break;
        }

        current_start = if chunk_end > config.overlap_chars {
            ensure_char_boundary(text, chunk_end - config.overlap_chars)
        } else {
            chunk_end
        };
    }

    nodes
}

fn build_node(
    doc: &Document,
    chunk_text: &str,
    chunk_index: usize,
    char_start: usize,
    char_end: usize,
) -> NodeRecord {
    let mut metadata = BTreeMap::new();
    for key in [META_FILE_NAME, META_CONTENT_HASH] {
        if let Some(value) = doc.metadata.get(key) {
            metadata.insert(key.to_string(), value.clone());
        }
    }
    metadata.insert(META_CHAR_START.to_string(), char_start.to_string());
    metadata.insert(META_CHAR_END.to_string(), char_end.to_string());

    NodeRecord {
        node_id: node_id(&doc.doc_id, chunk_index, chunk_text),
        ref_doc_id: Some(doc.doc_id.clone()),
        content: chunk_text.to_string(),
        chunk_index,
        metadata,
    }
}

/// Derive a stable node ID from the owning document, position and content.
///
/// The position is part of the identity: repetitive documents can produce
/// byte-identical chunks, which must still be distinct nodes.
pub fn node_id(doc_id: &str, chunk_index: usize, chunk_text: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(doc_id.as_bytes());
    hasher.update(&chunk_index.to_le_bytes());
    hasher.update(chunk_text.as_bytes());
    let digest = hasher.finalize();
    Uuid::new_v5(&Uuid::NAMESPACE_OID, digest.as_bytes()).to_string()
}

fn find_break_points(text: &str) -> Vec<BreakPoint> {
    let mut points = Vec::new();

    // Paragraph breaks (double newlines)
    for (i, _) in text.match_indices("\n\n") {
        let pos = i + 2;
        if text.is_char_boundary(pos) {
            points.push(BreakPoint {
                position: pos,
                priority: BreakPriority::Paragraph,
            });
        }
    }

    // Sentence boundaries
    for pattern in [". ", ".\n", "? ", "! "] {
        for (i, _) in text.match_indices(pattern) {
            let pos = i + 2;
            if pos <= text.len() && text.is_char_boundary(pos) {
                points.push(BreakPoint {
                    position: pos,
                    priority: BreakPriority::Sentence,
                });
            }
        }
    }

    points.sort_by_key(|p| p.position);
    points.dedup_by_key(|p| p.position);
    points
}

/// Ensure a position is on a valid UTF-8 character boundary
fn ensure_char_boundary(text: &str, pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    let mut adjusted = pos;
    while adjusted > 0 && !text.is_char_boundary(adjusted) {
        adjusted -= 1;
    }
    adjusted
}

/// Find the best break point near the target position
fn find_best_break(
    text: &str,
    start: usize,
    target: usize,
    break_points: &[BreakPoint],
    config: &ChunkConfig,
) -> usize {
    // Search window: 80% to 120% of target chunk size
    let min_pos = ensure_char_boundary(text, start + (config.max_chars * 4 / 5));
    let max_pos = ensure_char_boundary(
        text,
        std::cmp::min(start + (config.max_chars * 6 / 5), text.len()),
    );

    let best = break_points
        .iter()
        .filter(|p| p.position >= min_pos && p.position <= max_pos)
        .max_by_key(|p| p.priority);
    if let Some(point) = best {
        return point.position;
    }

    // Fall back to the nearest word boundary before the target
    let search_start = ensure_char_boundary(text, target.saturating_sub(50));
    let search_end = ensure_char_boundary(text, std::cmp::min(target + 50, text.len()));
    if search_start < search_end {
        for (i, _) in text[search_start..search_end].rmatch_indices(' ') {
            let pos = search_start + i + 1;
            if pos >= min_pos && pos <= max_pos && text.is_char_boundary(pos) {
                return pos;
            }
        }
    }

    ensure_char_boundary(text, std::cmp::min(target, text.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Document;
    use std::collections::BTreeMap;

    fn make_doc(text: &str) -> Document {
        let mut metadata = BTreeMap::new();
        metadata.insert(META_FILE_NAME.to_string(), "test.txt".to_string());
        metadata.insert(META_CONTENT_HASH.to_string(), "hash-1".to_string());
        Document::new(text.to_string(), metadata)
    }

    fn config() -> ChunkConfig {
        ChunkConfig {
            max_chars: 500,
            overlap_chars: 50,
            min_chars: 50,
        }
    }

    #[test]
    fn test_short_document_single_node() {
        let doc = make_doc("This is a short document that fits in one node.");
        let nodes = split_document(&doc, &config());

        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].chunk_index, 0);
        assert_eq!(nodes[0].ref_doc_id.as_deref(), Some(doc.doc_id.as_str()));
        assert_eq!(
            nodes[0].metadata.get(META_FILE_NAME).map(String::as_str),
            Some("test.txt")
        );
    }

    #[test]
    fn test_long_document_multiple_nodes() {
        let text = "Lorem ipsum dolor sit amet. ".repeat(100);
        let doc = make_doc(&text);
        let nodes = split_document(&doc, &config());

        assert!(nodes.len() > 1);
        for node in &nodes {
            assert!(node.content.len() <= config().max_chars + 100);
            assert_eq!(node.ref_doc_id.as_deref(), Some(doc.doc_id.as_str()));
        }
        // Indexes are contiguous from zero
        for (i, node) in nodes.iter().enumerate() {
            assert_eq!(node.chunk_index, i);
        }
        // Repetitive text still yields distinct node identities
        let distinct: std::collections::HashSet<_> =
            nodes.iter().map(|n| n.node_id.as_str()).collect();
        assert_eq!(distinct.len(), nodes.len());
    }

    #[test]
    fn test_node_ids_stable_for_same_content() {
        let doc = make_doc("Deterministic content for hashing.");
        let nodes1 = split_document(&doc, &config());
        let nodes2 = split_document(&doc, &config());

        assert_eq!(nodes1[0].node_id, nodes2[0].node_id);
    }

    #[test]
    fn test_node_ids_differ_across_documents() {
        let a = make_doc("Shared text.");
        let b = make_doc("Shared text.");
        // Different doc_id, same content: distinct node identity
        assert_ne!(
            split_document(&a, &config())[0].node_id,
            split_document(&b, &config())[0].node_id
        );
    }

    #[test]
    fn test_multibyte_text_safe() {
        let text = "日本語のテキスト。".repeat(200);
        let doc = make_doc(&text);
        let nodes = split_document(&doc, &config());

        assert!(!nodes.is_empty());
        for node in &nodes {
            // Would have panicked on a bad boundary inside split_document;
            // verify the content round-trips as valid text.
            assert!(!node.content.is_empty());
        }
    }

    #[test]
    fn test_empty_document_yields_no_nodes() {
        let doc = make_doc("   \n  ");
        assert!(split_document(&doc, &config()).is_empty());
    }
}
