//! Document transformation
//!
//! Turns a (name, file path) input into semantic [`Document`] records with
//! attached file metadata. Format-specific readers are out of scope; this
//! module handles plain-text decoding and leaves a [`Error::Read`] for the
//! engine's lossy-text fallback when the bytes cannot be decoded.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

/// Metadata keys attached to every document
pub const META_FILE_NAME: &str = "file_name";
pub const META_FILE_SIZE: &str = "file_size";
pub const META_CREATION_DATE: &str = "creation_date";
pub const META_CONTENT_HASH: &str = "content_hash";
pub const META_CONTENT_TYPE: &str = "content_type";

/// One logical ingested unit of text plus metadata, derived from one source
/// file. Immutable once created; a changed source file supersedes (deletes
/// and recreates) its documents rather than mutating them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    pub fn new(text: String, metadata: BTreeMap<String, String>) -> Self {
        Self {
            doc_id: Uuid::new_v4().to_string(),
            text,
            metadata,
        }
    }

    /// The source file name this document was derived from
    pub fn file_name(&self) -> Option<&str> {
        self.metadata.get(META_FILE_NAME).map(String::as_str)
    }

    /// The content hash recorded at ingestion time
    pub fn content_hash(&self) -> Option<&str> {
        self.metadata.get(META_CONTENT_HASH).map(String::as_str)
    }
}

/// Transform a source file into documents.
///
/// Fails with [`Error::Read`] when the bytes cannot be decoded as UTF-8 or
/// look binary; the engine recovers from that case with
/// [`transform_lossy`].
pub fn transform(name: &str, path: &Path, content_hash: &str) -> Result<Vec<Document>> {
    debug!(file = name, "Transforming file");

    let bytes = std::fs::read(path)
        .map_err(|e| Error::Read(format!("{}: {}", path.display(), e)))?;

    if is_binary_content(&bytes) {
        return Err(Error::Read(format!("{} looks like binary content", name)));
    }

    let text = std::str::from_utf8(&bytes)
        .map_err(|_| Error::Read(format!("{} is not valid UTF-8", name)))?;

    Ok(vec![Document::new(
        text.to_string(),
        file_metadata(name, path, content_hash),
    )])
}

/// Plain-text fallback for undecodable input: decode lossily instead of
/// giving up on the file.
pub fn transform_lossy(name: &str, path: &Path, content_hash: &str) -> Result<Vec<Document>> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::Read(format!("{}: {}", path.display(), e)))?;
    let text = String::from_utf8_lossy(&bytes).to_string();

    Ok(vec![Document::new(
        text,
        file_metadata(name, path, content_hash),
    )])
}

fn file_metadata(name: &str, path: &Path, content_hash: &str) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    metadata.insert(META_FILE_NAME.to_string(), name.to_string());
    metadata.insert(META_CONTENT_HASH.to_string(), content_hash.to_string());

    if let Ok(fs_meta) = std::fs::metadata(path) {
        metadata.insert(META_FILE_SIZE.to_string(), fs_meta.len().to_string());

        let created = fs_meta.created().or_else(|_| fs_meta.modified());
        if let Ok(ts) = created {
            let dt: DateTime<Utc> = ts.into();
            metadata.insert(META_CREATION_DATE.to_string(), dt.to_rfc3339());
        }
    }

    let mime = mime_guess::from_path(path).first_or_text_plain();
    metadata.insert(META_CONTENT_TYPE.to_string(), mime.essence_str().to_string());

    metadata
}

/// Heuristic binary detection: NUL byte in the first block
fn is_binary_content(bytes: &[u8]) -> bool {
    bytes.iter().take(8192).any(|&b| b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_file(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_transform_text_file() {
        let file = temp_file(b"Some document text.");
        let docs = transform("notes.txt", file.path(), "hash-abc").unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "Some document text.");
        assert_eq!(docs[0].file_name(), Some("notes.txt"));
        assert_eq!(docs[0].content_hash(), Some("hash-abc"));
        assert_eq!(
            docs[0].metadata.get(META_FILE_SIZE).map(String::as_str),
            Some("19")
        );
    }

    #[test]
    fn test_transform_rejects_binary() {
        let file = temp_file(b"\x00\x01\x02binary");
        let err = transform("blob.bin", file.path(), "h").unwrap_err();
        assert!(matches!(err, Error::Read(_)));
    }

    #[test]
    fn test_lossy_fallback_accepts_invalid_utf8() {
        let file = temp_file(b"valid prefix \xff\xfe suffix");
        let docs = transform_lossy("weird.txt", file.path(), "h").unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].text.starts_with("valid prefix"));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = transform("gone.txt", Path::new("/no/such/file"), "h").unwrap_err();
        assert!(matches!(err, Error::Read(_)));
    }
}
