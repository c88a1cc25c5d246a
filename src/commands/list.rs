//! Listing and deletion commands

use crate::engine::{IngestedDoc, IngestionEngine};
use crate::error::Result;
use crate::transform::{META_CONTENT_TYPE, META_FILE_NAME, META_FILE_SIZE};

/// List all ingested documents
pub fn cmd_list(engine: &IngestionEngine) -> Vec<IngestedDoc> {
    engine.list_ingested()
}

/// Delete one document by ID
pub async fn cmd_delete(engine: &IngestionEngine, doc_id: &str) -> Result<()> {
    engine.delete(doc_id).await
}

/// Print the document listing to console
pub fn print_listing(documents: &[IngestedDoc]) {
    println!("\n📚 Ingested Documents\n");

    if documents.is_empty() {
        println!("Nothing ingested yet. Use 'archivist ingest' to add documents.");
        return;
    }

    for doc in documents {
        println!(
            "• {} [{}]",
            doc.metadata
                .get(META_FILE_NAME)
                .map(String::as_str)
                .unwrap_or("<unnamed>"),
            doc.metadata
                .get(META_CONTENT_TYPE)
                .map(String::as_str)
                .unwrap_or("unknown"),
        );
        println!("  ID: {}", doc.doc_id);
        if let Some(size) = doc.metadata.get(META_FILE_SIZE) {
            println!("  Size: {} bytes", size);
        }
        println!();
    }

    println!("{} document(s)", documents.len());
}
