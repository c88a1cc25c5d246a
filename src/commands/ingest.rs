//! Ingest command implementation

use crate::engine::{BulkIngestReport, IngestionEngine};
use crate::error::{Error, Result};
use crate::transform::{Document, META_FILE_NAME};
use ignore::WalkBuilder;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

/// Ingest a single file under its file name (or an explicit override)
pub async fn cmd_ingest_file(
    engine: &IngestionEngine,
    path: &Path,
    name: Option<String>,
) -> Result<Vec<Document>> {
    let name = match name {
        Some(n) => n,
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| Error::InvalidPath(path.display().to_string()))?,
    };

    engine.ingest_file(&name, path).await
}

/// Ingest every file under a directory, sequentially.
///
/// Logical names are paths relative to the ingest root so re-ingesting the
/// same tree dedupes file by file.
pub async fn cmd_ingest_dir(engine: &IngestionEngine, dir: &Path) -> Result<BulkIngestReport> {
    let canonical = dir
        .canonicalize()
        .map_err(|e| Error::InvalidPath(format!("{}: {}", dir.display(), e)))?;

    info!("Ingesting directory: {}", canonical.display());

    let mut files: Vec<(String, PathBuf)> = Vec::new();
    let walker = WalkBuilder::new(&canonical)
        .hidden(false)
        .git_ignore(true)
        .git_exclude(true)
        .build();

    for entry in walker.flatten() {
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            let path = entry.path().to_path_buf();
            let name = path
                .strip_prefix(&canonical)
                .unwrap_or(&path)
                .to_string_lossy()
                .to_string();
            files.push((name, path));
        }
    }
    files.sort();

    info!("Found {} files to process", files.len());

    let bar = ProgressBar::new(files.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut report = BulkIngestReport {
        attempted: files.len(),
        ..Default::default()
    };

    for (name, path) in &files {
        bar.set_message(name.clone());
        match engine.ingest_file(name, path).await {
            Ok(docs) if docs.is_empty() => report.skipped += 1,
            Ok(docs) => {
                report.succeeded += 1;
                report.documents.extend(docs);
            }
            Err(e @ Error::Persist(_)) => {
                bar.abandon();
                return Err(e);
            }
            Err(e) => {
                report.failed += 1;
                report.errors.push(format!("{}: {}", name, e));
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    Ok(report)
}

/// Ingest raw bytes read from stdin under a logical name
pub async fn cmd_ingest_stdin(engine: &IngestionEngine, name: &str) -> Result<Vec<Document>> {
    let mut data = Vec::new();
    std::io::stdin().read_to_end(&mut data)?;

    engine.ingest_raw(name, &data).await
}

/// Print created documents to console
pub fn print_documents(documents: &[Document]) {
    if documents.is_empty() {
        println!("No documents created (duplicate content skipped)");
        return;
    }

    for doc in documents {
        println!(
            "✓ {} ({})",
            doc.metadata
                .get(META_FILE_NAME)
                .map(String::as_str)
                .unwrap_or("<unnamed>"),
            doc.doc_id
        );
    }
}

/// Print a bulk ingest summary to console
pub fn print_ingest_report(report: &BulkIngestReport) {
    println!("\n✓ Ingestion complete");
    println!("  Attempted: {}", report.attempted);
    println!("  Succeeded: {}", report.succeeded);
    println!("  Skipped (unchanged): {}", report.skipped);
    println!("  Failed: {}", report.failed);

    for error in &report.errors {
        println!("  ✗ {}", error);
    }
}
