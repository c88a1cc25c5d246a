//! Administrative commands: diagnose, clear, backup, restore

use crate::admin::{ClearStats, HealthReport, StorageAdmin};
use crate::config::Config;
use crate::error::Result;
use crate::store::{DistanceMetric, VectorBackend};
use std::path::{Path, PathBuf};
use tracing::info;

/// Run a full health diagnosis
pub async fn cmd_diagnose(admin: &StorageAdmin) -> Result<HealthReport> {
    admin.diagnose().await
}

/// Emergency wipe of all stores
pub async fn cmd_clear(admin: &StorageAdmin, force: bool) -> ClearStats {
    admin.emergency_clear_all(force).await
}

/// Drop and recreate the vector collection with the configured dimension
pub async fn cmd_recreate_collection(
    config: &Config,
    vectors: &dyn VectorBackend,
    force: bool,
) -> Result<bool> {
    if !force {
        return Ok(false);
    }

    let existed = vectors.delete_collection().await?;
    let distance = config
        .vector
        .distance
        .parse()
        .unwrap_or(DistanceMetric::Cosine);
    vectors
        .create_collection(config.embedding.dimension, distance)
        .await?;

    info!(
        existed,
        dimension = config.embedding.dimension,
        "Collection recreated"
    );
    Ok(true)
}

/// Write a backup of the snapshot files
pub async fn cmd_backup(admin: &StorageAdmin, name: Option<&str>) -> Result<PathBuf> {
    admin.backup(name).await
}

/// Restore from a backup directory
pub async fn cmd_restore(admin: &StorageAdmin, path: &Path, force: bool) -> Result<bool> {
    admin.restore(path, force).await
}

/// Print a health report to console
pub fn print_health_report(report: &HealthReport) {
    println!("\n🩺 Health: {}\n", report.status);

    for probe in &report.probes {
        println!(
            "  {} {} {}",
            if probe.reachable { "✓" } else { "✗" },
            probe.name,
            probe.detail.as_deref().unwrap_or("")
        );
    }

    println!(
        "\n  Consistency: {} issue(s) across {} documents",
        report.consistency.inconsistencies.len(),
        report.consistency.document_count
    );
    for issue in &report.consistency.inconsistencies {
        println!("    [{}] {}", issue.severity, issue.description);
    }
}

/// Print clear stats to console
pub fn print_clear_stats(stats: &ClearStats) {
    println!("\n🧹 Emergency Clear");
    println!("  Documents cleared: {}", stats.documents_cleared);
    println!("  Nodes cleared: {}", stats.nodes_cleared);
    println!("  Errors: {}", stats.errors);
}
