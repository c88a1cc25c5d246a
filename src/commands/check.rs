//! Consistency check command

use crate::consistency::{
    ConsistencyChecker, ConsistencyRepairer, ConsistencyReport, RepairOutcome,
};
use crate::error::Result;

/// Run a consistency check, optionally followed by a repair pass.
///
/// When a repair runs, a second check is returned so the caller sees the
/// post-repair state.
pub async fn cmd_check(
    checker: &ConsistencyChecker,
    repairer: &ConsistencyRepairer,
    repair: bool,
    auto_repair: bool,
) -> Result<(ConsistencyReport, Option<RepairOutcome>)> {
    let report = checker.check().await?;

    if !repair || report.is_consistent() {
        return Ok((report, None));
    }

    let outcome = repairer.repair(&report, auto_repair).await;
    let after = checker.check().await?;
    Ok((after, Some(outcome)))
}

/// Print a consistency report to console
pub fn print_consistency_report(report: &ConsistencyReport) {
    println!("\n🔍 Consistency Report ({})\n", report.checked_at);
    println!("  Documents: {}", report.document_count);
    println!("  Vectors: {}", report.vector_count);
    println!("  Index entries: {}", report.index_count);
    println!(
        "  Collection: {}",
        if report.collection_exists {
            "present"
        } else {
            "MISSING"
        }
    );

    if report.is_consistent() {
        println!("\n✓ All stores are consistent");
        return;
    }

    println!("\n{} issue(s) found:", report.inconsistencies.len());
    for issue in &report.inconsistencies {
        println!(
            "  [{}] {}: {}",
            issue.severity, issue.kind, issue.description
        );
        println!("      repair: {}", issue.repair_action);
    }
}

/// Print a repair outcome to console
pub fn print_repair_outcome(outcome: &RepairOutcome) {
    println!("\n🔧 Repair");
    println!("  Repaired: {}", outcome.repaired);
    println!("  Failed: {}", outcome.failed);
    println!("  Skipped (critical, no --auto): {}", outcome.skipped);
}
