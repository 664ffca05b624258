//! Output module for operator-facing reports
//!
//! This module handles:
//! - Knowledge base statistics (`--stats`)
//! - Per-run summaries printed after a pass over the jobs

pub mod stats;

pub use stats::{load_statistics, print_statistics, HarvestStatistics, JobSummary};

use crate::crawler::RunOutcome;

/// Prints one line per job run, followed by the first few page errors
pub fn print_run_summary(results: &[(String, RunOutcome)]) {
    println!("=== Crawl Summary ===\n");

    for (name, outcome) in results {
        match outcome {
            RunOutcome::Skipped => println!("{}: skipped (already running)", name),
            RunOutcome::Failed(message) => println!("{}: failed: {}", name, message),
            RunOutcome::Completed(report) | RunOutcome::Cancelled(report) => {
                println!(
                    "{}: {} ({} pages listed, {} stored, {} under root, {} failed, {} skipped)",
                    name,
                    outcome.label(),
                    report.discovered,
                    report.stored,
                    report.fell_back_to_root,
                    report.failed,
                    report.skipped
                );
                for (kind, count) in &report.failures_by_kind {
                    println!("    {}: {}", kind, count);
                }
            }
        }
    }
}
