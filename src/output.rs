//! Terminal output for narration runs.

use crate::pipeline::{ItemOutcome, ProgressReporter, RunPhase, RunReport};
use owo_colors::OwoColorize;

/// Prints per-item progress to stderr.
///
/// Failures are always shown; progress lines are suppressed in quiet mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter {
    quiet: bool,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ProgressReporter for ConsoleReporter {
    fn phase_changed(&self, phase: RunPhase) {
        if !self.quiet && phase == RunPhase::Validating {
            eprintln!("{}", "Checking prerequisites...".dimmed());
        }
    }

    fn item_started(&self, id: &str, index: usize, total: usize) {
        if !self.quiet {
            eprintln!("{} {}", format!("[{}/{}]", index + 1, total).dimmed(), id.bold());
        }
    }

    fn chunk_synthesized(&self, _id: &str, sequence: usize, chunks: usize) {
        if !self.quiet && chunks > 1 {
            eprintln!("  {}", format!("chunk {}/{}", sequence + 1, chunks).dimmed());
        }
    }

    fn item_finished(&self, id: &str, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Processed {
                chunks,
                duration_seconds,
                ..
            } if !self.quiet => {
                eprintln!(
                    "  {} {}",
                    "✓".green(),
                    format_processed(*chunks, *duration_seconds)
                );
            }
            ItemOutcome::Skipped(reason) if !self.quiet => {
                eprintln!("  {} {}", "-".dimmed(), reason.dimmed());
            }
            ItemOutcome::Failed { message } => {
                eprintln!("  {} {}: {}", "✗".red(), id, message.red());
            }
            _ => {}
        }
    }
}

fn format_processed(chunks: usize, duration_seconds: f64) -> String {
    let noun = if chunks == 1 { "chunk" } else { "chunks" };
    if duration_seconds > 0.0 {
        format!("{chunks} {noun}, {}", format_duration(duration_seconds))
    } else {
        format!("{chunks} {noun}")
    }
}

/// `m:ss` for narration lengths.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.round() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// Final summary line printed after a run.
pub fn print_summary(report: &RunReport) {
    let stats = &report.stats;
    let failed = if stats.failed > 0 {
        format!("{} failed", stats.failed).red().to_string()
    } else {
        format!("{} failed", stats.failed)
    };
    println!(
        "{} {} processed, {} skipped, {} ({} total)",
        "Done:".green().bold(),
        stats.processed,
        stats.skipped,
        failed,
        stats.total
    );
    println!("  {} {}", "Output:".dimmed(), report.output_dir.display());
}
