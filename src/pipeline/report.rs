//! Progress reporting for narration runs.

use crate::pipeline::orchestrator::RunPhase;
use crate::pipeline::types::ItemOutcome;

/// Trait for observing a run as it progresses.
///
/// Every method has a no-op default so reporters only implement what they show.
pub trait ProgressReporter: Send + Sync {
    fn phase_changed(&self, _phase: RunPhase) {}

    /// `index` is zero-based within the selected items.
    fn item_started(&self, _id: &str, _index: usize, _total: usize) {}

    fn chunk_synthesized(&self, _id: &str, _sequence: usize, _chunks: usize) {}

    fn item_finished(&self, _id: &str, _outcome: &ItemOutcome) {}
}

/// Reporter that emits tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn phase_changed(&self, phase: RunPhase) {
        tracing::debug!(?phase, "Run phase");
    }

    fn item_started(&self, id: &str, index: usize, total: usize) {
        tracing::info!(slug = id, "[{}/{}] {}", index + 1, total, id);
    }

    fn chunk_synthesized(&self, id: &str, sequence: usize, chunks: usize) {
        tracing::debug!(slug = id, sequence, "Chunk {}/{} synthesized", sequence + 1, chunks);
    }

    fn item_finished(&self, id: &str, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Processed {
                artifact,
                chunks,
                duration_seconds,
            } => tracing::info!(
                slug = id,
                chunks,
                "Wrote {} ({:.1}s)",
                artifact.display(),
                duration_seconds
            ),
            ItemOutcome::Skipped(reason) => tracing::info!(slug = id, "Skipped: {reason}"),
            ItemOutcome::Failed { message } => tracing::error!(slug = id, "Failed: {message}"),
        }
    }
}

/// Reporter that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
