//! Data types for a narration run.

use std::fmt;
use std::path::PathBuf;

/// Aggregate counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineRunStats {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Items selected for this run
    pub total: usize,
}

impl PipelineRunStats {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Count one finished item.
    pub fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Processed { .. } => self.processed += 1,
            ItemOutcome::Skipped(_) => self.skipped += 1,
            ItemOutcome::Failed { .. } => self.failed += 1,
        }
    }

    /// Items that reached an outcome.
    pub fn finished(&self) -> usize {
        self.processed + self.skipped + self.failed
    }
}

/// Why an item was not narrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// An artifact exists and `force` was not set
    ArtifactExists,
    /// Extracted text is below the narration threshold
    TooShort { chars: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ArtifactExists => write!(f, "audio already exists"),
            SkipReason::TooShort { chars } => write!(f, "too short to narrate ({chars} chars)"),
        }
    }
}

/// What happened to one item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Processed {
        artifact: PathBuf,
        chunks: usize,
        /// Sum of segment durations, when known
        duration_seconds: f64,
    },
    Skipped(SkipReason),
    Failed {
        message: String,
    },
}

impl ItemOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ItemOutcome::Failed { .. })
    }
}

/// Per-run switches from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Delete and regenerate existing artifacts
    pub force: bool,
    /// Restrict the run to these item ids; empty means all items
    pub slugs: Vec<String>,
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub stats: PipelineRunStats,
    pub output_dir: PathBuf,
    /// Outcome per item, in processing order
    pub outcomes: Vec<(String, ItemOutcome)>,
}

impl RunReport {
    pub fn outcome(&self, id: &str) -> Option<&ItemOutcome> {
        self.outcomes
            .iter()
            .find(|(item, _)| item == id)
            .map(|(_, outcome)| outcome)
    }
}
