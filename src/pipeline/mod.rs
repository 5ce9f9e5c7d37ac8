//! Batch narration pipeline.
//!
//! Each content item goes through extract → chunk → synthesize → assemble,
//! one item at a time over a single long-lived worker.

pub mod layout;
pub mod orchestrator;
pub mod report;
pub mod types;

pub use layout::OutputLayout;
pub use orchestrator::{Pipeline, PipelineSettings, RunPhase};
pub use report::{LogReporter, ProgressReporter, SilentReporter};
pub use types::{ItemOutcome, PipelineRunStats, RunOptions, RunReport, SkipReason};
