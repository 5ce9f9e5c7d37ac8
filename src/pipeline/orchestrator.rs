//! Narration run: Validating → Processing → Finalizing.
//!
//! Items are processed one after another and chunks are synthesized one at a
//! time. A failing item is counted and the run moves on; only fatal errors
//! (missing prerequisites, a worker that cannot be started) end the run
//! early. Finalizing runs on every path out of `run`.

use crate::audio::Assembler;
use crate::audio::wav;
use crate::config::Config;
use crate::content::ContentItem;
use crate::diagnostics::{NoPreflight, Preflight};
use crate::error::{NarratorError, Result};
use crate::pipeline::layout::OutputLayout;
use crate::pipeline::report::{LogReporter, ProgressReporter};
use crate::pipeline::types::{
    ItemOutcome, PipelineRunStats, RunOptions, RunReport, SkipReason,
};
use crate::text::{chunk, extract};
use crate::worker::{SynthesisRequest, Synthesizer};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Validating,
    Processing,
    Finalizing,
    Done,
}

/// Narration parameters that are not part of the output layout.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Passed to the worker with every request
    pub voice_dir: PathBuf,
    pub max_chars: usize,
    pub min_narratable_chars: usize,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            voice_dir: config.worker.voice_dir.clone(),
            max_chars: config.chunking.max_chars,
            min_narratable_chars: config.chunking.min_narratable_chars,
        }
    }
}

/// Drives content items through extraction, synthesis and assembly.
pub struct Pipeline {
    layout: OutputLayout,
    settings: PipelineSettings,
    synthesizer: Box<dyn Synthesizer>,
    assembler: Arc<dyn Assembler>,
    preflight: Arc<dyn Preflight>,
    reporter: Arc<dyn ProgressReporter>,
    phase: RunPhase,
}

impl Pipeline {
    /// Creates a pipeline with the log reporter and no prerequisite checks.
    pub fn new(
        layout: OutputLayout,
        settings: PipelineSettings,
        synthesizer: Box<dyn Synthesizer>,
        assembler: Arc<dyn Assembler>,
    ) -> Self {
        Self {
            layout,
            settings,
            synthesizer,
            assembler,
            preflight: Arc::new(NoPreflight),
            reporter: Arc::new(LogReporter),
            phase: RunPhase::Idle,
        }
    }

    /// Sets the checks run during Validating.
    pub fn with_preflight(mut self, preflight: Arc<dyn Preflight>) -> Self {
        self.preflight = preflight;
        self
    }

    /// Sets a custom progress reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Narrate `items`.
    ///
    /// # Errors
    /// Only fatal errors are returned; item failures are reported through
    /// `RunReport::stats`. The worker is shut down and the temp directory is
    /// removed in either case.
    pub async fn run(&mut self, items: Vec<ContentItem>, options: &RunOptions) -> Result<RunReport> {
        match self.layout.sweep_tmp() {
            Ok(0) => {}
            Ok(n) => tracing::info!("Removed {n} leftover temporary file(s)"),
            Err(e) => tracing::warn!("Failed to sweep {}: {}", self.layout.tmp_dir().display(), e),
        }

        self.set_phase(RunPhase::Validating);
        let result = match self.validate() {
            Ok(()) => {
                self.set_phase(RunPhase::Processing);
                self.process_all(items, options).await
            }
            Err(e) => Err(e),
        };

        self.set_phase(RunPhase::Finalizing);
        self.finalize().await;
        self.set_phase(RunPhase::Done);
        result
    }

    fn validate(&self) -> Result<()> {
        self.preflight.verify()?;
        self.layout.prepare()
    }

    async fn process_all(
        &mut self,
        items: Vec<ContentItem>,
        options: &RunOptions,
    ) -> Result<RunReport> {
        let selected = select(items, &options.slugs);
        let total = selected.len();
        let mut stats = PipelineRunStats::new(total);
        let mut outcomes = Vec::with_capacity(total);

        for (index, item) in selected.iter().enumerate() {
            self.reporter.item_started(&item.id, index, total);

            let (outcome, fatal) = match self.process_item(item, options.force).await {
                Ok(outcome) => (outcome, None),
                Err(e) => {
                    self.discard_segments(&item.id);
                    let outcome = ItemOutcome::Failed {
                        message: e.to_string(),
                    };
                    (outcome, e.is_fatal().then_some(e))
                }
            };

            stats.record(&outcome);
            self.reporter.item_finished(&item.id, &outcome);
            outcomes.push((item.id.clone(), outcome));

            if let Some(e) = fatal {
                tracing::error!(slug = %item.id, "Aborting run: {e}");
                return Err(e);
            }
        }

        Ok(RunReport {
            stats,
            output_dir: self.layout.output_dir().to_path_buf(),
            outcomes,
        })
    }

    async fn process_item(&mut self, item: &ContentItem, force: bool) -> Result<ItemOutcome> {
        let artifact = self.layout.artifact_path(&item.id);
        if artifact.exists() {
            if !force {
                return Ok(ItemOutcome::Skipped(SkipReason::ArtifactExists));
            }
            std::fs::remove_file(&artifact)?;
            tracing::debug!(slug = %item.id, "Removed existing {}", artifact.display());
        }

        // Segments from an interrupted attempt
        self.layout.purge_item(&item.id)?;

        let text = extract(&item.raw_text);
        let chars = text.chars().count();
        if chars < self.settings.min_narratable_chars {
            return Ok(ItemOutcome::Skipped(SkipReason::TooShort { chars }));
        }

        let chunks = chunk(&text, self.settings.max_chars);
        tracing::debug!(slug = %item.id, chunks = chunks.len(), chars, "Chunked");

        let voice_dir = std::path::absolute(&self.settings.voice_dir)?;
        let mut segments = Vec::with_capacity(chunks.len());
        let mut duration_seconds = 0.0;

        for text_chunk in &chunks {
            let output_path = std::path::absolute(
                self.layout.segment_path(&item.id, text_chunk.sequence),
            )?;
            let request = SynthesisRequest {
                text: text_chunk.text.clone(),
                output_path: output_path.display().to_string(),
                voice_dir: voice_dir.display().to_string(),
            };

            let segment = self.synthesizer.synthesize(request).await?;
            // Only segments inside the temp dir are covered by cleanup
            if std::path::absolute(&segment.path)? != output_path {
                return Err(NarratorError::Protocol {
                    message: format!(
                        "Worker wrote segment to {}, expected {}",
                        segment.path.display(),
                        output_path.display()
                    ),
                });
            }
            if !segment.path.is_file() {
                return Err(NarratorError::MissingSegment {
                    path: segment.path.display().to_string(),
                });
            }

            duration_seconds += segment
                .duration_seconds
                .or_else(|| probe_duration(&segment.path))
                .unwrap_or(0.0);
            self.reporter
                .chunk_synthesized(&item.id, text_chunk.sequence, chunks.len());
            segments.push(segment.path);
        }

        self.assembler.assemble(&segments, &artifact).await?;
        self.layout.purge_item(&item.id)?;

        Ok(ItemOutcome::Processed {
            artifact,
            chunks: chunks.len(),
            duration_seconds,
        })
    }

    fn discard_segments(&self, id: &str) {
        if let Err(e) = self.layout.purge_item(id) {
            tracing::warn!(slug = id, "Failed to remove temporary segments: {e}");
        }
    }

    async fn finalize(&mut self) {
        if let Err(e) = self.synthesizer.shutdown().await {
            tracing::warn!("Synthesizer shutdown failed: {e}");
        }
        if let Err(e) = self.layout.remove_tmp() {
            tracing::warn!("Failed to remove {}: {}", self.layout.tmp_dir().display(), e);
        }
    }

    fn set_phase(&mut self, phase: RunPhase) {
        self.phase = phase;
        self.reporter.phase_changed(phase);
    }
}

/// Keep items named in `slugs`, in source order. Empty `slugs` keeps everything.
fn select(items: Vec<ContentItem>, slugs: &[String]) -> Vec<ContentItem> {
    if slugs.is_empty() {
        return items;
    }

    let known: HashSet<&str> = items.iter().map(|item| item.id.as_str()).collect();
    for slug in slugs {
        if !known.contains(slug.as_str()) {
            tracing::warn!("No content item named '{slug}'");
        }
    }

    let wanted: HashSet<&str> = slugs.iter().map(String::as_str).collect();
    items
        .into_iter()
        .filter(|item| wanted.contains(item.id.as_str()))
        .collect()
}

fn probe_duration(path: &Path) -> Option<f64> {
    let is_wav = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
    if !is_wav {
        return None;
    }
    match wav::duration_seconds(path) {
        Ok(seconds) => Some(seconds),
        Err(e) => {
            tracing::debug!("Could not read duration of {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::{MockSynthesizer, SynthesizedSegment};
    use std::sync::Mutex;

    /// Concatenates segment bytes and records the order it was given.
    #[derive(Default)]
    struct ConcatAssembler {
        calls: Mutex<Vec<Vec<PathBuf>>>,
    }

    #[async_trait::async_trait]
    impl Assembler for ConcatAssembler {
        async fn assemble(&self, segments: &[PathBuf], output: &Path) -> Result<()> {
            self.calls.lock().unwrap().push(segments.to_vec());
            let mut bytes = Vec::new();
            for segment in segments {
                bytes.extend(std::fs::read(segment)?);
            }
            std::fs::write(output, bytes)?;
            Ok(())
        }
    }

    /// Writes every segment to one fixed path outside the temp dir.
    struct MisplacingSynthesizer {
        path: PathBuf,
    }

    #[async_trait::async_trait]
    impl Synthesizer for MisplacingSynthesizer {
        async fn synthesize(&mut self, _request: SynthesisRequest) -> Result<SynthesizedSegment> {
            std::fs::write(&self.path, "[stray]")?;
            Ok(SynthesizedSegment {
                path: self.path.clone(),
                duration_seconds: Some(1.0),
            })
        }

        async fn shutdown(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn item(id: &str, text: &str) -> ContentItem {
        ContentItem::new(id, text)
    }

    fn pipeline(dir: &Path, synthesizer: MockSynthesizer, max_chars: usize) -> Pipeline {
        Pipeline::new(
            OutputLayout::new(dir.join("audio"), "mp3", "wav"),
            PipelineSettings {
                voice_dir: dir.join("voice"),
                max_chars,
                min_narratable_chars: 10,
            },
            Box::new(synthesizer),
            Arc::new(ConcatAssembler::default()),
        )
    }

    #[test]
    fn test_select_keeps_source_order() {
        let items = vec![item("a", ""), item("b", ""), item("c", "")];
        let slugs = vec!["c".to_string(), "a".to_string(), "zzz".to_string()];
        let selected: Vec<_> = select(items, &slugs).into_iter().map(|i| i.id).collect();
        assert_eq!(selected, vec!["a", "c"]);
    }

    #[test]
    fn test_select_empty_filter_keeps_all() {
        let items = vec![item("a", ""), item("b", "")];
        assert_eq!(select(items, &[]).len(), 2);
    }

    #[tokio::test]
    async fn test_phase_reaches_done() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path(), MockSynthesizer::new(), 100);
        assert_eq!(pipeline.phase(), RunPhase::Idle);

        let report = pipeline.run(vec![], &RunOptions::default()).await.unwrap();

        assert_eq!(pipeline.phase(), RunPhase::Done);
        assert_eq!(report.stats, PipelineRunStats::default());
    }

    #[tokio::test]
    async fn test_chunks_sent_in_sequence_order() {
        let dir = tempfile::tempdir().unwrap();
        let synthesizer = MockSynthesizer::new();
        let log = synthesizer.log();
        let mut pipeline = pipeline(dir.path(), synthesizer, 30);

        let text = "First paragraph is here.\n\nSecond paragraph is here.\n\nThird one.";
        let report = pipeline
            .run(vec![item("post", text)], &RunOptions::default())
            .await
            .unwrap();

        assert_eq!(report.stats.processed, 1);
        let requests = log.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].output_path.ends_with("post_0.wav"));
        assert!(requests[2].output_path.ends_with("post_2.wav"));
        assert!(requests[0].voice_dir.ends_with("voice"));

        let artifact = std::fs::read_to_string(dir.path().join("audio/post.mp3")).unwrap();
        assert_eq!(
            artifact,
            "[First paragraph is here.][Second paragraph is here.][Third one.]"
        );
    }

    #[tokio::test]
    async fn test_missing_segment_fails_item() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path(), MockSynthesizer::new().without_writing(), 100);

        let report = pipeline
            .run(
                vec![item("post", "Enough text to be narrated.")],
                &RunOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(report.stats.failed, 1);
        match report.outcome("post") {
            Some(ItemOutcome::Failed { message }) => assert!(message.contains("segment is missing")),
            other => panic!("Expected failure, got: {other:?}"),
        }
        assert!(!dir.path().join("audio/post.mp3").exists());
    }

    #[tokio::test]
    async fn test_segment_outside_temp_dir_fails_item() {
        let dir = tempfile::tempdir().unwrap();
        let stray = dir.path().join("elsewhere.wav");
        let mut pipeline = Pipeline::new(
            OutputLayout::new(dir.path().join("audio"), "mp3", "wav"),
            PipelineSettings {
                voice_dir: dir.path().join("voice"),
                max_chars: 100,
                min_narratable_chars: 10,
            },
            Box::new(MisplacingSynthesizer {
                path: stray.clone(),
            }),
            Arc::new(ConcatAssembler::default()),
        );

        let report = pipeline
            .run(
                vec![item("post", "Enough text to be narrated.")],
                &RunOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(report.stats.failed, 1);
        match report.outcome("post") {
            Some(ItemOutcome::Failed { message }) => {
                assert!(message.contains("elsewhere.wav"), "{message}");
                assert!(message.contains("post_0.wav"), "{message}");
            }
            other => panic!("Expected failure, got: {other:?}"),
        }
        assert!(!dir.path().join("audio/post.mp3").exists());
    }

    #[tokio::test]
    async fn test_duration_summed_from_replies() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path(), MockSynthesizer::new(), 1000);

        // 30 characters at the mock's 15 chars per second
        let report = pipeline
            .run(
                vec![item("post", "abcdefghij abcdefghij abcdefg.")],
                &RunOptions::default(),
            )
            .await
            .unwrap();

        match report.outcome("post") {
            Some(ItemOutcome::Processed {
                chunks,
                duration_seconds,
                ..
            }) => {
                assert_eq!(*chunks, 1);
                assert!((duration_seconds - 2.0).abs() < 1e-9);
            }
            other => panic!("Expected processed, got: {other:?}"),
        }
    }
}
