use crate::error::{NarratorError, Result};
use crate::worker::protocol::{SynthesisRequest, SynthesisResponse};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Audio written by the synthesizer for one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedSegment {
    pub path: PathBuf,
    pub duration_seconds: Option<f64>,
}

impl SynthesizedSegment {
    /// Interpret a worker reply to `request`.
    pub fn from_response(request: &SynthesisRequest, response: SynthesisResponse) -> Result<Self> {
        if !response.success {
            return Err(NarratorError::Synthesis {
                message: response
                    .error
                    .unwrap_or_else(|| "worker reported failure without a message".to_string()),
            });
        }
        Ok(Self {
            path: PathBuf::from(
                response
                    .output_path
                    .unwrap_or_else(|| request.output_path.clone()),
            ),
            duration_seconds: response.duration_seconds,
        })
    }
}

/// Trait for text-to-speech synthesis.
///
/// This trait allows swapping implementations (real worker process vs mock).
/// Calls take `&mut self`: a synthesizer serves one request at a time.
#[async_trait::async_trait]
pub trait Synthesizer: Send {
    /// Synthesize one chunk, writing audio to `request.output_path`.
    async fn synthesize(&mut self, request: SynthesisRequest) -> Result<SynthesizedSegment>;

    /// Release the backend. Safe to call when nothing was started.
    async fn shutdown(&mut self) -> Result<()>;
}

#[async_trait::async_trait]
impl<T: Synthesizer + ?Sized> Synthesizer for Box<T> {
    async fn synthesize(&mut self, request: SynthesisRequest) -> Result<SynthesizedSegment> {
        (**self).synthesize(request).await
    }

    async fn shutdown(&mut self) -> Result<()> {
        (**self).shutdown().await
    }
}

/// What a `MockSynthesizer` has been asked to do.
#[derive(Debug, Default)]
struct MockLog {
    requests: Vec<SynthesisRequest>,
    shutdowns: usize,
}

/// Read-only view of a mock's call log, usable after the mock is moved.
#[derive(Debug, Clone, Default)]
pub struct MockSynthesizerLog(Arc<Mutex<MockLog>>);

impl MockSynthesizerLog {
    pub fn requests(&self) -> Vec<SynthesisRequest> {
        self.lock().requests.clone()
    }

    pub fn shutdowns(&self) -> usize {
        self.lock().shutdowns
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockLog> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Mock synthesizer for testing
///
/// Writes the chunk text as the "audio" so assembled artifacts can be checked
/// for content and order.
#[derive(Debug, Clone)]
pub struct MockSynthesizer {
    fail_marker: Option<String>,
    write_segments: bool,
    log: MockSynthesizerLog,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self {
            fail_marker: None,
            write_segments: true,
            log: MockSynthesizerLog::default(),
        }
    }

    /// Fail every request whose text contains `marker`
    pub fn failing_when(mut self, marker: &str) -> Self {
        self.fail_marker = Some(marker.to_string());
        self
    }

    /// Report success without writing the segment file
    pub fn without_writing(mut self) -> Self {
        self.write_segments = false;
        self
    }

    pub fn log(&self) -> MockSynthesizerLog {
        self.log.clone()
    }
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&mut self, request: SynthesisRequest) -> Result<SynthesizedSegment> {
        self.log.lock().requests.push(request.clone());

        if let Some(marker) = &self.fail_marker
            && request.text.contains(marker.as_str())
        {
            return Err(NarratorError::Synthesis {
                message: format!("mock failure on '{marker}'"),
            });
        }

        if self.write_segments {
            tokio::fs::write(&request.output_path, format!("[{}]", request.text)).await?;
        }

        let response = SynthesisResponse {
            success: true,
            output_path: Some(request.output_path.clone()),
            duration_seconds: Some(request.text.chars().count() as f64 / 15.0),
            ..Default::default()
        };
        SynthesizedSegment::from_response(&request, response)
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.log.lock().shutdowns += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str, output_path: &str) -> SynthesisRequest {
        SynthesisRequest {
            text: text.to_string(),
            output_path: output_path.to_string(),
            voice_dir: "/voice".to_string(),
        }
    }

    #[test]
    fn test_failed_response_becomes_synthesis_error() {
        let response = SynthesisResponse {
            success: false,
            error: Some("voice not found".to_string()),
            ..Default::default()
        };
        let err = SynthesizedSegment::from_response(&request("x", "/o.wav"), response).unwrap_err();
        assert_eq!(err.to_string(), "Synthesis failed: voice not found");
    }

    #[test]
    fn test_failed_response_without_message() {
        let err = SynthesizedSegment::from_response(
            &request("x", "/o.wav"),
            SynthesisResponse::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("without a message"));
    }

    #[test]
    fn test_missing_output_path_falls_back_to_request() {
        let response = SynthesisResponse {
            success: true,
            ..Default::default()
        };
        let segment = SynthesizedSegment::from_response(&request("x", "/req.wav"), response).unwrap();
        assert_eq!(segment.path, PathBuf::from("/req.wav"));
        assert_eq!(segment.duration_seconds, None);
    }

    #[tokio::test]
    async fn test_mock_writes_text_and_logs_requests() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.wav");
        let mut mock = MockSynthesizer::new();
        let log = mock.log();

        let segment = mock
            .synthesize(request("hello", path.to_str().unwrap()))
            .await
            .unwrap();

        assert_eq!(segment.path, path);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[hello]");
        assert_eq!(log.requests().len(), 1);

        mock.shutdown().await.unwrap();
        assert_eq!(log.shutdowns(), 1);
    }

    #[tokio::test]
    async fn test_mock_fails_on_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.wav");
        let mut mock = MockSynthesizer::new().failing_when("BOOM");

        let result = mock
            .synthesize(request("this goes BOOM", path.to_str().unwrap()))
            .await;

        assert!(matches!(result, Err(NarratorError::Synthesis { .. })));
        assert!(!path.exists());
    }
}
