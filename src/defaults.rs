//! Default configuration constants for narrator.
//!
//! Shared between the config layer and the components that fall back to these
//! values when constructed without a config.

/// Default maximum chunk length in characters.
///
/// Voice-cloning models degrade noticeably on long inputs; ~250 characters
/// keeps a chunk to two or three sentences.
pub const MAX_CHUNK_CHARS: usize = 250;

/// Extracted text shorter than this is too short to be worth narrating.
pub const MIN_NARRATABLE_CHARS: usize = 50;

/// Default interpreter used to launch the synthesis worker.
pub const WORKER_INTERPRETER: &str = "python3";

/// Default path of the synthesis worker script.
pub const WORKER_SCRIPT: &str = "scripts/tts_worker.py";

/// Default voice reference directory.
pub const VOICE_DIR: &str = "voice";

/// Voice reference files must match `<prefix>*.wav`.
pub const VOICE_REFERENCE_PREFIX: &str = "reference_";

/// Default conversion tool, resolved via `PATH`.
pub const FFMPEG: &str = "ffmpeg";

/// Default directory for final artifacts.
pub const OUTPUT_DIR: &str = "public/audio";

/// Name of the temp directory inside the output directory.
pub const TMP_DIR_NAME: &str = ".tmp";

/// Distribution format of final artifacts.
pub const DIST_FORMAT: &str = "mp3";

/// Format of raw per-chunk segments written by the worker.
pub const SEGMENT_FORMAT: &str = "wav";

/// Default encoder bitrate for the distribution format.
pub const BITRATE: &str = "128k";

/// Default content directory.
pub const CONTENT_DIR: &str = "content/posts";

/// Content file extensions recognized by the directory source.
pub const CONTENT_EXTENSIONS: &[&str] = &["md", "mdx"];

/// How long to wait for the worker to acknowledge a quit request.
pub const WORKER_QUIT_TIMEOUT_SECS: u64 = 10;

/// How long to wait for the worker process to exit after quit before killing it.
pub const WORKER_EXIT_GRACE_SECS: u64 = 5;
