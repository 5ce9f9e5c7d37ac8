use crate::defaults;
use crate::error::{NarratorError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub worker: WorkerConfig,
    pub audio: AudioConfig,
    pub content: ContentConfig,
    pub chunking: ChunkingConfig,
}

/// Synthesis worker configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Program that runs the worker script (e.g. a venv's python)
    pub interpreter: String,
    pub script: PathBuf,
    /// Extra arguments passed after the script path
    pub args: Vec<String>,
    /// Directory holding `reference_*.wav` voice samples
    pub voice_dir: PathBuf,
    /// Per-request timeout in humantime format; empty disables it
    pub request_timeout: String,
}

/// Output and conversion configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub output_dir: PathBuf,
    pub ffmpeg: String,
    pub format: String,
    pub segment_format: String,
    pub bitrate: String,
}

/// Content source configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContentConfig {
    pub dir: PathBuf,
    pub extensions: Vec<String>,
}

/// Chunking thresholds, in characters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub min_narratable_chars: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interpreter: defaults::WORKER_INTERPRETER.to_string(),
            script: PathBuf::from(defaults::WORKER_SCRIPT),
            args: Vec::new(),
            voice_dir: PathBuf::from(defaults::VOICE_DIR),
            request_timeout: String::new(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(defaults::OUTPUT_DIR),
            ffmpeg: defaults::FFMPEG.to_string(),
            format: defaults::DIST_FORMAT.to_string(),
            segment_format: defaults::SEGMENT_FORMAT.to_string(),
            bitrate: defaults::BITRATE.to_string(),
        }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(defaults::CONTENT_DIR),
            extensions: defaults::CONTENT_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: defaults::MAX_CHUNK_CHARS,
            min_narratable_chars: defaults::MIN_NARRATABLE_CHARS,
        }
    }
}

impl WorkerConfig {
    /// Parsed request timeout, `None` when disabled.
    pub fn request_timeout(&self) -> Result<Option<Duration>> {
        let raw = self.request_timeout.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        // Bare number -> seconds
        if let Ok(secs) = raw.parse::<u64>() {
            return Ok(Some(Duration::from_secs(secs)));
        }
        humantime::parse_duration(raw)
            .map(Some)
            .map_err(|e| NarratorError::ConfigInvalidValue {
                key: "worker.request_timeout".to_string(),
                message: e.to_string(),
            })
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(NarratorError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - NARRATOR_WORKER_INTERPRETER → worker.interpreter
    /// - NARRATOR_WORKER_SCRIPT → worker.script
    /// - NARRATOR_VOICE_DIR → worker.voice_dir
    /// - NARRATOR_FFMPEG → audio.ffmpeg
    /// - NARRATOR_OUTPUT_DIR → audio.output_dir
    /// - NARRATOR_CONTENT_DIR → content.dir
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = non_empty_env("NARRATOR_WORKER_INTERPRETER") {
            self.worker.interpreter = v;
        }
        if let Some(v) = non_empty_env("NARRATOR_WORKER_SCRIPT") {
            self.worker.script = PathBuf::from(v);
        }
        if let Some(v) = non_empty_env("NARRATOR_VOICE_DIR") {
            self.worker.voice_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty_env("NARRATOR_FFMPEG") {
            self.audio.ffmpeg = v;
        }
        if let Some(v) = non_empty_env("NARRATOR_OUTPUT_DIR") {
            self.audio.output_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty_env("NARRATOR_CONTENT_DIR") {
            self.content.dir = PathBuf::from(v);
        }
        self
    }

    /// Reject values no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_chars == 0 {
            return Err(invalid("chunking.max_chars", "must be greater than zero"));
        }
        if self.audio.format.trim().is_empty() {
            return Err(invalid("audio.format", "must not be empty"));
        }
        if self.audio.segment_format.trim().is_empty() {
            return Err(invalid("audio.segment_format", "must not be empty"));
        }
        if self.content.extensions.is_empty() {
            return Err(invalid("content.extensions", "must list at least one extension"));
        }
        self.worker.request_timeout()?;
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/narrator/config.toml on Linux, or a relative
    /// `narrator.toml` when no config directory can be determined.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("narrator").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("narrator.toml"))
    }

    /// Serialize the effective configuration for display.
    pub fn to_display_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| NarratorError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Commented template with every key at its default.
    pub fn dump_template() -> &'static str {
        CONFIG_TEMPLATE
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn invalid(key: &str, message: &str) -> NarratorError {
    NarratorError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

const CONFIG_TEMPLATE: &str = r#"# narrator configuration
# Location: ~/.config/narrator/config.toml

[worker]
# Program that runs the synthesis worker
interpreter = "python3"
script = "scripts/tts_worker.py"
# Extra arguments after the script path
args = []
# Must contain at least one reference_*.wav
voice_dir = "voice"
# Per-request timeout ("90s", "5m"). Empty waits forever.
request_timeout = ""

[audio]
output_dir = "public/audio"
# Resolved via PATH unless absolute
ffmpeg = "ffmpeg"
format = "mp3"
segment_format = "wav"
bitrate = "128k"

[content]
dir = "content/posts"
extensions = ["md", "mdx"]

[chunking]
# Target upper bound per chunk; a single longer sentence is kept whole
max_chars = 250
# Items with less extracted text are skipped
min_narratable_chars = 50
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_narrator_env() {
        for key in [
            "NARRATOR_WORKER_INTERPRETER",
            "NARRATOR_WORKER_SCRIPT",
            "NARRATOR_VOICE_DIR",
            "NARRATOR_FFMPEG",
            "NARRATOR_OUTPUT_DIR",
            "NARRATOR_CONTENT_DIR",
        ] {
            remove_env(key);
        }
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.worker.interpreter, "python3");
        assert_eq!(config.worker.script, PathBuf::from("scripts/tts_worker.py"));
        assert!(config.worker.args.is_empty());
        assert_eq!(config.worker.voice_dir, PathBuf::from("voice"));
        assert_eq!(config.worker.request_timeout().unwrap(), None);

        assert_eq!(config.audio.output_dir, PathBuf::from("public/audio"));
        assert_eq!(config.audio.ffmpeg, "ffmpeg");
        assert_eq!(config.audio.format, "mp3");
        assert_eq!(config.audio.segment_format, "wav");

        assert_eq!(config.content.extensions, vec!["md", "mdx"]);
        assert_eq!(config.chunking.max_chars, 250);
        assert_eq!(config.chunking.min_narratable_chars, 50);
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [worker]
            interpreter = "/opt/venv/bin/python"
            script = "worker.py"
            args = ["--device", "cuda"]
            voice_dir = "/srv/voice"
            request_timeout = "5m"

            [audio]
            output_dir = "dist/audio"
            format = "ogg"

            [chunking]
            max_chars = 400
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.worker.interpreter, "/opt/venv/bin/python");
        assert_eq!(config.worker.args, vec!["--device", "cuda"]);
        assert_eq!(
            config.worker.request_timeout().unwrap(),
            Some(Duration::from_secs(300))
        );
        assert_eq!(config.audio.output_dir, PathBuf::from("dist/audio"));
        assert_eq!(config.audio.format, "ogg");
        assert_eq!(config.chunking.max_chars, 400);

        // Untouched values keep defaults
        assert_eq!(config.audio.segment_format, "wav");
        assert_eq!(config.chunking.min_narratable_chars, 50);
        assert_eq!(config.content, ContentConfig::default());
    }

    #[test]
    fn test_template_parses_to_defaults() {
        let config: Config = toml::from_str(Config::dump_template()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_bare_number_timeout_is_seconds() {
        let worker = WorkerConfig {
            request_timeout: "90".to_string(),
            ..WorkerConfig::default()
        };
        assert_eq!(
            worker.request_timeout().unwrap(),
            Some(Duration::from_secs(90))
        );
    }

    #[test]
    fn test_validate_rejects_zero_max_chars() {
        let mut config = Config::default();
        config.chunking.max_chars = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chunking.max_chars"));
    }

    #[test]
    fn test_validate_rejects_bad_timeout() {
        let mut config = Config::default();
        config.worker.request_timeout = "soon".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("worker.request_timeout"));
    }

    #[test]
    fn test_env_override_worker_and_paths() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_narrator_env();

        set_env("NARRATOR_WORKER_SCRIPT", "/opt/tts/worker.py");
        set_env("NARRATOR_VOICE_DIR", "/opt/tts/voice");
        set_env("NARRATOR_OUTPUT_DIR", "/var/www/audio");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.worker.script, PathBuf::from("/opt/tts/worker.py"));
        assert_eq!(config.worker.voice_dir, PathBuf::from("/opt/tts/voice"));
        assert_eq!(config.audio.output_dir, PathBuf::from("/var/www/audio"));
        assert_eq!(config.audio.ffmpeg, "ffmpeg"); // Not overridden

        clear_narrator_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_narrator_env();

        set_env("NARRATOR_FFMPEG", "");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.audio.ffmpeg, "ffmpeg");

        clear_narrator_env();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[worker\nscript = \"broken").unwrap();

        assert!(Config::load(temp_file.path()).is_err());
        assert!(Config::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_default_path_ends_with_config_toml() {
        let path = Config::default_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.ends_with("config.toml") || path_str.ends_with("narrator.toml"));
    }
}
