//! Prerequisite checks.
//!
//! Verifies that the worker, its voice references and ffmpeg are in place
//! before any content is processed.

use crate::config::Config;
use crate::defaults;
use crate::error::{NarratorError, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Result of a dependency check.
#[derive(Debug, PartialEq)]
pub enum CheckResult {
    /// Resource is present and working
    Ok,
    /// Resource is not found
    NotFound,
    /// Resource is found but has issues
    Warning(String),
    /// Resource exists but cannot serve its purpose
    Unusable(String),
}

/// One named requirement and how to fix it.
#[derive(Debug)]
pub struct Prerequisite {
    pub name: String,
    pub result: CheckResult,
    pub remedy: String,
}

impl Prerequisite {
    pub fn is_missing(&self) -> bool {
        matches!(self.result, CheckResult::NotFound | CheckResult::Unusable(_))
    }
}

/// The Validating step of a run.
pub trait Preflight: Send + Sync {
    /// Fail with `MissingPrerequisite` naming the first missing resource.
    fn verify(&self) -> Result<()>;
}

/// Accepts everything. Used when prerequisites are checked elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPreflight;

impl Preflight for NoPreflight {
    fn verify(&self) -> Result<()> {
        Ok(())
    }
}

/// Checks the real file system and executable search path.
#[derive(Debug, Clone)]
pub struct SystemPreflight {
    interpreter: String,
    script: PathBuf,
    voice_dir: PathBuf,
    ffmpeg: String,
}

impl SystemPreflight {
    pub fn new(
        interpreter: impl Into<String>,
        script: impl Into<PathBuf>,
        voice_dir: impl Into<PathBuf>,
        ffmpeg: impl Into<String>,
    ) -> Self {
        Self {
            interpreter: interpreter.into(),
            script: script.into(),
            voice_dir: voice_dir.into(),
            ffmpeg: ffmpeg.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.worker.interpreter.clone(),
            config.worker.script.clone(),
            config.worker.voice_dir.clone(),
            config.audio.ffmpeg.clone(),
        )
    }

    /// Run every check, in the order they are reported.
    pub fn checks(&self) -> Vec<Prerequisite> {
        vec![
            Prerequisite {
                name: format!("Worker interpreter ({})", self.interpreter),
                result: check_command(&self.interpreter, "--version"),
                remedy: format!(
                    "Install it or set worker.interpreter (NARRATOR_WORKER_INTERPRETER) to a \
                     program on PATH. Currently: {}",
                    self.interpreter
                ),
            },
            Prerequisite {
                name: format!("Worker script ({})", self.script.display()),
                result: check_file(&self.script),
                remedy: "Set worker.script (NARRATOR_WORKER_SCRIPT) to the synthesis worker."
                    .to_string(),
            },
            Prerequisite {
                name: format!(
                    "Voice reference ({}/{}*.wav)",
                    self.voice_dir.display(),
                    defaults::VOICE_REFERENCE_PREFIX
                ),
                result: check_voice_dir(&self.voice_dir),
                remedy: format!(
                    "Record a voice sample and save it as {}/{}1.wav",
                    self.voice_dir.display(),
                    defaults::VOICE_REFERENCE_PREFIX
                ),
            },
            Prerequisite {
                name: format!("ffmpeg ({})", self.ffmpeg),
                result: check_command(&self.ffmpeg, "-version"),
                remedy: "Install it with: sudo apt install ffmpeg (Debian/Ubuntu) \
                         or sudo pacman -S ffmpeg (Arch), or set audio.ffmpeg."
                    .to_string(),
            },
        ]
    }
}

impl Preflight for SystemPreflight {
    fn verify(&self) -> Result<()> {
        for check in self.checks() {
            match check.result {
                CheckResult::Ok => tracing::debug!("{}: ok", check.name),
                CheckResult::Warning(ref msg) => tracing::warn!("{}: {}", check.name, msg),
                CheckResult::NotFound => {
                    return Err(NarratorError::MissingPrerequisite {
                        resource: check.name,
                        remedy: check.remedy,
                    });
                }
                CheckResult::Unusable(reason) => {
                    return Err(NarratorError::MissingPrerequisite {
                        resource: check.name,
                        remedy: format!("{}. {}", reason, check.remedy),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Check if a command exists and is executable.
fn check_command(command: &str, version_flag: &str) -> CheckResult {
    match Command::new(command)
        .arg(version_flag)
        .stdin(Stdio::null())
        .output()
    {
        Ok(output) if output.status.success() => CheckResult::Ok,
        Ok(_) => CheckResult::Warning(format!("'{}' found but {} failed", command, version_flag)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => CheckResult::NotFound,
        Err(e) => CheckResult::Warning(format!("Error checking '{}': {}", command, e)),
    }
}

fn check_file(path: &Path) -> CheckResult {
    if path.is_file() {
        CheckResult::Ok
    } else if path.exists() {
        CheckResult::Unusable(format!("{} is not a regular file", path.display()))
    } else {
        CheckResult::NotFound
    }
}

/// At least one `reference_*.wav` must be present.
fn check_voice_dir(dir: &Path) -> CheckResult {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return CheckResult::NotFound,
        Err(e) => return CheckResult::Unusable(format!("Cannot read {}: {}", dir.display(), e)),
    };

    let found = entries.filter_map(|e| e.ok()).any(|entry| {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        name.starts_with(defaults::VOICE_REFERENCE_PREFIX)
            && name.to_ascii_lowercase().ends_with(".wav")
            && entry.path().is_file()
    });

    if found {
        CheckResult::Ok
    } else {
        CheckResult::NotFound
    }
}

/// Run all dependency checks and print results.
///
/// Returns false if anything required is missing.
pub fn check_dependencies(preflight: &SystemPreflight) -> bool {
    println!("Checking narration prerequisites...\n");

    let mut all_present = true;
    for check in preflight.checks() {
        print!("{}: ", check.name);
        if check.is_missing() {
            all_present = false;
        }
        match check.result {
            CheckResult::Ok => println!("✓ OK"),
            CheckResult::NotFound => {
                println!("✗ NOT FOUND");
                for line in check.remedy.lines() {
                    println!("  {}", line);
                }
            }
            CheckResult::Warning(msg) => println!("⚠ WARNING: {}", msg),
            CheckResult::Unusable(msg) => {
                println!("✗ UNUSABLE: {}", msg);
                for line in check.remedy.lines() {
                    println!("  {}", line);
                }
            }
        }
    }

    println!();
    if all_present {
        println!("✓ Ready to narrate.");
    } else {
        println!("✗ Narration cannot start until the missing items are fixed.");
    }
    all_present
}
