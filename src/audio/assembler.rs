//! Assembly of per-chunk segments into one distributable file.

use crate::error::{NarratorError, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Joins ordered segments into a final artifact.
#[async_trait::async_trait]
pub trait Assembler: Send + Sync {
    /// Write `output` from `segments`, in the order given.
    ///
    /// Zero segments is a no-op. Input segments are left in place.
    async fn assemble(&self, segments: &[PathBuf], output: &Path) -> Result<()>;
}

/// Assembler backed by the `ffmpeg` command line tool.
#[derive(Debug, Clone)]
pub struct FfmpegAssembler {
    program: String,
    bitrate: String,
}

impl FfmpegAssembler {
    pub fn new(program: impl Into<String>, bitrate: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            bitrate: bitrate.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    async fn run(&self, args: Vec<OsString>) -> Result<()> {
        tracing::debug!(program = %self.program, ?args, "Running ffmpeg");
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| NarratorError::Assembly {
                message: format!("Failed to run {}: {}", self.program, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NarratorError::Assembly {
                message: format!("{} exited with {}: {}", self.program, output.status, stderr.trim()),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Assembler for FfmpegAssembler {
    async fn assemble(&self, segments: &[PathBuf], output: &Path) -> Result<()> {
        match segments {
            [] => Ok(()),
            [segment] => self.run(convert_args(segment, output, &self.bitrate)).await,
            _ => {
                let manifest = manifest_path(output);
                let mut entries = Vec::with_capacity(segments.len());
                for segment in segments {
                    entries.push(std::path::absolute(segment)?);
                }
                tokio::fs::write(&manifest, manifest_contents(&entries)).await?;

                let result = self
                    .run(concat_args(&manifest, output, &self.bitrate))
                    .await;

                if let Err(e) = tokio::fs::remove_file(&manifest).await {
                    tracing::warn!("Failed to remove manifest {}: {}", manifest.display(), e);
                }
                result
            }
        }
    }
}

/// Arguments that transcode one segment into `output`.
pub fn convert_args(segment: &Path, output: &Path, bitrate: &str) -> Vec<OsString> {
    let mut args = base_args();
    args.push("-i".into());
    args.push(segment.into());
    args.extend(codec_args(output, bitrate));
    args.push(output.into());
    args
}

/// Arguments that concatenate the segments listed in `manifest` into `output`.
pub fn concat_args(manifest: &Path, output: &Path, bitrate: &str) -> Vec<OsString> {
    let mut args = base_args();
    for arg in ["-f", "concat", "-safe", "0", "-i"] {
        args.push(arg.into());
    }
    args.push(manifest.into());
    args.extend(codec_args(output, bitrate));
    args.push(output.into());
    args
}

fn base_args() -> Vec<OsString> {
    ["-y", "-hide_banner", "-loglevel", "error"]
        .into_iter()
        .map(OsString::from)
        .collect()
}

/// Encoder selection by output extension.
fn codec_args(output: &Path, bitrate: &str) -> Vec<OsString> {
    let extension = output
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let (codec, lossy) = match extension.as_str() {
        "mp3" => ("libmp3lame", true),
        "ogg" => ("libvorbis", true),
        "opus" => ("libopus", true),
        "m4a" | "aac" => ("aac", true),
        "flac" => ("flac", false),
        "wav" => ("pcm_s16le", false),
        // Let ffmpeg pick from the container
        _ => return Vec::new(),
    };

    let mut args: Vec<OsString> = vec!["-codec:a".into(), codec.into()];
    if lossy && !bitrate.is_empty() {
        args.push("-b:a".into());
        args.push(bitrate.into());
    }
    args
}

/// Manifest written beside the artifact while concatenating.
pub fn manifest_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!(".{name}.concat.txt"))
}

/// Concat demuxer listing, one `file '<path>'` line per segment.
pub fn manifest_contents(segments: &[PathBuf]) -> String {
    segments
        .iter()
        .map(|segment| {
            let escaped = segment.to_string_lossy().replace('\'', r"'\''");
            format!("file '{escaped}'\n")
        })
        .collect()
}
