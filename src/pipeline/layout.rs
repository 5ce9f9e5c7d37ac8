//! On-disk layout of artifacts and temporary segments.
//!
//! ```text
//! <output_dir>/<id>.<format>                 final artifact
//! <output_dir>/.tmp/<id>_<seq>.<seg_format>  per-chunk segment
//! ```

use crate::config::AudioConfig;
use crate::defaults;
use crate::error::Result;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    output_dir: PathBuf,
    tmp_dir: PathBuf,
    format: String,
    segment_format: String,
}

impl OutputLayout {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        format: impl Into<String>,
        segment_format: impl Into<String>,
    ) -> Self {
        let output_dir = output_dir.into();
        Self {
            tmp_dir: output_dir.join(defaults::TMP_DIR_NAME),
            output_dir,
            format: format.into(),
            segment_format: segment_format.into(),
        }
    }

    pub fn from_config(audio: &AudioConfig) -> Self {
        Self::new(
            audio.output_dir.clone(),
            audio.format.clone(),
            audio.segment_format.clone(),
        )
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    /// The presence of this file marks the item as done.
    pub fn artifact_path(&self, id: &str) -> PathBuf {
        self.output_dir.join(format!("{}.{}", id, self.format))
    }

    pub fn segment_path(&self, id: &str, sequence: usize) -> PathBuf {
        self.tmp_dir
            .join(format!("{}_{}.{}", id, sequence, self.segment_format))
    }

    /// Create the output and temp directories.
    pub fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.output_dir)?;
        fs::create_dir_all(&self.tmp_dir)?;
        Ok(())
    }

    /// Remove everything left in the temp directory by an earlier run.
    ///
    /// Returns the number of entries removed.
    pub fn sweep_tmp(&self) -> Result<usize> {
        let entries = match fs::read_dir(&self.tmp_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                remove_if_present(&path)?;
            }
            removed += 1;
        }
        Ok(removed)
    }

    /// Delete this item's segments, leaving other items' files alone.
    pub fn purge_item(&self, id: &str) -> Result<usize> {
        let entries = match fs::read_dir(&self.tmp_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            if self.is_segment_of(id, &name.to_string_lossy()) {
                remove_if_present(&entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove the temp directory itself.
    pub fn remove_tmp(&self) -> Result<()> {
        match fs::remove_dir_all(&self.tmp_dir) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// `<id>_<digits>.<segment_format>`, so `post` never matches `post_two_0.wav`.
    fn is_segment_of(&self, id: &str, file_name: &str) -> bool {
        let Some(rest) = file_name
            .strip_prefix(id)
            .and_then(|rest| rest.strip_prefix('_'))
        else {
            return false;
        };
        let Some((sequence, extension)) = rest.split_once('.') else {
            return false;
        };
        !sequence.is_empty()
            && sequence.bytes().all(|b| b.is_ascii_digit())
            && extension == self.segment_format
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}
