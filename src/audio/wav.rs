//! WAV segment inspection.

use crate::error::{NarratorError, Result};
use std::io::Read;
use std::path::Path;

/// Duration in seconds of WAV data read from `reader`.
pub fn duration_from_reader<R: Read>(reader: R) -> Result<f64> {
    let wav_reader = hound::WavReader::new(reader).map_err(|e| NarratorError::Assembly {
        message: format!("Failed to parse WAV file: {}", e),
    })?;

    let spec = wav_reader.spec();
    if spec.sample_rate == 0 {
        return Err(NarratorError::Assembly {
            message: "WAV file has a sample rate of zero".to_string(),
        });
    }
    // `duration` counts frames, i.e. samples per channel
    Ok(wav_reader.duration() as f64 / spec.sample_rate as f64)
}

/// Duration in seconds of the WAV file at `path`.
pub fn duration_seconds(path: &Path) -> Result<f64> {
    let file = std::fs::File::open(path)?;
    duration_from_reader(std::io::BufReader::new(file))
}
