use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::convert::convert_to_wav;
use super::decoder::{decode_mono, probe_duration};
use super::waveform::amplitude_envelope;
use super::AnalysisError;

/// Turns a staged media file into something playable and measurable.
///
/// Methods are blocking and are run off the async runtime by the cache.
pub trait AudioProcessor: Send + Sync + 'static {
    /// Produce a playable, analysable file from the downloaded one.
    fn convert(&self, source: &Path) -> Result<PathBuf, AnalysisError>;

    fn duration(&self, path: &Path) -> Result<Duration, AnalysisError>;

    /// Sample `sample_count` amplitude points in `[0, 1]`.
    fn waveform(&self, path: &Path, sample_count: usize) -> Result<Vec<f32>, AnalysisError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// ffmpeg binary used for formats symphonia cannot decode. `None`
    /// disables conversion.
    pub ffmpeg_path: Option<PathBuf>,
    /// Extensions (lowercase, no dot) that need conversion.
    pub convert_extensions: Vec<String>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: Some(PathBuf::from("ffmpeg")),
            convert_extensions: ["ogg", "oga", "opus", "webm"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

/// Symphonia-backed processor, shelling out to ffmpeg for opus voice notes.
pub struct SymphoniaProcessor {
    config: ProcessorConfig,
}

impl SymphoniaProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self { config }
    }

    fn needs_conversion(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            return false;
        };
        let ext = ext.to_ascii_lowercase();
        self.config.convert_extensions.iter().any(|e| *e == ext)
    }
}

impl Default for SymphoniaProcessor {
    fn default() -> Self {
        Self::new(ProcessorConfig::default())
    }
}

impl AudioProcessor for SymphoniaProcessor {
    fn convert(&self, source: &Path) -> Result<PathBuf, AnalysisError> {
        match &self.config.ffmpeg_path {
            Some(ffmpeg) if self.needs_conversion(source) => convert_to_wav(ffmpeg, source),
            _ => Ok(source.to_path_buf()),
        }
    }

    fn duration(&self, path: &Path) -> Result<Duration, AnalysisError> {
        if let Some(duration) = probe_duration(path)? {
            return Ok(duration);
        }
        // Streams without a frame count in the header have to be decoded.
        let decoded = decode_mono(path)?;
        if decoded.samples.is_empty() {
            return Err(AnalysisError::UnknownDuration);
        }
        Ok(decoded.duration())
    }

    fn waveform(&self, path: &Path, sample_count: usize) -> Result<Vec<f32>, AnalysisError> {
        let decoded = decode_mono(path)?;
        if decoded.samples.is_empty() {
            return Err(AnalysisError::NoSamples);
        }
        Ok(amplitude_envelope(&decoded.samples, sample_count))
    }
}
