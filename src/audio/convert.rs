use std::path::{Path, PathBuf};
use std::process::Command;

use super::AnalysisError;

/// Transcode `source` into a sibling PCM wav file with ffmpeg.
///
/// Voice notes are usually ogg/opus, which symphonia cannot decode.
pub fn convert_to_wav(ffmpeg: &Path, source: &Path) -> Result<PathBuf, AnalysisError> {
    let target = source.with_extension("wav");
    if target == source {
        return Ok(target);
    }

    let output = Command::new(ffmpeg)
        .arg("-y")
        .arg("-v")
        .arg("error")
        .arg("-i")
        .arg(source)
        .args(["-acodec", "pcm_s16le"])
        .arg(&target)
        .output()
        .map_err(|e| AnalysisError::Converter(format!("failed to run {}: {}", ffmpeg.display(), e)))?;

    if !output.status.success() {
        let _ = std::fs::remove_file(&target);
        return Err(AnalysisError::Converter(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_sources_are_not_converted() {
        let source = Path::new("/tmp/VoiceMessages/abc.wav");
        let converted = convert_to_wav(Path::new("/nonexistent/ffmpeg"), source).unwrap();
        assert_eq!(converted, source);
    }

    #[test]
    fn missing_converter_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("voice.ogg");
        std::fs::write(&source, b"OggS").unwrap();

        let err = convert_to_wav(Path::new("/nonexistent/ffmpeg"), &source).unwrap_err();
        assert!(matches!(err, AnalysisError::Converter(_)));
    }
}
