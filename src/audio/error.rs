use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("audio io failed: {0}")]
    Io(String),
    #[error("unrecognised audio format: {0}")]
    Probe(String),
    #[error("audio file contains no decodable track")]
    NoTrack,
    #[error("failed to decode audio: {0}")]
    Decode(String),
    #[error("audio converter failed: {0}")]
    Converter(String),
    #[error("audio duration could not be determined")]
    UnknownDuration,
    #[error("audio produced no samples")]
    NoSamples,
    #[error("audio processing timed out")]
    TimedOut,
    #[error("audio worker stopped: {0}")]
    Interrupted(String),
}
