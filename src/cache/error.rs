use matrix_media::{DecryptError, FetchError};
use thiserror::Error;

use crate::audio::AnalysisError;

/// Why a voice message could not be loaded.
///
/// Every waiter on a failed request receives its own clone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoiceMessageError {
    #[error("attachment is not a voice message")]
    InvalidAttachmentType,
    #[error("attachment has no event id")]
    InvalidEventId,
    #[error("number of samples must be positive")]
    InvalidNumberOfSamples,
    #[error("failed to decrypt voice message: {0}")]
    Decryption(DecryptError),
    #[error("failed to prepare voice message: {0}")]
    Preparation(FetchError),
    #[error("failed to convert voice message: {0}")]
    Conversion(AnalysisError),
    #[error("failed to read voice message duration{}", describe(.0))]
    Duration(Option<AnalysisError>),
    #[error("failed to sample voice message waveform{}", describe(.0))]
    Sampling(Option<AnalysisError>),
    #[error("voice message load was cancelled")]
    Cancelled,
}

fn describe(cause: &Option<AnalysisError>) -> String {
    match cause {
        Some(err) => format!(": {}", err),
        None => String::new(),
    }
}

impl From<FetchError> for VoiceMessageError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Cancelled => VoiceMessageError::Cancelled,
            FetchError::Decrypt(err) => VoiceMessageError::Decryption(err),
            other => VoiceMessageError::Preparation(other),
        }
    }
}
