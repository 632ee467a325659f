pub mod encrypted;
pub mod http;
pub mod mxc;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

pub use encrypted::{DecryptError, EncryptedFile, JsonWebKey};
pub use http::{HomeserverConfig, HttpMediaFetcher};
pub use mxc::{MxcUri, MxcUriError};

/// Where the bytes of a media message live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// Unencrypted content, referenced by its `mxc://` URI.
    Plain { url: String },
    /// Content uploaded to an encrypted room.
    Encrypted(Box<EncryptedFile>),
}

impl MediaSource {
    pub fn content_uri(&self) -> &str {
        match self {
            MediaSource::Plain { url } => url,
            MediaSource::Encrypted(file) => &file.url,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, MediaSource::Encrypted(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The transfer was cancelled before it produced a result.
    #[error("media transfer was cancelled")]
    Cancelled,
    #[error(transparent)]
    InvalidUri(#[from] MxcUriError),
    #[error("homeserver returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("media request failed: {0}")]
    Request(String),
    #[error("media io failed: {0}")]
    Io(String),
    #[error("media transfer timed out")]
    TimedOut,
    #[error(transparent)]
    Decrypt(#[from] DecryptError),
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Io(err.to_string())
    }
}

/// Downloads media content to a local file, decrypting it when needed.
///
/// Implementations must be safe to call again for the same source after a
/// failure, and must leave a complete plaintext file at the returned path.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, source: &MediaSource, destination: &Path)
        -> Result<PathBuf, FetchError>;
}
