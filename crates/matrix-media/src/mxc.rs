use std::fmt;

use thiserror::Error;

const MXC_SCHEME: &str = "mxc://";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MxcUriError {
    #[error("content uri must start with mxc://: {0}")]
    MissingScheme(String),
    #[error("content uri has no server name: {0}")]
    MissingServer(String),
    #[error("content uri has no media id: {0}")]
    MissingMediaId(String),
    #[error("media id contains invalid characters: {0}")]
    InvalidMediaId(String),
}

/// A parsed `mxc://<server-name>/<media-id>` content URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MxcUri {
    server_name: String,
    media_id: String,
}

impl MxcUri {
    pub fn parse(uri: &str) -> Result<Self, MxcUriError> {
        let rest = uri
            .strip_prefix(MXC_SCHEME)
            .ok_or_else(|| MxcUriError::MissingScheme(uri.to_string()))?;

        let (server_name, media_id) = match rest.split_once('/') {
            Some(parts) => parts,
            None => (rest, ""),
        };
        if server_name.is_empty() {
            return Err(MxcUriError::MissingServer(uri.to_string()));
        }
        if media_id.is_empty() {
            return Err(MxcUriError::MissingMediaId(uri.to_string()));
        }
        // Media ids are opaque but restricted to url-safe characters.
        if !media_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(MxcUriError::InvalidMediaId(uri.to_string()));
        }

        Ok(Self {
            server_name: server_name.to_string(),
            media_id: media_id.to_string(),
        })
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn media_id(&self) -> &str {
        &self.media_id
    }

    /// Build the download URL for this content on `base_url`.
    ///
    /// Authenticated media lives under the client API; the legacy media
    /// repository path is kept for homeservers that predate it.
    pub fn download_url(&self, base_url: &str, authenticated: bool) -> String {
        let base = base_url.trim_end_matches('/');
        let prefix = if authenticated {
            "_matrix/client/v1/media/download"
        } else {
            "_matrix/media/v3/download"
        };
        format!("{}/{}/{}/{}", base, prefix, self.server_name, self.media_id)
    }
}

impl fmt::Display for MxcUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", MXC_SCHEME, self.server_name, self.media_id)
    }
}
