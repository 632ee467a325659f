use std::path::{Path, PathBuf};

use matrix_media::HomeserverConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::ProcessorConfig;
use crate::cache::CacheConfig;

pub const CONFIG_PATH_ENV: &str = "ALLGRAM_VOICE_CONFIG";
pub const HOMESERVER_ENV: &str = "ALLGRAM_HOMESERVER";
pub const ACCESS_TOKEN_ENV: &str = "ALLGRAM_ACCESS_TOKEN";
pub const STORAGE_DIR_ENV: &str = "ALLGRAM_VOICE_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Everything needed to compose a voice message cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub cache: CacheConfig,
    pub processor: ProcessorConfig,
    pub homeserver: HomeserverConfig,
}

impl VoiceConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `ALLGRAM_VOICE_CONFIG` if set, otherwise defaults, then apply
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(HOMESERVER_ENV).filter(|v| !v.is_empty()) {
            self.homeserver.base_url = base_url;
        }
        if let Some(token) = lookup(ACCESS_TOKEN_ENV).filter(|v| !v.is_empty()) {
            self.homeserver.access_token = Some(token);
        }
        if let Some(dir) = lookup(STORAGE_DIR_ENV).filter(|v| !v.is_empty()) {
            self.cache.storage_dir = PathBuf::from(dir);
        }
    }
}
