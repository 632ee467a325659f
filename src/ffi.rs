//! C entry points for clearing the voice message cache from foreign code.
//!
//! The host receives an opaque clearer pointer from [`CacheClearer::into_raw`]
//! and must release it with [`allgram_voice_clearer_free`].

use crate::cache::CacheClearer;

impl CacheClearer {
    pub fn into_raw(self) -> *mut CacheClearer {
        Box::into_raw(Box::new(self))
    }
}

/// Clear the cache behind `clearer`. Returns false for a null pointer or a
/// cache that has already been dropped.
///
/// # Safety
/// `clearer` must be null or a pointer from [`CacheClearer::into_raw`] that
/// has not been freed.
#[no_mangle]
pub unsafe extern "C" fn allgram_voice_cache_clear(clearer: *const CacheClearer) -> bool {
    match clearer.as_ref() {
        Some(clearer) => clearer.clear(),
        None => false,
    }
}

/// Release a clearer obtained from [`CacheClearer::into_raw`].
///
/// # Safety
/// `clearer` must be null or an unfreed pointer from [`CacheClearer::into_raw`].
#[no_mangle]
pub unsafe extern "C" fn allgram_voice_clearer_free(clearer: *mut CacheClearer) {
    if !clearer.is_null() {
        drop(Box::from_raw(clearer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use matrix_media::{FetchError, MediaFetcher, MediaSource};

    use crate::audio::{AnalysisError, AudioProcessor};
    use crate::cache::{CacheConfig, VoiceMessageCache};

    struct Offline;

    #[async_trait]
    impl MediaFetcher for Offline {
        async fn fetch(&self, _: &MediaSource, _: &Path) -> Result<PathBuf, FetchError> {
            Err(FetchError::Request("offline".to_string()))
        }
    }

    impl AudioProcessor for Offline {
        fn convert(&self, source: &Path) -> Result<PathBuf, AnalysisError> {
            Ok(source.to_path_buf())
        }

        fn duration(&self, _: &Path) -> Result<Duration, AnalysisError> {
            Err(AnalysisError::UnknownDuration)
        }

        fn waveform(&self, _: &Path, _: usize) -> Result<Vec<f32>, AnalysisError> {
            Err(AnalysisError::NoSamples)
        }
    }

    #[test]
    fn null_pointers_are_ignored() {
        unsafe {
            assert!(!allgram_voice_cache_clear(std::ptr::null()));
            allgram_voice_clearer_free(std::ptr::null_mut());
        }
    }

    #[tokio::test]
    async fn clearer_outlives_the_cache_safely() {
        let dir = tempfile::tempdir().unwrap();
        let storage_dir = dir.path().join("VoiceMessages");
        std::fs::create_dir_all(&storage_dir).unwrap();
        let cache = VoiceMessageCache::new(
            CacheConfig {
                storage_dir: storage_dir.clone(),
                step_timeout_secs: None,
            },
            Arc::new(Offline),
            Arc::new(Offline),
        );

        let raw = cache.clearer().into_raw();
        assert!(unsafe { allgram_voice_cache_clear(raw) });
        assert!(!storage_dir.exists());

        // The worker holds the cache state until it sees the job channel close.
        drop(cache);
        let mut cleared = true;
        for _ in 0..100 {
            tokio::task::yield_now().await;
            cleared = unsafe { allgram_voice_cache_clear(raw) };
            if !cleared {
                break;
            }
        }
        assert!(!cleared);

        unsafe { allgram_voice_clearer_free(raw) };
    }
}
