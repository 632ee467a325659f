//! Download, decrypt, measure and sample voice message attachments.
//!
//! Requests are keyed by event id and waveform resolution. Concurrent
//! requests for the same key share one load, and a single worker task runs
//! loads one at a time so an attachment is never fetched twice in parallel.
//! The bookkeeping tables sit behind a plain mutex that is never held across
//! an await.

mod error;
mod state;
mod worker;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use log::{debug, info, warn};
use matrix_media::MediaFetcher;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};

use crate::attachment::Attachment;
use crate::audio::AudioProcessor;
use crate::main_queue::MainHandle;

pub use error::VoiceMessageError;

use state::{CacheState, LoadResult, SampleRequest};
use worker::LoadJob;

/// Directory name used under the system temp dir for staged attachments.
pub const STORAGE_DIR_NAME: &str = "VoiceMessages";

/// A voice message ready for playback and rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceMessage {
    /// Local, decrypted and playable audio file.
    pub file: PathBuf,
    pub duration: Duration,
    /// Normalised amplitude envelope, one value per requested sample.
    pub samples: Arc<[f32]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub storage_dir: PathBuf,
    /// Upper bound for each pipeline step. `None` waits indefinitely.
    pub step_timeout_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            storage_dir: std::env::temp_dir().join(STORAGE_DIR_NAME),
            step_timeout_secs: Some(60),
        }
    }
}

impl CacheConfig {
    fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_secs.map(Duration::from_secs)
    }
}

/// Table sizes at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub sample_variants: usize,
    pub pending_requests: usize,
    pub pending_waiters: usize,
}

struct Shared {
    config: CacheConfig,
    fetcher: Arc<dyn MediaFetcher>,
    processor: Arc<dyn AudioProcessor>,
    state: Mutex<CacheState>,
    /// Bumped by every clear; jobs from an older generation are abandoned.
    generation: watch::Sender<u64>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    fn clear(&self) {
        let (cancelled, retired) = {
            let mut state = self.state();
            self.generation.send_modify(|generation| *generation += 1);
            // Loads submitted after the unlock must stage into a fresh directory.
            let retired = self.retire_storage();
            (state.cancel_all(), retired)
        };

        if let Some(retired) = retired {
            remove_storage(&retired);
        }
        info!(
            "voice message cache cleared, {} pending request(s) cancelled",
            cancelled
        );
    }

    /// Move the storage directory to a sibling tombstone. Falls back to
    /// deleting it in place when it cannot be renamed.
    fn retire_storage(&self) -> Option<PathBuf> {
        let dir = &self.config.storage_dir;
        let Some(name) = dir.file_name() else {
            remove_storage(dir);
            return None;
        };
        let tombstone = dir.with_file_name(format!(
            "{}.cleared-{}-{}",
            name.to_string_lossy(),
            std::process::id(),
            self.generation()
        ));

        match std::fs::rename(dir, &tombstone) {
            Ok(()) => Some(tombstone),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                debug!("could not retire {}: {}", dir.display(), err);
                remove_storage(dir);
                None
            }
        }
    }
}

fn remove_storage(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => debug!("could not remove {}: {}", path.display(), err),
    }
}

struct Inner {
    shared: Arc<Shared>,
    jobs: mpsc::UnboundedSender<LoadJob>,
    runtime: Handle,
}

enum Begin {
    Ready(LoadResult),
    Waiting(oneshot::Receiver<LoadResult>),
}

/// Process-wide voice message cache. Build one at startup and clone it into
/// whatever needs it; clones share the same tables and worker.
#[derive(Clone)]
pub struct VoiceMessageCache {
    inner: Arc<Inner>,
}

impl VoiceMessageCache {
    /// Create the cache and start its worker on the current tokio runtime.
    ///
    /// Panics when called outside a runtime; use [`Self::with_runtime`] there.
    pub fn new(
        config: CacheConfig,
        fetcher: Arc<dyn MediaFetcher>,
        processor: Arc<dyn AudioProcessor>,
    ) -> Self {
        Self::with_runtime(config, fetcher, processor, Handle::current())
    }

    pub fn with_runtime(
        config: CacheConfig,
        fetcher: Arc<dyn MediaFetcher>,
        processor: Arc<dyn AudioProcessor>,
        runtime: Handle,
    ) -> Self {
        let (generation, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            config,
            fetcher,
            processor,
            state: Mutex::new(CacheState::default()),
            generation,
        });
        let (jobs, rx) = mpsc::unbounded_channel();
        runtime.spawn(worker::run(Arc::clone(&shared), rx));

        Self {
            inner: Arc::new(Inner {
                shared,
                jobs,
                runtime,
            }),
        }
    }

    /// Load `attachment` with a waveform of `sample_count` points.
    pub async fn load(
        &self,
        attachment: &Attachment,
        sample_count: usize,
    ) -> Result<VoiceMessage, VoiceMessageError> {
        match self.begin(attachment, sample_count) {
            Begin::Ready(result) => result,
            Begin::Waiting(rx) => rx.await.unwrap_or(Err(VoiceMessageError::Cancelled)),
        }
    }

    /// Callback form of [`Self::load`]. `completion` always runs on the main
    /// context, including for cached results and invalid input.
    pub fn load_with<F>(
        &self,
        attachment: &Attachment,
        sample_count: usize,
        main: &MainHandle,
        completion: F,
    ) where
        F: FnOnce(Result<VoiceMessage, VoiceMessageError>) + Send + 'static,
    {
        match self.begin(attachment, sample_count) {
            Begin::Ready(result) => {
                main.dispatch(move || completion(result));
            }
            Begin::Waiting(rx) => {
                let main = main.clone();
                self.inner.runtime.spawn(async move {
                    let result = rx.await.unwrap_or(Err(VoiceMessageError::Cancelled));
                    main.dispatch(move || completion(result));
                });
            }
        }
    }

    fn begin(&self, attachment: &Attachment, sample_count: usize) -> Begin {
        let request = match validate(attachment, sample_count) {
            Ok(request) => request,
            Err(err) => return Begin::Ready(Err(err)),
        };

        let shared = &self.inner.shared;
        let mut state = shared.state();
        if let Some(message) = state.cached(&request) {
            debug!("voice message {} ({}) served from cache", request.id, sample_count);
            return Begin::Ready(Ok(message));
        }

        let (tx, rx) = oneshot::channel();
        if state.register(request.clone(), tx) {
            let job = LoadJob {
                request: request.clone(),
                attachment: attachment.clone(),
                generation: shared.generation(),
            };
            if self.inner.jobs.send(job).is_err() {
                warn!("voice message worker has stopped, failing {}", request.id);
                state.resolve(&request, Err(VoiceMessageError::Cancelled));
            }
        }
        Begin::Waiting(rx)
    }

    /// Cancel all work, fail pending loads with `Cancelled`, drop every cached
    /// entry and delete the storage directory.
    pub fn clear_cache(&self) {
        self.inner.shared.clear();
    }

    /// A handle that can clear this cache without keeping it alive.
    pub fn clearer(&self) -> CacheClearer {
        CacheClearer {
            shared: Arc::downgrade(&self.inner.shared),
        }
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.shared.state();
        CacheStats {
            entries: state.entries.len(),
            sample_variants: state.entries.values().map(|e| e.samples.len()).sum(),
            pending_requests: state.pending.len(),
            pending_waiters: state.pending.values().map(Vec::len).sum(),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.inner.shared.config.storage_dir
    }
}

/// Weak handle for clearing the cache from other subsystems (sign-out,
/// account switch) and from foreign code.
#[derive(Clone)]
pub struct CacheClearer {
    shared: Weak<Shared>,
}

impl CacheClearer {
    /// Clear the cache. Returns false if it no longer exists.
    pub fn clear(&self) -> bool {
        match self.shared.upgrade() {
            Some(shared) => {
                shared.clear();
                true
            }
            None => false,
        }
    }
}

fn validate(
    attachment: &Attachment,
    sample_count: usize,
) -> Result<SampleRequest, VoiceMessageError> {
    if !attachment.is_voice_message() {
        return Err(VoiceMessageError::InvalidAttachmentType);
    }
    let id = attachment
        .identifier()
        .ok_or(VoiceMessageError::InvalidEventId)?;
    if sample_count == 0 {
        return Err(VoiceMessageError::InvalidNumberOfSamples);
    }
    Ok(SampleRequest {
        id: id.to_string(),
        sample_count,
    })
}
