use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use super::{VoiceMessage, VoiceMessageError};

pub(crate) type LoadResult = Result<VoiceMessage, VoiceMessageError>;
pub(crate) type Waiter = oneshot::Sender<LoadResult>;

/// One attachment at one waveform resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct SampleRequest {
    pub id: String,
    pub sample_count: usize,
}

/// Everything known about one downloaded voice message.
#[derive(Debug)]
pub(crate) struct CacheEntry {
    pub file: PathBuf,
    pub duration: Duration,
    pub samples: HashMap<usize, Arc<[f32]>>,
}

impl CacheEntry {
    pub fn message(&self, sample_count: usize) -> Option<VoiceMessage> {
        self.samples.get(&sample_count).map(|samples| VoiceMessage {
            file: self.file.clone(),
            duration: self.duration,
            samples: Arc::clone(samples),
        })
    }
}

/// Bookkeeping tables, guarded by the cache mutex.
#[derive(Default)]
pub(crate) struct CacheState {
    pub entries: HashMap<String, CacheEntry>,
    pub pending: HashMap<SampleRequest, Vec<Waiter>>,
}

impl CacheState {
    pub fn cached(&self, request: &SampleRequest) -> Option<VoiceMessage> {
        self.entries
            .get(&request.id)
            .and_then(|entry| entry.message(request.sample_count))
    }

    /// Queue a waiter; returns true when it is the first one for the request.
    pub fn register(&mut self, request: SampleRequest, waiter: Waiter) -> bool {
        let waiters = self.pending.entry(request).or_default();
        waiters.push(waiter);
        waiters.len() == 1
    }

    /// Record a successful load. The file and duration of an existing entry
    /// are kept; only the new sample variant is added.
    pub fn store(&mut self, request: &SampleRequest, message: &VoiceMessage) {
        let entry = self
            .entries
            .entry(request.id.clone())
            .or_insert_with(|| CacheEntry {
                file: message.file.clone(),
                duration: message.duration,
                samples: HashMap::new(),
            });
        entry
            .samples
            .entry(request.sample_count)
            .or_insert_with(|| Arc::clone(&message.samples));
    }

    /// Deliver `result` to every waiter of `request`. Returns how many there were.
    pub fn resolve(&mut self, request: &SampleRequest, result: LoadResult) -> usize {
        let waiters = self.pending.remove(request).unwrap_or_default();
        let count = waiters.len();
        for waiter in waiters {
            // A dropped receiver just means the caller stopped waiting.
            let _ = waiter.send(result.clone());
        }
        count
    }

    /// Fail every pending waiter with `Cancelled` and forget all entries.
    pub fn cancel_all(&mut self) -> usize {
        let mut cancelled = 0;
        for (_, waiters) in self.pending.drain() {
            for waiter in waiters {
                let _ = waiter.send(Err(VoiceMessageError::Cancelled));
                cancelled += 1;
            }
        }
        self.entries.clear();
        cancelled
    }
}
