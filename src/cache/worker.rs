use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use matrix_media::FetchError;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

use super::state::{LoadResult, SampleRequest};
use super::{Shared, VoiceMessage, VoiceMessageError};
use crate::attachment::Attachment;
use crate::audio::AnalysisError;

pub(super) struct LoadJob {
    pub request: SampleRequest,
    pub attachment: Attachment,
    pub generation: u64,
}

/// Serial worker: one job at a time, in submission order.
pub(super) async fn run(shared: Arc<Shared>, mut jobs: mpsc::UnboundedReceiver<LoadJob>) {
    while let Some(job) = jobs.recv().await {
        process(&shared, job).await;
    }
    debug!("voice message worker stopped");
}

async fn process(shared: &Shared, job: LoadJob) {
    let mut generation = shared.generation.subscribe();
    if *generation.borrow_and_update() != job.generation {
        debug!("skipping voice message {} queued before a clear", job.request.id);
        return;
    }

    let result = tokio::select! {
        _ = generation.changed() => {
            debug!("voice message {} cancelled mid-load", job.request.id);
            return;
        }
        result = load(shared, &job) => result,
    };
    finish(shared, &job, result);
}

/// File and duration of an attachment staged by an earlier request.
///
/// A job never finds its own sample count cached: it is only queued while no
/// other request for that key is pending, and results are stored and handed
/// out under the same lock.
fn staged_entry(shared: &Shared, id: &str) -> Option<(PathBuf, Duration)> {
    shared
        .state()
        .entries
        .get(id)
        .map(|entry| (entry.file.clone(), entry.duration))
}

async fn load(shared: &Shared, job: &LoadJob) -> LoadResult {
    let request = &job.request;
    let started = Instant::now();

    let (file, duration, staged_here) = match staged_entry(shared, &request.id) {
        Some((file, duration)) => (file, duration, None),
        None => {
            let destination = shared.config.storage_dir.join(staged_file_name(
                &request.id,
                job.attachment.file_extension(),
            ));
            match stage(shared, &job.attachment, &destination).await {
                Ok((file, duration)) => (file, duration, Some(destination)),
                Err(err) => {
                    discard_staged(&destination);
                    return Err(err);
                }
            }
        }
    };
    let staged_ms = started.elapsed().as_millis();

    let samples = match sample(shared, &file, request.sample_count).await {
        Ok(samples) => samples,
        Err(err) => {
            // Nothing is cached for a failed request, so drop what this job staged.
            if let Some(destination) = &staged_here {
                discard_staged(destination);
            }
            return Err(err);
        }
    };

    info!(
        "voice message {} ready in {}ms (stage={}ms sampling={}ms, {} samples)",
        request.id,
        started.elapsed().as_millis(),
        staged_ms,
        started.elapsed().as_millis() - staged_ms,
        samples.len()
    );

    Ok(VoiceMessage {
        file,
        duration,
        samples: samples.into(),
    })
}

/// Fetch, convert and measure an attachment that is not on disk yet.
async fn stage(
    shared: &Shared,
    attachment: &Attachment,
    destination: &Path,
) -> Result<(PathBuf, Duration), VoiceMessageError> {
    let timeout = shared.config.step_timeout();

    tokio::fs::create_dir_all(&shared.config.storage_dir)
        .await
        .map_err(|e| VoiceMessageError::Preparation(FetchError::from(e)))?;

    let fetched = bounded(
        timeout,
        shared.fetcher.fetch(&attachment.source, destination),
        FetchError::TimedOut,
    )
    .await?;

    let processor = Arc::clone(&shared.processor);
    let playable = blocking(timeout, move || processor.convert(&fetched))
        .await
        .map_err(VoiceMessageError::Conversion)?;

    let processor = Arc::clone(&shared.processor);
    let path = playable.clone();
    let duration = blocking(timeout, move || processor.duration(&path))
        .await
        .map_err(|e| VoiceMessageError::Duration(Some(e)))?;
    if duration.is_zero() {
        return Err(VoiceMessageError::Duration(None));
    }

    Ok((playable, duration))
}

async fn sample(
    shared: &Shared,
    file: &Path,
    sample_count: usize,
) -> Result<Vec<f32>, VoiceMessageError> {
    let processor = Arc::clone(&shared.processor);
    let path = file.to_path_buf();
    let samples = blocking(shared.config.step_timeout(), move || {
        processor.waveform(&path, sample_count)
    })
    .await
    .map_err(|e| VoiceMessageError::Sampling(Some(e)))?;

    if samples.is_empty() {
        return Err(VoiceMessageError::Sampling(None));
    }
    Ok(samples)
}

fn finish(shared: &Shared, job: &LoadJob, result: LoadResult) {
    let mut state = shared.state();
    // A clear already failed this job's waiters.
    if shared.generation() != job.generation {
        debug!("dropping result for {} computed before a clear", job.request.id);
        return;
    }

    match &result {
        Ok(message) => state.store(&job.request, message),
        Err(err) => warn!(
            "voice message {} ({} samples) failed: {}",
            job.request.id, job.request.sample_count, err
        ),
    }
    let delivered = state.resolve(&job.request, result);
    debug!(
        "voice message {} delivered to {} waiter(s)",
        job.request.id, delivered
    );
}

/// Await `fut`, dropping it and returning `timed_out` once `timeout` passes.
async fn bounded<T, E>(
    timeout: Option<Duration>,
    fut: impl Future<Output = Result<T, E>>,
    timed_out: E,
) -> Result<T, E> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or(Err(timed_out)),
        None => fut.await,
    }
}

/// Run blocking audio work off the runtime.
async fn blocking<T, F>(timeout: Option<Duration>, work: F) -> Result<T, AnalysisError>
where
    F: FnOnce() -> Result<T, AnalysisError> + Send + 'static,
    T: Send + 'static,
{
    let task = async move {
        match tokio::task::spawn_blocking(work).await {
            Ok(result) => result,
            Err(err) => Err(AnalysisError::Interrupted(err.to_string())),
        }
    };
    bounded(timeout, task, AnalysisError::TimedOut).await
}

/// Event ids carry characters that are unsafe in file names, so hash them.
fn staged_file_name(id: &str, extension: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}.{}", &digest[..32], extension)
}

fn discard_staged(destination: &Path) {
    for path in [destination.to_path_buf(), destination.with_extension("wav")] {
        let _ = std::fs::remove_file(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_names_are_stable_and_path_safe() {
        let a = staged_file_name("$abc/def:allgram.me", "ogg");
        assert_eq!(a, staged_file_name("$abc/def:allgram.me", "ogg"));
        assert_ne!(a, staged_file_name("$other:allgram.me", "ogg"));
        assert!(a.ends_with(".ogg"));
        assert_eq!(a.len(), 32 + 4);
        assert!(a[..32].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn bounded_times_out_and_drops_the_future() {
        let result: Result<(), &str> = bounded(
            Some(Duration::from_millis(10)),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            "timed out",
        )
        .await;
        assert_eq!(result, Err("timed out"));
    }

    #[tokio::test]
    async fn blocking_returns_work_result() {
        let value = blocking(None, || Ok::<_, AnalysisError>(7)).await;
        assert_eq!(value, Ok(7));
    }
}
