/// Sample an amplitude envelope of `num_buckets` points from mono audio.
///
/// Each bucket holds the peak magnitude of its slice of the recording,
/// normalised so the loudest bucket is 1.0. Silence stays at 0.0.
pub fn amplitude_envelope(samples: &[f32], num_buckets: usize) -> Vec<f32> {
    if samples.is_empty() || num_buckets == 0 {
        return vec![0.0; num_buckets];
    }

    let total = samples.len() as f64;
    let buckets = num_buckets as f64;

    let mut envelope = Vec::with_capacity(num_buckets);
    for bucket_idx in 0..num_buckets {
        let start = (bucket_idx as f64 * total / buckets) as usize;
        let end = (((bucket_idx + 1) as f64 * total / buckets) as usize).min(samples.len());
        // Short recordings stretch one sample over several buckets.
        let end = end.max(start + 1).min(samples.len());
        let start = start.min(end.saturating_sub(1));

        let peak = samples[start..end]
            .iter()
            .filter(|s| s.is_finite())
            .fold(0.0f32, |max, &s| max.max(s.abs()));
        envelope.push(peak);
    }

    let loudest = envelope.iter().copied().fold(0.0f32, f32::max);
    if loudest > 0.0 {
        for v in envelope.iter_mut() {
            *v = (*v / loudest).clamp(0.0, 1.0);
        }
    }
    envelope
}
