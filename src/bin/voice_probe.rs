//! Load one voice message event end to end and print what the UI would get.
//!
//! Reads a raw `m.room.message` event from a JSON file, downloads and
//! decrypts the attachment from the configured homeserver and renders the
//! waveform as bars.
//!
//! Run with: cargo run --bin voice_probe -- event.json [sample-count]

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use allgram_voice::audio::SymphoniaProcessor;
use allgram_voice::matrix_media::HttpMediaFetcher;
use allgram_voice::{main_queue, Attachment, VoiceConfig, VoiceMessage, VoiceMessageCache};

const DEFAULT_SAMPLE_COUNT: usize = 48;
const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

fn render_bars(samples: &[f32]) -> String {
    samples
        .iter()
        .map(|s| {
            let idx = (s.clamp(0.0, 1.0) * (BARS.len() - 1) as f32).round() as usize;
            BARS[idx]
        })
        .collect()
}

fn print_message(message: &VoiceMessage) {
    println!("  file:     {}", message.file.display());
    println!("  duration: {:.2}s", message.duration.as_secs_f64());
    println!("  waveform: {}", render_bars(&message.samples));
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let event_path = PathBuf::from(
        args.next()
            .ok_or("usage: voice_probe <event.json> [sample-count]")?,
    );
    let sample_count = match args.next() {
        Some(raw) => raw.parse::<usize>()?,
        None => DEFAULT_SAMPLE_COUNT,
    };

    let config = VoiceConfig::load()?;
    let event: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&event_path)?)?;
    let attachment = Attachment::from_event(&event)
        .ok_or_else(|| format!("{} carries no media attachment", event_path.display()))?;

    // One cache for the whole process, passed to whoever needs it.
    let fetcher = Arc::new(HttpMediaFetcher::new(config.homeserver.clone())?);
    let processor = Arc::new(SymphoniaProcessor::new(config.processor.clone()));
    let cache = VoiceMessageCache::new(config.cache.clone(), fetcher, processor);

    println!("Loading {} ({} samples)...", attachment.source.content_uri(), sample_count);
    let message = cache.load(&attachment, sample_count).await?;
    print_message(&message);

    // A second resolution reuses the staged file; the callback form delivers
    // on the main queue like the UI would see it.
    let (main, mut queue) = main_queue();
    let half = (sample_count / 2).max(1);
    cache.load_with(&attachment, half, &main, move |result| match result {
        Ok(message) => {
            println!("\nSame message at {} samples:", half);
            print_message(&message);
        }
        Err(err) => eprintln!("reload failed: {}", err),
    });
    drop(main);
    while queue.run_next().await {}

    let stats = cache.stats();
    println!(
        "\nCache: {} entr(y/ies), {} waveform variant(s) in {}",
        stats.entries,
        stats.sample_variants,
        cache.storage_dir().display()
    );
    Ok(())
}
