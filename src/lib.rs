//! Voice message attachments for the AllGram Matrix client.
//!
//! [`VoiceMessageCache`] turns a voice message event into a playable local
//! file, its duration and a waveform, sharing work between concurrent
//! requests and keeping results for the life of the process.

pub mod attachment;
pub mod audio;
pub mod cache;
pub mod config;
pub mod ffi;
pub mod main_queue;

pub use attachment::{Attachment, AttachmentKind};
pub use cache::{
    CacheClearer, CacheConfig, CacheStats, VoiceMessage, VoiceMessageCache, VoiceMessageError,
};
pub use config::VoiceConfig;
pub use main_queue::{main_queue, MainHandle, MainQueue};
pub use matrix_media;
